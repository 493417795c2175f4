//! Health check endpoint
//!
//! Reports which task store backend the server was started with, so a monitor
//! can tell a throwaway `memory` deployment from a persistent one.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    /// `postgres`, `sqlite` or `memory`; the deadline wrapper passes the inner name through.
    store: &'static str,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store: state.task_store().backend(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;
    use tt_core::{MemoryTaskStore, SqliteTaskStore};

    use crate::state::AppState;

    async fn health(state: AppState) -> Value {
        let response = super::router()
            .with_state(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_reports_backend_behind_deadline() {
        let memory = AppState::with_store(Arc::new(MemoryTaskStore::new()), Duration::from_secs(5));
        let body = health(memory).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["store"], "memory");

        let sqlite = SqliteTaskStore::open_in_memory().await.unwrap();
        let body = health(AppState::with_store(Arc::new(sqlite), Duration::from_secs(5))).await;
        assert_eq!(body["store"], "sqlite");
    }
}
