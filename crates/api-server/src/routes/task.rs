//! Task API endpoints
//!
//! Start/stop tracking plus the read-only report views.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use tt_core::{Error, ErrorKind, Report, Task};

use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartTaskRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: Option<i64>,
    pub name: String,
    pub start_time: Option<String>,
    pub elapsed_time: f64,
    pub stopped: bool,
    pub active: bool,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        Self {
            active: task.is_active(),
            id: task.id,
            name: task.name,
            start_time: task.start_time.map(|t| t.to_rfc3339()),
            elapsed_time: task.elapsed_time,
            stopped: task.stopped,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopTaskResponse {
    pub task: TaskResponse,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub task: String,
    pub total_time: f64,
}

impl From<Report> for ReportResponse {
    fn from(report: Report) -> Self {
        Self {
            task: report.task,
            total_time: report.total_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn map_store_error(err: Error) -> ApiError {
    let (status, message) = match err.kind() {
        ErrorKind::Validation => (StatusCode::BAD_REQUEST, err.to_string()),
        ErrorKind::NotFound => (StatusCode::NOT_FOUND, err.to_string()),
        ErrorKind::Conflict => (StatusCode::CONFLICT, err.to_string()),
        ErrorKind::Persistence | ErrorKind::SchemaInit => {
            tracing::error!(error = %err, "task store failure");
            let message = match &err {
                // The row exists; say so rather than hiding it
                Error::SessionNotStarted { task_id, .. } => {
                    format!("Task {task_id} was created but tracking did not start")
                }
                _ => "Internal Server Error".to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    };
    (status, Json(ErrorResponse { error: message }))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/tasks/latest - Most recent tasks
async fn latest_tasks(State(state): State<AppState>) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let tasks = state.task_store().get_latest().await.map_err(map_store_error)?;
    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

/// POST /api/tasks/start - Start tracking a task
async fn start_task(
    State(state): State<AppState>,
    Json(req): Json<StartTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    let task = state
        .tracker()
        .start(&req.name, Utc::now())
        .await
        .map_err(map_store_error)?;
    Ok((StatusCode::CREATED, Json(TaskResponse::from(task))))
}

/// POST /api/tasks/stop - Stop the running task
async fn stop_task(State(state): State<AppState>) -> Result<Json<StopTaskResponse>, ApiError> {
    let task = state
        .tracker()
        .stop(Utc::now())
        .await
        .map_err(map_store_error)?;
    Ok(Json(StopTaskResponse {
        message: task.summary(),
        task: TaskResponse::from(task),
    }))
}

/// GET /api/tasks/current - The running task
async fn current_task(State(state): State<AppState>) -> Result<Json<TaskResponse>, ApiError> {
    match state.tracker().current().await.map_err(map_store_error)? {
        Some(task) => Ok(Json(TaskResponse::from(task))),
        None => Err(map_store_error(Error::NotFound("no task is running".into()))),
    }
}

/// GET /api/tasks/report - Total time per task name
async fn task_report(State(state): State<AppState>) -> Result<Json<Vec<ReportResponse>>, ApiError> {
    let reports = state.task_store().get_report().await.map_err(map_store_error)?;
    Ok(Json(reports.into_iter().map(ReportResponse::from).collect()))
}

/// GET /api/tasks/by-name/{name} - Total time for one task name
async fn task_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ReportResponse>, ApiError> {
    let report = state
        .task_store()
        .get_task_by_name(&name)
        .await
        .map_err(map_store_error)?;
    Ok(Json(ReportResponse::from(report)))
}

/// DELETE /api/tasks/{id} - Delete a task record
async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let deleted = state.task_store().delete(id).await.map_err(map_store_error)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(map_store_error(Error::NotFound(format!("Task {id} not found"))))
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tasks/latest", get(latest_tasks))
        .route("/api/tasks/start", post(start_task))
        .route("/api/tasks/stop", post(stop_task))
        .route("/api/tasks/current", get(current_task))
        .route("/api/tasks/report", get(task_report))
        .route("/api/tasks/by-name/{name}", get(task_by_name))
        .route("/api/tasks/{id}", delete(delete_task))
}
