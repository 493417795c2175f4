//! Error types for the core library
//!
//! Backends translate driver errors into these variants at their boundary,
//! so callers never see a raw `sqlx` or `rusqlite` error.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied an empty name or an unusable timestamp.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A write violated a uniqueness or foreign-key constraint, or targeted
    /// a task that was already stopped.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The embedded database could not apply its bootstrap script.
    #[error("Schema initialization failed: {0}")]
    SchemaInit(String),

    /// The task row was created but the session could not be bound to it.
    #[error("Task {task_id} was created but tracking did not start: {source}")]
    SessionNotStarted {
        task_id: i64,
        #[source]
        source: Box<Error>,
    },
}

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Persistence,
    SchemaInit,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Persistence(_) | Self::Timeout(_) | Self::SessionNotStarted { .. } => {
                ErrorKind::Persistence
            }
            Self::SchemaInit(_) => ErrorKind::SchemaInit,
        }
    }

    /// True for failures the caller can correct by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Conflict
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Persistence(format!("IO error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_a_persistence_failure() {
        let err = Error::Timeout(Duration::from_millis(50));
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(!err.is_client_error());
    }

    #[test]
    fn session_not_started_names_the_task() {
        let err = Error::SessionNotStarted {
            task_id: 7,
            source: Box::new(Error::Persistence("connection reset".into())),
        };
        assert_eq!(err.kind(), ErrorKind::Persistence);
        let message = err.to_string();
        assert!(message.contains("Task 7"));
        assert!(message.contains("connection reset"));
    }

    #[test]
    fn client_errors() {
        assert!(Error::Validation("empty".into()).is_client_error());
        assert!(Error::NotFound("x".into()).is_client_error());
        assert!(Error::Conflict("x".into()).is_client_error());
        assert!(!Error::SchemaInit("x".into()).is_client_error());
    }
}
