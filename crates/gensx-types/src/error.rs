use thiserror::Error;

/// Errors from sending a checkpoint snapshot to a persistence sink.
///
/// Sink errors never reach workflow callers; the checkpoint manager logs
/// them and moves on.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("checkpoint transport error: {0}")]
    Transport(String),

    #[error("checkpoint rejected with status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("checkpoint serialization error: {0}")]
    Serialization(String),

    #[error("checkpoint storage error: {0}")]
    Storage(String),

    #[error("checkpoint sink not configured: {0}")]
    NotConfigured(String),
}

/// Errors from repository operations (used by trait definitions in gensx-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,
}

impl From<RepositoryError> for SinkError {
    fn from(err: RepositoryError) -> Self {
        SinkError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_error_display() {
        let err = SinkError::Http {
            status: 401,
            body: "invalid api key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "checkpoint rejected with status 401: invalid api key"
        );
    }

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_repository_error_converts_to_storage() {
        let err: SinkError = RepositoryError::Connection.into();
        assert!(matches!(err, SinkError::Storage(msg) if msg == "database connection error"));
    }
}
