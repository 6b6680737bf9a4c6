//! Error types for rooter.

use thiserror::Error;

/// Result type alias using rooter's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for rooter operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Job handle not found
    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// External hasher failed (spawn, exit status, timeout, or bad output)
    #[error("Hasher error: {0}")]
    Hasher(String),

    /// Worker lock could not be acquired or created
    #[error("Lock error: {0}")]
    Lock(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::InvalidInput(format!("invalid hex hash: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("work".to_string());
        assert_eq!(err.to_string(), "Not found: work");
    }

    #[test]
    fn test_error_display_job_not_found() {
        let id = Uuid::nil();
        let err = Error::JobNotFound(id);
        assert_eq!(err.to_string(), format!("Job not found: {}", id));
    }

    #[test]
    fn test_error_display_hasher() {
        let err = Error::Hasher("exit status 1".to_string());
        assert_eq!(err.to_string(), "Hasher error: exit status 1");
    }

    #[test]
    fn test_error_display_lock() {
        let err = Error::Lock("held by another process".to_string());
        assert_eq!(err.to_string(), "Lock error: held by another process");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("hash too short".to_string());
        assert_eq!(err.to_string(), "Invalid input: hash too short");
    }

    #[test]
    fn test_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.to_string(), "I/O error: gone");
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_from_hex_is_invalid_input() {
        let hex_err = hex::decode("zz").unwrap_err();
        let err: Error = hex_err.into();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().starts_with("Invalid input: invalid hex hash"));
    }
}
