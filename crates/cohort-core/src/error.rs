//! Error types for cohort.

use std::fmt;

use thiserror::Error;

/// Result type alias using cohort's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cohort operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity (profile or posting) not found
    #[error("Entity not found: {0}")]
    EntityNotFound(uuid::Uuid),

    /// Entity exists but has no stored embedding yet
    #[error("Embedding not found for entity: {0}")]
    EmbeddingNotFound(uuid::Uuid),

    /// Embedding provider call failed or returned no vectors
    #[error("Provider error: {0}")]
    Provider(String),

    /// Serialization/deserialization error (includes vector blobs)
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// External messaging channel rejected or failed a delivery
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operator-facing error category.
///
/// | Kind | Raised by |
/// |------|-----------|
/// | `NotFound` | entity or embedding absent |
/// | `Provider` | embedding generation failed or returned empty |
/// | `Store` | serialization or persistence failure |
/// | `Delivery` | external messaging channel failed |
/// | `Other` | configuration, input validation, internal |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Provider,
    Store,
    Delivery,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Provider => "provider",
            ErrorKind::Store => "store",
            ErrorKind::Delivery => "delivery",
            ErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error for logging.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) | Error::EntityNotFound(_) | Error::EmbeddingNotFound(_) => {
                ErrorKind::NotFound
            }
            Error::Database(sqlx::Error::RowNotFound) => ErrorKind::NotFound,
            Error::Database(_) | Error::Serialization(_) => ErrorKind::Store,
            Error::Provider(_) => ErrorKind::Provider,
            Error::Delivery(_) => ErrorKind::Delivery,
            Error::Config(_) | Error::InvalidInput(_) | Error::Internal(_) | Error::Io(_) => {
                ErrorKind::Other
            }
        }
    }

    /// True for any "absent" error.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Provider(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_entity_not_found() {
        let id = Uuid::nil();
        let err = Error::EntityNotFound(id);
        assert_eq!(err.to_string(), format!("Entity not found: {}", id));
    }

    #[test]
    fn test_error_display_embedding_not_found() {
        let id = Uuid::new_v4();
        let err = Error::EmbeddingNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_error_display_provider() {
        let err = Error::Provider("empty response".to_string());
        assert_eq!(err.to_string(), "Provider error: empty response");
    }

    #[test]
    fn test_error_display_delivery() {
        let err = Error::Delivery("503".to_string());
        assert_eq!(err.to_string(), "Delivery error: 503");
    }

    #[test]
    fn test_kind_not_found() {
        assert_eq!(
            Error::EntityNotFound(Uuid::nil()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::EmbeddingNotFound(Uuid::nil()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(Error::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert!(Error::Database(sqlx::Error::RowNotFound).is_not_found());
    }

    #[test]
    fn test_kind_store() {
        assert_eq!(Error::Serialization("bad".into()).kind(), ErrorKind::Store);
        assert_eq!(
            Error::Database(sqlx::Error::PoolTimedOut).kind(),
            ErrorKind::Store
        );
    }

    #[test]
    fn test_kind_provider_and_delivery() {
        assert_eq!(Error::Provider("x".into()).kind(), ErrorKind::Provider);
        assert_eq!(Error::Delivery("x".into()).kind(), ErrorKind::Delivery);
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Other);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::Provider.to_string(), "provider");
        assert_eq!(ErrorKind::Store.as_str(), "store");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
