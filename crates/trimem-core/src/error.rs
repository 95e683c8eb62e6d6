//! Error types for trimem-core.

use thiserror::Error;

use crate::types::StoreKind;

/// Result type alias using trimem-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for store and gateway operations
#[derive(Error, Debug)]
pub enum Error {
    // Database errors
    #[cfg(feature = "db")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    // Store errors
    #[error("{store} store unavailable: {message}")]
    StoreUnavailable { store: StoreKind, message: String },

    // Gateway errors
    #[error("Transient gateway error: {0}")]
    Transient(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    // Input errors
    #[error("Validation error: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a store-unavailable error
    pub fn store_unavailable(store: StoreKind, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            store,
            message: message.into(),
        }
    }

    /// Create a transient (retryable) gateway error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Create a permanent gateway error
    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether a retry may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Check if this error is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::transient("timeout").is_transient());
        assert!(!Error::gateway("bad request").is_transient());
        assert!(!Error::LockPoisoned.is_transient());
    }

    #[test]
    fn test_store_unavailable_message() {
        let err = Error::store_unavailable(StoreKind::Graph, "connection refused");
        let msg = err.to_string();
        assert!(msg.contains("graph"));
        assert!(msg.contains("connection refused"));
    }
}
