//! Engine Error Types
//!
//! Only validation, configuration and initialization problems surface to
//! callers. Extraction, gateway and store failures are folded into reports
//! and rationale strings by the components that hit them.

use thiserror::Error;

/// Engine Result type alias
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// Invalid input, rejected before any store call
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Store or gateway error from the core crate
    #[error(transparent)]
    Core(#[from] trimem_core::Error),

    /// Engine could not start
    #[error("initialization failed: {message}")]
    Initialization { message: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an initialization error
    pub fn initialization(message: impl Into<String>) -> Self {
        Self::Initialization {
            message: message.into(),
        }
    }

    /// Check if this error is a validation error
    pub fn is_validation(&self) -> bool {
        match self {
            Self::Validation { .. } => true,
            Self::Core(err) => err.is_validation(),
            _ => false,
        }
    }
}

impl From<crate::utils::ValidationError> for EngineError {
    fn from(err: crate::utils::ValidationError) -> Self {
        Self::validation(err.to_string())
    }
}
