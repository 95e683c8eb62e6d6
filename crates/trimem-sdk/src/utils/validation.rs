//! Validation Utilities

use thiserror::Error;

/// Longest accepted owner identifier
const MAX_OWNER_ID_LEN: usize = 256;

/// Validation error types
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid owner ID: {0}")]
    InvalidOwnerId(String),

    #[error("Field required: {0}")]
    Required(String),

    #[error("Value out of range: {0}")]
    OutOfRange(String),
}

/// Validate an owner identifier
///
/// Owner IDs are opaque, but must be non-blank, at most 256 characters and
/// free of control characters.
pub fn validate_owner_id(owner_id: &str) -> Result<(), ValidationError> {
    if owner_id.trim().is_empty() {
        return Err(ValidationError::Required("owner_id cannot be empty".into()));
    }

    if owner_id.chars().count() > MAX_OWNER_ID_LEN {
        return Err(ValidationError::InvalidOwnerId(format!(
            "must be {MAX_OWNER_ID_LEN} characters or less"
        )));
    }

    if let Some(c) = owner_id.chars().find(|c| c.is_control()) {
        return Err(ValidationError::InvalidOwnerId(format!(
            "control character {c:?} not allowed"
        )));
    }

    Ok(())
}

/// Require a non-blank string field
pub fn validate_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a value in [0, 1]
pub fn validate_unit_interval(field: &str, value: f64) -> Result<(), ValidationError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::OutOfRange(format!(
            "{field} must be between 0 and 1, got {value}"
        )));
    }
    Ok(())
}

/// Require a positive result count
pub fn validate_k(k: usize) -> Result<(), ValidationError> {
    if k == 0 {
        return Err(ValidationError::OutOfRange("k must be at least 1".into()));
    }
    Ok(())
}
