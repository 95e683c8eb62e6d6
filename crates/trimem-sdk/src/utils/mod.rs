//! SDK Utilities
//!
//! Common helpers shared by the engine components.

mod hashing;
mod time;
mod validation;

pub use hashing::content_hash;
pub use time::{days_between, parse_datetime};
pub use validation::{
    ValidationError, validate_k, validate_non_empty, validate_owner_id, validate_unit_interval,
};
