//! Client-side validation of request payloads.

use crate::error::ValidationError;

/// Payloads that can be checked before they are sent.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

pub fn require_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, format!("{field} is required")));
    }
    Ok(())
}

pub fn require_positive(field: &str, value: i64) -> Result<(), ValidationError> {
    if value <= 0 {
        return Err(ValidationError::new(field, format!("{field} must be greater than zero")));
    }
    Ok(())
}

pub fn require_non_negative(field: &str, value: i64) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::new(field, format!("{field} cannot be negative")));
    }
    Ok(())
}
