//! Core validation errors.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by pure business rules.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A value failed domain validation.
    #[error("Validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display() {
        let err = CoreError::Validation("action must not be empty".into());
        assert!(err.to_string().contains("action must not be empty"));
    }
}
