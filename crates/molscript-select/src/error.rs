//! Error types for selection values

use thiserror::Error;

/// Errors that can occur when building or reading selections
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SelectError {
    /// Text is not a canonical selection literal
    #[error("invalid selection literal: {0}")]
    InvalidEscape(String),

    /// Range with start after end
    #[error("invalid index range {start}:{end}")]
    InvalidRange { start: usize, end: usize },

    /// Index beyond what selection text may address
    #[error("selection index {index} exceeds {max}")]
    IndexTooLarge { index: usize, max: usize },

    /// Unknown property keyword
    #[error("unknown property: {0}")]
    UnknownProperty(String),
}

/// Result type for selection operations
pub type SelectResult<T> = Result<T, SelectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SelectError::InvalidRange { start: 5, end: 1 };
        assert_eq!(format!("{}", err), "invalid index range 5:1");

        let err = SelectError::UnknownProperty("foo".to_string());
        assert_eq!(format!("{}", err), "unknown property: foo");
    }
}
