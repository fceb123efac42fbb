//! Error types for scene operations

use thiserror::Error;

/// Result type for scene operations
pub type SceneResult<T = ()> = Result<T, SceneError>;

/// Errors that can occur when the interpreter calls into a scene
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SceneError {
    /// File is not available to the scene
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Property cannot be assigned
    #[error("property '{0}' is read-only")]
    ReadOnly(String),

    /// Value has the wrong type for the target
    #[error("type mismatch for '{name}': expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Value is outside the accepted range
    #[error("invalid value for '{name}': {reason}")]
    InvalidValue { name: String, reason: String },

    /// Shape object does not exist
    #[error("shape object not defined: {0}")]
    ShapeNotDefined(String),

    /// Operation requires a crystallographic unit cell
    #[error("no unit cell")]
    NoUnitCell,

    /// Operation requires loaded atoms
    #[error("no atoms loaded")]
    NoAtoms,
}

impl SceneError {
    /// Create a type mismatch error
    pub fn type_mismatch(
        name: impl Into<String>,
        expected: &'static str,
        actual: &'static str,
    ) -> Self {
        SceneError::TypeMismatch {
            name: name.into(),
            expected,
            actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SceneError::FileNotFound("a.xyz".to_string());
        assert_eq!(format!("{}", err), "file not found: a.xyz");

        let err = SceneError::type_mismatch("bondTolerance", "decimal", "string");
        assert_eq!(
            format!("{}", err),
            "type mismatch for 'bondTolerance': expected decimal, got string"
        );
    }
}
