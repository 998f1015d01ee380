//! Error types for Boxroom.

use thiserror::Error;

/// Common error type for Boxroom.
#[derive(Error, Debug)]
pub enum BoxroomError {
    /// Database error.
    ///
    /// Errors from sqlx are converted automatically; unique constraint
    /// violations become [`BoxroomError::Validation`] instead.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input: empty or duplicate names, bad sort parameters,
    /// colliding destinations.
    #[error("validation error: {0}")]
    Validation(String),

    /// An operation that would break the shape of the tree.
    ///
    /// Raised for destroying or moving the root, moving or copying a folder
    /// into its own subtree, creating a folder without a parent and missing
    /// move/copy targets.
    #[error("structural error: {0}")]
    Structural(String),

    /// A move or copy target of the wrong entry kind.
    #[error("type mismatch: expected {expected}, got {found}")]
    TypeMismatch {
        /// Kind the operation requires.
        expected: &'static str,
        /// Kind that was supplied.
        found: &'static str,
    },

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Attachment store error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BoxroomError {
    /// Check if this is a validation error.
    pub fn is_validation(&self) -> bool {
        matches!(self, BoxroomError::Validation(_))
    }

    /// Check if this is a structural error.
    pub fn is_structural(&self) -> bool {
        matches!(self, BoxroomError::Structural(_))
    }

    /// Check if this is a type mismatch.
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, BoxroomError::TypeMismatch { .. })
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BoxroomError::NotFound(_))
    }
}

// Conversion from sqlx errors
impl From<sqlx::Error> for BoxroomError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db_err) = e.as_database_error() {
            if db_err.is_unique_violation() {
                return BoxroomError::Validation(format!("duplicate value: {}", db_err.message()));
            }
        }
        BoxroomError::Database(e.to_string())
    }
}

/// Result type alias for Boxroom operations.
pub type Result<T> = std::result::Result<T, BoxroomError>;
