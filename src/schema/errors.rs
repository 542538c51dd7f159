//! Schema error types
//!
//! Error codes:
//! - KSPAN_DUPLICATE_COLUMN (REJECT)
//! - KSPAN_UNKNOWN_COLUMN (REJECT)
//! - KSPAN_KEY_COLUMN_IMMUTABLE (REJECT)
//! - KSPAN_INVALID_TABLE (REJECT)

use thiserror::Error;

/// Result type for schema operations
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised by catalog validation and DDL application.
#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    /// Column already exists
    #[error("column '{column}' already exists")]
    DuplicateColumn {
        /// The offending column name
        column: String,
    },

    /// Column does not exist
    #[error("column '{column}' does not exist")]
    UnknownColumn {
        /// The missing column name
        column: String,
    },

    /// The partition key column cannot be altered or dropped
    #[error("key column '{column}' cannot be altered")]
    KeyColumnImmutable {
        /// The key column name
        column: String,
    },

    /// The table definition itself is invalid
    #[error("invalid table: {0}")]
    InvalidTable(String),
}

impl SchemaError {
    /// Create an invalid-table error
    pub fn invalid_table(reason: impl Into<String>) -> Self {
        Self::InvalidTable(reason.into())
    }

    /// Stable string code for logs and API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateColumn { .. } => "KSPAN_DUPLICATE_COLUMN",
            Self::UnknownColumn { .. } => "KSPAN_UNKNOWN_COLUMN",
            Self::KeyColumnImmutable { .. } => "KSPAN_KEY_COLUMN_IMMUTABLE",
            Self::InvalidTable(_) => "KSPAN_INVALID_TABLE",
        }
    }
}
