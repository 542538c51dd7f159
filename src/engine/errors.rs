//! Storage engine error types
//!
//! Connectivity failures (`Unreachable`) are distinguished from logical
//! errors: only connectivity failures are retried with backoff, and they
//! never corrupt registry state because cutover happens after confirmed
//! success.

use crate::registry::ShardId;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by a shard's storage engine or its transport.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Physical table does not exist
    #[error("table '{table}' does not exist")]
    UnknownTable {
        /// The missing table
        table: String,
    },

    /// Physical table already exists
    #[error("table '{table}' already exists")]
    DuplicateTable {
        /// The conflicting table
        table: String,
    },

    /// Column already exists on the physical table
    #[error("column '{column}' already exists on table '{table}'")]
    DuplicateColumn {
        /// The table
        table: String,
        /// The conflicting column
        column: String,
    },

    /// Column does not exist on the physical table
    #[error("column '{column}' does not exist on table '{table}'")]
    UnknownColumn {
        /// The table
        table: String,
        /// The missing column
        column: String,
    },

    /// Remote endpoint could not be reached
    #[error("endpoint {endpoint} unreachable")]
    Unreachable {
        /// The endpoint that failed, as host:port
        endpoint: String,
    },

    /// No engine registered for the shard
    #[error("no engine registered for shard {shard}")]
    NoEngine {
        /// The shard without an engine
        shard: ShardId,
    },
}

impl EngineError {
    /// Stable string code for logs and API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownTable { .. } => "KSPAN_ENGINE_UNKNOWN_TABLE",
            Self::DuplicateTable { .. } => "KSPAN_ENGINE_DUPLICATE_TABLE",
            Self::DuplicateColumn { .. } => "KSPAN_ENGINE_DUPLICATE_COLUMN",
            Self::UnknownColumn { .. } => "KSPAN_ENGINE_UNKNOWN_COLUMN",
            Self::Unreachable { .. } => "KSPAN_REMOTE_UNAVAILABLE",
            Self::NoEngine { .. } => "KSPAN_ENGINE_MISSING",
        }
    }

    /// Whether the error is a connectivity failure (retryable)
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_classification() {
        let unreachable = EngineError::Unreachable {
            endpoint: "10.0.0.2:5433".into(),
        };
        assert!(unreachable.is_connectivity());
        assert_eq!(unreachable.code(), "KSPAN_REMOTE_UNAVAILABLE");

        let logical = EngineError::UnknownTable {
            table: "events".into(),
        };
        assert!(!logical.is_connectivity());
    }
}
