//! Synchronizer error types
//!
//! `SchemaDrift` is the first-class failure mode for a shard whose
//! applied schema lags the catalog: a read scoped to such a shard fails
//! fast instead of silently returning fewer columns.

use crate::engine::EngineError;
use crate::registry::{RegistryError, ShardId};
use crate::schema::SchemaError;
use thiserror::Error;

/// Result type for synchronizer operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by DDL propagation and drift checks.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Catalog-level validation failed
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Engine operation failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Registry operation failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Shard's applied schema version lags the catalog
    #[error("shard {shard} is at schema version {applied}, catalog is at {current}")]
    SchemaDrift {
        /// The lagging shard
        shard: ShardId,
        /// Version applied at the shard
        applied: u64,
        /// Current catalog version
        current: u64,
    },
}

impl SyncError {
    /// Stable string code for logs and API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Schema(e) => e.code(),
            Self::Engine(e) => e.code(),
            Self::Registry(e) => e.code(),
            Self::SchemaDrift { .. } => "KSPAN_SCHEMA_DRIFT",
        }
    }
}
