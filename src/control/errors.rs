//! Control-plane error type
//!
//! Wraps every subsystem error and maps stable codes onto HTTP status
//! codes for the operator API.

use crate::engine::EngineError;
use crate::migrate::MigrateError;
use crate::registry::RegistryError;
use crate::routing::RoutingError;
use crate::schema::SchemaError;
use crate::sync::SyncError;
use thiserror::Error;

/// Result type for control-plane operations
pub type ControlResult<T> = Result<T, ControlError>;

/// Any failure surfaced by the control plane.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Schema catalog error
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Synchronizer error (includes schema drift)
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Migration error
    #[error(transparent)]
    Migrate(#[from] MigrateError),

    /// Routing error
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Registry error
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Engine error
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ControlError {
    /// Stable string code for logs and API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Schema(e) => e.code(),
            Self::Sync(e) => e.code(),
            Self::Migrate(e) => e.code(),
            Self::Routing(e) => e.code(),
            Self::Registry(e) => e.code(),
            Self::Engine(e) => e.code(),
        }
    }

    /// HTTP status code for the operator API.
    pub fn status_code(&self) -> u16 {
        match self.code() {
            "KSPAN_UNROUTABLE"
            | "KSPAN_UNKNOWN_SHARD"
            | "KSPAN_UNKNOWN_JOB"
            | "KSPAN_UNKNOWN_COLUMN"
            | "KSPAN_ENGINE_UNKNOWN_TABLE"
            | "KSPAN_ENGINE_UNKNOWN_COLUMN" => 404,
            "KSPAN_RANGE_CONFLICT"
            | "KSPAN_RANGE_GAP"
            | "KSPAN_RANGE_OUT_OF_BOUNDS"
            | "KSPAN_NOT_DRAINED"
            | "KSPAN_OVERLAPPING_MIGRATION"
            | "KSPAN_DEST_SCHEMA_MISMATCH"
            | "KSPAN_FORBIDDEN_TRANSITION"
            | "KSPAN_SCHEMA_DRIFT"
            | "KSPAN_DUPLICATE_COLUMN"
            | "KSPAN_KEY_COLUMN_IMMUTABLE"
            | "KSPAN_ENGINE_DUPLICATE_TABLE"
            | "KSPAN_ENGINE_DUPLICATE_COLUMN"
            | "KSPAN_MIGRATION_CANCELLED" => 409,
            "KSPAN_REMOTE_UNAVAILABLE" => 503,
            "KSPAN_INVALID_TABLE" => 400,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ShardId;

    #[test]
    fn test_status_mapping() {
        let unknown: ControlError = RegistryError::UnknownShard(ShardId::new("x")).into();
        assert_eq!(unknown.status_code(), 404);

        let drift: ControlError = SyncError::SchemaDrift {
            shard: ShardId::new("c"),
            applied: 1,
            current: 2,
        }
        .into();
        assert_eq!(drift.status_code(), 409);
        assert_eq!(drift.code(), "KSPAN_SCHEMA_DRIFT");

        let down: ControlError = EngineError::Unreachable {
            endpoint: "h:1".into(),
        }
        .into();
        assert_eq!(down.status_code(), 503);
    }
}
