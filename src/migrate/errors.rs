//! Migration error types
//!
//! Error codes:
//! - KSPAN_FORBIDDEN_TRANSITION (REJECT)
//! - KSPAN_DEST_SCHEMA_MISMATCH (REJECT)
//! - KSPAN_OVERLAPPING_MIGRATION (REJECT)
//! - KSPAN_CHUNK_COMMIT_FAILURE (ABORT)
//! - KSPAN_RECONCILIATION_MISMATCH (ABORT)
//! - KSPAN_MIGRATION_CANCELLED (ABORT)
//! - KSPAN_UNKNOWN_JOB (REJECT)
//! - KSPAN_CHECKPOINT_IO (ABORT)

use super::job::JobState;
use crate::engine::EngineError;
use crate::registry::{KeyRange, RegistryError};
use thiserror::Error;
use uuid::Uuid;

/// Result type for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Errors raised by the migration orchestrator.
#[derive(Debug, Clone, Error)]
pub enum MigrateError {
    /// Job state machine rejected a transition
    #[error("illegal job transition {from} -> {to}")]
    ForbiddenTransition {
        /// Current state
        from: JobState,
        /// Requested state
        to: JobState,
    },

    /// Destination table exists with a different column set
    #[error("destination table '{table}' has an incompatible schema: {reason}")]
    DestinationSchemaMismatch {
        /// The destination table
        table: String,
        /// What differs
        reason: String,
    },

    /// Requested range overlaps a migration that is still running
    #[error("range {range} overlaps active migration {job} on {active}")]
    OverlappingMigration {
        /// The requested range
        range: KeyRange,
        /// The running job
        job: Uuid,
        /// The running job's range
        active: KeyRange,
    },

    /// A chunk could not be committed within the retry budget
    #[error("job {job}: chunk at cursor {cursor:?} failed: {reason}")]
    ChunkCommitFailure {
        /// The job
        job: Uuid,
        /// Cursor of the failed chunk
        cursor: Option<String>,
        /// Underlying failure
        reason: String,
    },

    /// Post-copy verification found a count or checksum mismatch
    #[error(
        "job {job}: reconciliation failed \
         (rows {expected_rows}/{actual_rows}, checksum {expected_checksum:#010x}/{actual_checksum:#010x})"
    )]
    ReconciliationMismatch {
        /// The job
        job: Uuid,
        /// Rows the orchestrator moved
        expected_rows: u64,
        /// Rows counted at the destination
        actual_rows: u64,
        /// Running checksum accumulated while moving
        expected_checksum: u32,
        /// Checksum computed at the destination
        actual_checksum: u32,
    },

    /// Job was cancelled at a chunk boundary
    #[error("job {0} cancelled")]
    Cancelled(Uuid),

    /// No job with the given identifier
    #[error("unknown job {0}")]
    UnknownJob(Uuid),

    /// Checkpoint file could not be read or written
    #[error("checkpoint io at {path}: {reason}")]
    Checkpoint {
        /// Checkpoint file path
        path: String,
        /// The io failure
        reason: String,
    },

    /// Engine operation failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Registry operation failed
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl MigrateError {
    /// Stable string code for logs and API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::ForbiddenTransition { .. } => "KSPAN_FORBIDDEN_TRANSITION",
            Self::DestinationSchemaMismatch { .. } => "KSPAN_DEST_SCHEMA_MISMATCH",
            Self::OverlappingMigration { .. } => "KSPAN_OVERLAPPING_MIGRATION",
            Self::ChunkCommitFailure { .. } => "KSPAN_CHUNK_COMMIT_FAILURE",
            Self::ReconciliationMismatch { .. } => "KSPAN_RECONCILIATION_MISMATCH",
            Self::Cancelled(_) => "KSPAN_MIGRATION_CANCELLED",
            Self::UnknownJob(_) => "KSPAN_UNKNOWN_JOB",
            Self::Checkpoint { .. } => "KSPAN_CHECKPOINT_IO",
            Self::Engine(e) => e.code(),
            Self::Registry(e) => e.code(),
        }
    }
}
