//! Shard migration
//!
//! Chunked, checkpointed movement of a key sub-range between shards,
//! with verification before an atomic registry cutover.

mod checkpoint;
mod errors;
mod job;
mod orchestrator;

pub use checkpoint::{CheckpointStore, JobCheckpoint};
pub use errors::{MigrateError, MigrateResult};
pub use job::{JobState, MigrationJob, MigrationStatus};
pub use orchestrator::MigrationOrchestrator;
