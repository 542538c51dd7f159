//! Schema synchronization
//!
//! Keeps every shard's physical schema converged on the logical catalog.
//! DDL commits to the catalog first, then fans out to shards; shards
//! that cannot be reached are marked stale and caught up later from the
//! change log.

mod errors;
mod retry;
mod synchronizer;

pub use errors::{SyncError, SyncResult};
pub use retry::RetryPolicy;
pub use synchronizer::{DdlReport, SchemaSynchronizer};
