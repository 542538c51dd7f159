//! Storage engine seam
//!
//! keyspan does not own row storage. Each shard is backed by a
//! single-node relational engine consumed through the `ShardEngine`
//! trait: an in-memory engine for local shards and tests, and a remote
//! wrapper that forwards over a network transport and surfaces
//! connectivity failures distinctly from logical errors.

mod errors;
mod memory;
mod ops;
mod remote;
mod row;
mod set;

pub use errors::{EngineError, EngineResult};
pub use memory::MemoryEngine;
pub use ops::ShardEngine;
pub use remote::{RemoteEndpoint, RemoteEngine};
pub use row::{fold_checksum, Row};
pub use set::EngineSet;
