//! Shard registry
//!
//! Maps logical key ranges to physical storage locations. The registry is
//! an immutable versioned snapshot behind an atomic swap: readers never
//! observe a gap or an overlap for any key, and a migration cutover
//! reassigns a sub-range in exactly one swap.

mod errors;
mod range;
mod registry;
mod shard;
mod snapshot;

pub use errors::{RegistryError, RegistryResult};
pub use range::KeyRange;
pub use registry::ShardRegistry;
pub use shard::{Shard, ShardHealth, ShardId, ShardLocation};
pub use snapshot::RegistrySnapshot;
