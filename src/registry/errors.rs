//! Registry error types
//!
//! Error codes:
//! - KSPAN_RANGE_CONFLICT (REJECT)
//! - KSPAN_RANGE_GAP (REJECT)
//! - KSPAN_NOT_DRAINED (REJECT)
//! - KSPAN_UNKNOWN_SHARD (REJECT)
//! - KSPAN_UNROUTABLE (REJECT)

use super::range::KeyRange;
use super::shard::ShardId;
use thiserror::Error;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised by shard registry mutations and lookups.
///
/// All registry errors are synchronous and fatal to the requested
/// operation; none of them leaves a partially applied snapshot behind.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Attach range overlaps an existing shard or vacant range
    #[error("range {range} conflicts with existing range {existing}")]
    RangeConflict {
        /// The range being attached
        range: KeyRange,
        /// The range it collides with
        existing: KeyRange,
    },

    /// Attach would leave part of the covered domain unreachable
    #[error("range {range} neither fills a vacant range nor extends a boundary")]
    RangeGap {
        /// The range being attached
        range: KeyRange,
    },

    /// Detach refused because the shard still holds rows
    #[error("shard {shard} still holds {rows} rows")]
    NotDrained {
        /// The shard that was asked to detach
        shard: ShardId,
        /// Verified row count at the time of the request
        rows: u64,
    },

    /// No shard with the given identifier
    #[error("unknown shard {0}")]
    UnknownShard(ShardId),

    /// Key falls inside a vacant (detached, not yet re-attached) range
    #[error("key {key:?} falls in vacant range {range}")]
    Unroutable {
        /// The key that could not be routed
        key: String,
        /// The vacant range containing it
        range: KeyRange,
    },

    /// Cutover sub-range does not lie inside the source shard's range
    #[error("sub-range {sub} is not covered by shard {shard} range {range}")]
    SubRangeOutOfBounds {
        /// The source shard
        shard: ShardId,
        /// The source shard's range
        range: KeyRange,
        /// The requested sub-range
        sub: KeyRange,
    },
}

impl RegistryError {
    /// Stable string code for logs and API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::RangeConflict { .. } => "KSPAN_RANGE_CONFLICT",
            Self::RangeGap { .. } => "KSPAN_RANGE_GAP",
            Self::NotDrained { .. } => "KSPAN_NOT_DRAINED",
            Self::UnknownShard(_) => "KSPAN_UNKNOWN_SHARD",
            Self::Unroutable { .. } => "KSPAN_UNROUTABLE",
            Self::SubRangeOutOfBounds { .. } => "KSPAN_RANGE_OUT_OF_BOUNDS",
        }
    }
}
