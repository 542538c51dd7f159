//! Observable events
//!
//! Every registry mutation, DDL propagation step, migration transition,
//! and routing decision emits exactly one typed event. Events are explicit
//! so that log consumers never have to parse free-form messages.

use std::fmt;

/// Observable events in keyspan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Boot & lifecycle
    /// Startup begins
    BootStart,
    /// Startup complete, ready to serve
    BootComplete,
    /// HTTP surface serving
    Serving,

    // Registry
    /// Shard attached
    RegistryAttach,
    /// Shard detached (range now vacant)
    RegistryDetach,
    /// Cutover committed: sub-range reassigned in one swap
    CutoverCommit,

    // Schema propagation
    /// DDL accepted against the catalog
    DdlBegin,
    /// DDL applied at a shard
    DdlApplied,
    /// DDL deferred: shard unreachable, marked stale
    DdlDeferred,
    /// Shard marked stale
    ShardStale,
    /// Stale shard replayed missed changes
    ShardCaughtUp,

    // Migration
    /// Migration job accepted
    MigrationBegin,
    /// One chunk copied, deleted, and checkpointed
    ChunkMoved,
    /// Move loop finished, reconciliation starting
    MigrationVerifyBegin,
    /// Job committed (registry cutover done)
    MigrationCommitted,
    /// Job aborted; source intact, destination discarded
    MigrationAborted,

    // Routing
    /// Plan produced
    QueryPlanned,
    /// Read rejected (drift or unroutable key)
    QueryRejected,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::BootStart => "KEYSPAN_STARTUP_BEGIN",
            Event::BootComplete => "KEYSPAN_STARTUP_COMPLETE",
            Event::Serving => "KEYSPAN_SERVING",

            Event::RegistryAttach => "REGISTRY_ATTACH",
            Event::RegistryDetach => "REGISTRY_DETACH",
            Event::CutoverCommit => "CUTOVER_COMMIT",

            Event::DdlBegin => "DDL_BEGIN",
            Event::DdlApplied => "DDL_APPLIED",
            Event::DdlDeferred => "DDL_DEFERRED",
            Event::ShardStale => "SHARD_STALE",
            Event::ShardCaughtUp => "SHARD_CAUGHT_UP",

            Event::MigrationBegin => "MIGRATION_BEGIN",
            Event::ChunkMoved => "CHUNK_MOVED",
            Event::MigrationVerifyBegin => "MIGRATION_VERIFY_BEGIN",
            Event::MigrationCommitted => "MIGRATION_COMMITTED",
            Event::MigrationAborted => "MIGRATION_ABORTED",

            Event::QueryPlanned => "QUERY_PLANNED",
            Event::QueryRejected => "QUERY_REJECTED",
        }
    }

    /// Returns true if the event is alert-worthy
    ///
    /// An aborted migration means either connectivity exhausted its retry
    /// budget or reconciliation found a count/checksum mismatch; both need
    /// operator attention.
    pub fn is_alert(&self) -> bool {
        matches!(self, Event::MigrationAborted)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_string_representation() {
        let events = [
            Event::BootStart,
            Event::BootComplete,
            Event::Serving,
            Event::RegistryAttach,
            Event::RegistryDetach,
            Event::CutoverCommit,
            Event::DdlBegin,
            Event::DdlApplied,
            Event::DdlDeferred,
            Event::ShardStale,
            Event::ShardCaughtUp,
            Event::MigrationBegin,
            Event::ChunkMoved,
            Event::MigrationVerifyBegin,
            Event::MigrationCommitted,
            Event::MigrationAborted,
            Event::QueryPlanned,
            Event::QueryRejected,
        ];

        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_alert_events() {
        assert!(Event::MigrationAborted.is_alert());
        assert!(!Event::ChunkMoved.is_alert());
        assert!(!Event::CutoverCommit.is_alert());
    }
}
