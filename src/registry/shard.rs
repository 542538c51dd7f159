//! Shard descriptors
//!
//! A shard is a physical storage location holding one contiguous key-range
//! slice of the logical table: either a local table or a table reachable
//! over a remote endpoint.

use super::range::KeyRange;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shard identifier (operator-visible name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId(String);

impl ShardId {
    /// Create a shard id from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ShardId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Physical location of a shard's storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ShardLocation {
    /// A table on the local storage engine
    Local {
        /// Physical table name
        table: String,
    },
    /// A table behind a remote endpoint
    Remote {
        /// Remote host
        host: String,
        /// Remote port
        port: u16,
        /// Physical table name on the remote engine
        table: String,
    },
}

impl ShardLocation {
    /// Create a local location.
    pub fn local(table: impl Into<String>) -> Self {
        Self::Local {
            table: table.into(),
        }
    }

    /// Create a remote location.
    pub fn remote(host: impl Into<String>, port: u16, table: impl Into<String>) -> Self {
        Self::Remote {
            host: host.into(),
            port,
            table: table.into(),
        }
    }

    /// The physical table name at the location.
    pub fn table(&self) -> &str {
        match self {
            Self::Local { table } => table,
            Self::Remote { table, .. } => table,
        }
    }

    /// Whether the location is remote.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

impl fmt::Display for ShardLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { table } => write!(f, "local:{}", table),
            Self::Remote { host, port, table } => write!(f, "remote:{}:{}/{}", host, port, table),
        }
    }
}

/// Shard health with respect to DDL propagation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ShardHealth {
    /// Schema propagation is current
    Healthy,
    /// Shard missed one or more DDL changes and has not caught up.
    /// Stale shards take no writes; reads are degraded-only.
    Stale {
        /// When the shard was marked stale
        since: DateTime<Utc>,
    },
}

impl ShardHealth {
    /// Whether the shard is stale.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

/// A shard entry in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    /// Identifier
    pub id: ShardId,
    /// Key range owned by the shard
    pub range: KeyRange,
    /// Physical storage location
    pub location: ShardLocation,
    /// Highest schema version applied at the location
    pub applied_version: u64,
    /// Row-count estimate (refreshed opportunistically)
    pub rows_estimate: u64,
    /// DDL propagation health
    pub health: ShardHealth,
}

impl Shard {
    /// Create a healthy shard at schema version `applied_version`.
    pub fn new(
        id: impl Into<ShardId>,
        range: KeyRange,
        location: ShardLocation,
        applied_version: u64,
    ) -> Self {
        Self {
            id: id.into(),
            range,
            location,
            applied_version,
            rows_estimate: 0,
            health: ShardHealth::Healthy,
        }
    }

    /// Whether the shard is stale with respect to DDL propagation.
    pub fn is_stale(&self) -> bool {
        self.health.is_stale()
    }
}

impl From<String> for ShardId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_table() {
        assert_eq!(ShardLocation::local("events_a").table(), "events_a");
        assert_eq!(
            ShardLocation::remote("10.0.0.2", 5433, "events_d").table(),
            "events_d"
        );
    }

    #[test]
    fn test_location_display() {
        assert_eq!(ShardLocation::local("t").to_string(), "local:t");
        assert_eq!(
            ShardLocation::remote("h", 9, "t").to_string(),
            "remote:h:9/t"
        );
    }

    #[test]
    fn test_new_shard_is_healthy() {
        let shard = Shard::new(
            "shard-a",
            KeyRange::full(),
            ShardLocation::local("events_a"),
            1,
        );
        assert!(!shard.is_stale());
        assert_eq!(shard.applied_version, 1);
        assert_eq!(shard.rows_estimate, 0);
    }

    #[test]
    fn test_stale_health() {
        let health = ShardHealth::Stale { since: Utc::now() };
        assert!(health.is_stale());
        assert!(!ShardHealth::Healthy.is_stale());
    }
}
