//! Routing planner
//!
//! Plans run against one registry snapshot, so a concurrent cutover
//! never splits a single query across two layouts. Stale shards are
//! excluded from the target list by default; a degraded read keeps them
//! in, flagged, and it is the caller's policy whether that is
//! acceptable.

use super::errors::{RoutingError, RoutingResult};
use super::predicate::{KeyInterval, Predicate};
use crate::observability::{Event, Logger};
use crate::registry::{RegistryError, RegistrySnapshot, Shard, ShardId};
use serde::Serialize;
use std::sync::Arc;

/// How the plan will be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMode {
    /// Read; `allow_degraded` keeps stale shards in the plan, flagged
    Read {
        /// Include stale shards instead of skipping them
        allow_degraded: bool,
    },
    /// Write; stale shards are never legal targets
    Write,
}

/// One shard a query fans out to.
#[derive(Debug, Clone, Serialize)]
pub struct RouteTarget {
    /// The target shard
    pub shard: Shard,
    /// Whether the shard may return rows at an older schema version
    pub degraded: bool,
}

/// The fan-out plan for one query.
#[derive(Debug, Clone, Serialize)]
pub struct RoutePlan {
    /// Registry version the plan was computed against
    pub registry_version: u64,
    /// Shards the query must visit, in key order
    pub targets: Vec<RouteTarget>,
    /// Stale shards the interval touches that the mode excluded
    pub skipped_stale: Vec<ShardId>,
    /// Shards eliminated by key-range pruning
    pub pruned: usize,
}

/// Prunes shards by partition-key predicates.
pub struct RoutingPlanner {
    key_column: String,
}

impl RoutingPlanner {
    /// Create a planner for a table partitioned on `key_column`.
    pub fn new(key_column: impl Into<String>) -> Self {
        Self {
            key_column: key_column.into(),
        }
    }

    /// The partition key column the planner prunes on.
    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    /// Plan a query against `snapshot`.
    ///
    /// A point lookup resolves through the snapshot directly and fails
    /// with `Unroutable` when the key falls in a vacant range; a scan
    /// that touches a vacant range fails the same way rather than
    /// silently returning partial results.
    pub fn plan(
        &self,
        snapshot: &Arc<RegistrySnapshot>,
        predicates: &[Predicate],
        mode: RouteMode,
    ) -> RoutingResult<RoutePlan> {
        let interval = KeyInterval::from_predicates(&self.key_column, predicates);

        if let Some(key) = interval.as_point() {
            let shard = snapshot.lookup(key)?;
            return self.finish(snapshot, vec![shard.clone()], mode, snapshot.shards.len() - 1);
        }

        if let Some(vacant) = snapshot.vacant.iter().find(|v| interval.intersects(v)) {
            let err = RegistryError::Unroutable {
                key: vacant.low.clone().unwrap_or_default(),
                range: vacant.clone(),
            };
            Logger::warn(
                Event::QueryRejected.as_str(),
                &[("code", err.code()), ("range", &vacant.to_string())],
            );
            return Err(err.into());
        }

        let mut targets = Vec::new();
        let mut pruned = 0;
        for shard in &snapshot.shards {
            if interval.intersects(&shard.range) {
                targets.push(shard.clone());
            } else {
                pruned += 1;
            }
        }
        self.finish(snapshot, targets, mode, pruned)
    }

    fn finish(
        &self,
        snapshot: &Arc<RegistrySnapshot>,
        shards: Vec<Shard>,
        mode: RouteMode,
        pruned: usize,
    ) -> RoutingResult<RoutePlan> {
        let include_stale = matches!(
            mode,
            RouteMode::Read {
                allow_degraded: true
            }
        );
        let mut targets = Vec::new();
        let mut skipped_stale = Vec::new();
        for shard in shards {
            if shard.is_stale() && !include_stale {
                skipped_stale.push(shard.id.clone());
            } else {
                let degraded = shard.is_stale();
                targets.push(RouteTarget { shard, degraded });
            }
        }
        Logger::info(
            Event::QueryPlanned.as_str(),
            &[
                ("registry_version", &snapshot.version.to_string()),
                ("targets", &targets.len().to_string()),
                ("pruned", &pruned.to_string()),
                ("skipped_stale", &skipped_stale.len().to_string()),
            ],
        );
        Ok(RoutePlan {
            registry_version: snapshot.version,
            targets,
            skipped_stale,
            pruned,
        })
    }
}
