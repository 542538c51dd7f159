//! Shard registry with atomic versioned snapshot swap
//!
//! Mutations build a fully validated replacement snapshot and swap it in
//! under a short write lock; readers clone an `Arc` to the current
//! snapshot and never block for longer than one swap. A cutover attaches
//! the destination range and detaches the source's matching sub-range in
//! a single swap, so no reader ever sees a key mapped to zero or two
//! shards.

use super::errors::{RegistryError, RegistryResult};
use super::range::KeyRange;
use super::shard::{Shard, ShardHealth, ShardId, ShardLocation};
use super::snapshot::{cmp_low, RegistrySnapshot};
use crate::observability::{Event, Logger};
use chrono::Utc;
use std::sync::{Arc, RwLock};

/// The live shard registry.
pub struct ShardRegistry {
    inner: RwLock<Arc<RegistrySnapshot>>,
}

impl ShardRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(RegistrySnapshot::empty())),
        }
    }

    /// Create a registry with one shard covering the full key domain.
    pub fn bootstrap(
        id: impl Into<ShardId>,
        location: ShardLocation,
        schema_version: u64,
    ) -> Self {
        let registry = Self::new();
        let shard = Shard::new(id, KeyRange::full(), location, schema_version);
        registry
            .attach(shard)
            .expect("bootstrap attach of the full domain cannot conflict");
        registry
    }

    /// A consistent view of the current shard layout.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.inner.read().expect("registry lock poisoned").clone()
    }

    /// Current registry version.
    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    /// Resolve the shard responsible for `key` against the current snapshot.
    pub fn lookup(&self, key: &str) -> RegistryResult<Shard> {
        self.snapshot().lookup(key).cloned()
    }

    /// Find a shard by id against the current snapshot.
    pub fn get(&self, id: &ShardId) -> RegistryResult<Shard> {
        self.snapshot().get(id).cloned()
    }

    /// Attach a shard.
    ///
    /// Legal only when the shard's range exactly fills a vacant range,
    /// extends an open boundary of the covered domain, or the registry is
    /// empty. Overlap yields `RangeConflict`; a disjoint, non-adjacent
    /// range yields `RangeGap`.
    pub fn attach(&self, shard: Shard) -> RegistryResult<u64> {
        let version = self.mutate(|snap| {
            Self::attach_into(snap, shard.clone())?;
            Ok(())
        })?;
        Logger::info(
            Event::RegistryAttach.as_str(),
            &[
                ("shard", shard.id.as_str()),
                ("range", &shard.range.to_string()),
                ("version", &version.to_string()),
            ],
        );
        Ok(version)
    }

    /// Detach a shard whose row count has been verified to be zero.
    ///
    /// The shard's range is remembered as vacant; an exact-fit attach may
    /// later re-cover it.
    pub fn detach(&self, id: &ShardId, verified_rows: u64) -> RegistryResult<u64> {
        let version = self.mutate(|snap| {
            let pos = snap
                .shards
                .iter()
                .position(|s| &s.id == id)
                .ok_or_else(|| RegistryError::UnknownShard(id.clone()))?;
            if verified_rows != 0 {
                return Err(RegistryError::NotDrained {
                    shard: id.clone(),
                    rows: verified_rows,
                });
            }
            let removed = snap.shards.remove(pos);
            snap.vacant.push(removed.range);
            snap.vacant.sort_by(cmp_low);
            Ok(())
        })?;
        Logger::info(
            Event::RegistryDetach.as_str(),
            &[("shard", id.as_str()), ("version", &version.to_string())],
        );
        Ok(version)
    }

    /// Atomically reassign `sub` from its current owner to `destination`.
    ///
    /// The owner is resolved by range containment inside the swap: a
    /// concurrent cutover can split or rename the shard a job was
    /// submitted against, and ownership of the sub-range is what a
    /// cutover reassigns. The destination shard is attached with range
    /// `sub`; the owner keeps its id on the remainder below the
    /// sub-range (or above, if nothing remains below). An interior
    /// sub-range leaves two remainders; the upper one gets the derived
    /// id `{owner}-hi`.
    pub fn cutover(&self, sub: &KeyRange, destination: Shard) -> RegistryResult<u64> {
        let mut owner_id = None;
        let version = self.mutate(|snap| {
            let pos = match snap.shards.iter().position(|s| s.range.covers(sub)) {
                Some(pos) => pos,
                None => {
                    // No single shard covers the sub-range; report the
                    // one holding its low end.
                    let key = sub.low.clone().unwrap_or_default();
                    let shard = snap.lookup(&key)?;
                    return Err(RegistryError::SubRangeOutOfBounds {
                        shard: shard.id.clone(),
                        range: shard.range.clone(),
                        sub: sub.clone(),
                    });
                }
            };
            let source = snap.shards.remove(pos);
            owner_id = Some(source.id.clone());
            let remainders = source.range.subtract(sub);
            for (i, range) in remainders.iter().enumerate() {
                let mut remainder = source.clone();
                remainder.range = range.clone();
                if i > 0 {
                    // Unique even when an earlier split already minted
                    // a derived id for this source
                    let mut derived = format!("{}-hi", source.id);
                    while snap.shards.iter().any(|s| s.id.as_str() == derived) {
                        derived.push_str("-hi");
                    }
                    remainder.id = ShardId::new(derived);
                }
                snap.shards.push(remainder);
            }
            let mut destination = destination;
            destination.range = sub.clone();
            snap.shards.push(destination);
            snap.shards.sort_by(|a, b| cmp_low(&a.range, &b.range));
            Ok(())
        })?;
        Logger::info(
            Event::CutoverCommit.as_str(),
            &[
                (
                    "source",
                    owner_id.as_ref().map(|id| id.as_str()).unwrap_or(""),
                ),
                ("range", &sub.to_string()),
                ("version", &version.to_string()),
            ],
        );
        Ok(version)
    }

    /// Mark a shard stale (missed DDL propagation).
    pub fn mark_stale(&self, id: &ShardId) -> RegistryResult<u64> {
        let version = self.update_shard(id, |shard| {
            if !shard.is_stale() {
                shard.health = ShardHealth::Stale { since: Utc::now() };
            }
        })?;
        Logger::warn(
            Event::ShardStale.as_str(),
            &[("shard", id.as_str()), ("version", &version.to_string())],
        );
        Ok(version)
    }

    /// Mark a shard healthy at `applied_version` after it caught up.
    pub fn mark_healthy(&self, id: &ShardId, applied_version: u64) -> RegistryResult<u64> {
        let version = self.update_shard(id, |shard| {
            shard.health = ShardHealth::Healthy;
            shard.applied_version = applied_version;
        })?;
        Logger::info(
            Event::ShardCaughtUp.as_str(),
            &[
                ("shard", id.as_str()),
                ("applied_version", &applied_version.to_string()),
            ],
        );
        Ok(version)
    }

    /// Record the schema version applied at a shard.
    pub fn set_applied_version(&self, id: &ShardId, applied: u64) -> RegistryResult<u64> {
        self.update_shard(id, |shard| {
            shard.applied_version = applied;
        })
    }

    /// Refresh a shard's row-count estimate.
    pub fn set_rows_estimate(&self, id: &ShardId, rows: u64) -> RegistryResult<u64> {
        self.update_shard(id, |shard| {
            shard.rows_estimate = rows;
        })
    }

    /// Apply `f` to a copy of the current snapshot, validate the result,
    /// bump the version, and swap it in.
    fn mutate<F>(&self, f: F) -> RegistryResult<u64>
    where
        F: FnOnce(&mut RegistrySnapshot) -> RegistryResult<()>,
    {
        let mut guard = self.inner.write().expect("registry lock poisoned");
        let mut next = (**guard).clone();
        f(&mut next)?;
        next.version += 1;
        debug_assert!(next.validate().is_ok(), "registry tiling invariant broken");
        let version = next.version;
        *guard = Arc::new(next);
        Ok(version)
    }

    fn update_shard<F>(&self, id: &ShardId, f: F) -> RegistryResult<u64>
    where
        F: FnOnce(&mut Shard),
    {
        self.mutate(|snap| {
            let shard = snap
                .shards
                .iter_mut()
                .find(|s| &s.id == id)
                .ok_or_else(|| RegistryError::UnknownShard(id.clone()))?;
            f(shard);
            Ok(())
        })
    }

    /// Attach logic shared by `attach` and bootstrap.
    fn attach_into(snap: &mut RegistrySnapshot, shard: Shard) -> RegistryResult<()> {
        // Exact fill of a vacant range
        if let Some(pos) = snap.vacant.iter().position(|v| *v == shard.range) {
            snap.vacant.remove(pos);
            snap.shards.push(shard);
            snap.shards.sort_by(|a, b| cmp_low(&a.range, &b.range));
            return Ok(());
        }
        if let Some(existing) = snap.find_overlap(&shard.range) {
            return Err(RegistryError::RangeConflict {
                range: shard.range.clone(),
                existing,
            });
        }
        match snap.coverage() {
            None => {
                // Empty registry: first shard defines the covered domain.
                snap.shards.push(shard);
            }
            Some(cov) => {
                let extends_high =
                    cov.high.is_some() && shard.range.low == cov.high;
                let extends_low =
                    cov.low.is_some() && shard.range.high == cov.low;
                if !extends_high && !extends_low {
                    return Err(RegistryError::RangeGap {
                        range: shard.range.clone(),
                    });
                }
                snap.shards.push(shard);
                snap.shards.sort_by(|a, b| cmp_low(&a.range, &b.range));
            }
        }
        Ok(())
    }
}

impl Default for ShardRegistry {
    fn default() -> Self {
        Self::new()
    }
}
