//! Immutable registry snapshots
//!
//! A snapshot is the unit of consistency for readers: every lookup and
//! every routing plan runs against one snapshot, never against the live
//! registry. Snapshots are replaced wholesale on mutation, never edited
//! in place.

use super::errors::{RegistryError, RegistryResult};
use super::range::KeyRange;
use super::shard::{Shard, ShardId};
use serde::{Deserialize, Serialize};

/// One immutable view of the shard layout.
///
/// `shards` and `vacant` together tile the covered domain: ranges are
/// sorted, contiguous, and non-overlapping. A vacant range is a detached
/// sub-range waiting for an exact-fit attach; keys inside it are
/// unroutable until then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// Monotonic registry version, bumped on every mutation
    pub version: u64,
    /// Shards sorted by range lower bound
    pub shards: Vec<Shard>,
    /// Detached ranges not yet re-covered, sorted by lower bound
    pub vacant: Vec<KeyRange>,
}

/// Internal tiling entry used for ordering and contiguity checks.
enum Tile<'a> {
    Shard(&'a Shard),
    Vacant(&'a KeyRange),
}

impl<'a> Tile<'a> {
    fn range(&self) -> &KeyRange {
        match self {
            Tile::Shard(s) => &s.range,
            Tile::Vacant(r) => r,
        }
    }
}

impl RegistrySnapshot {
    /// An empty snapshot at version 0.
    pub fn empty() -> Self {
        Self {
            version: 0,
            shards: Vec::new(),
            vacant: Vec::new(),
        }
    }

    /// Resolve the shard responsible for `key`.
    ///
    /// Runs in O(log n) over the sorted shard list. A key inside a vacant
    /// range or outside the covered domain is unroutable.
    pub fn lookup(&self, key: &str) -> RegistryResult<&Shard> {
        // partition_point: number of shards whose low bound is <= key
        let idx = self
            .shards
            .partition_point(|s| low_le(&s.range, key));
        if idx > 0 {
            let shard = &self.shards[idx - 1];
            if shard.range.contains(key) {
                return Ok(shard);
            }
        }
        Err(RegistryError::Unroutable {
            key: key.to_string(),
            range: self.uncovered_range_for(key),
        })
    }

    /// Find a shard by id.
    pub fn get(&self, id: &ShardId) -> RegistryResult<&Shard> {
        self.shards
            .iter()
            .find(|s| &s.id == id)
            .ok_or_else(|| RegistryError::UnknownShard(id.clone()))
    }

    /// Whether any shard or vacant range overlaps `range`.
    pub fn find_overlap(&self, range: &KeyRange) -> Option<KeyRange> {
        self.tiles()
            .into_iter()
            .map(|t| t.range().clone())
            .find(|r| r.overlaps(range))
    }

    /// The range of the whole covered domain, if non-empty.
    pub fn coverage(&self) -> Option<KeyRange> {
        let tiles = self.tiles();
        let first = tiles.first()?;
        let last = tiles.last()?;
        Some(KeyRange {
            low: first.range().low.clone(),
            high: last.range().high.clone(),
        })
    }

    /// Verify the tiling invariant: sorted, contiguous, non-overlapping.
    pub fn validate(&self) -> Result<(), String> {
        let tiles = self.tiles();
        for pair in tiles.windows(2) {
            let a = pair[0].range();
            let b = pair[1].range();
            if a.overlaps(b) {
                return Err(format!("ranges {} and {} overlap", a, b));
            }
            if !a.abuts(b) {
                return Err(format!("gap between {} and {}", a, b));
            }
        }
        for tile in &tiles {
            if tile.range().is_empty() {
                return Err(format!("empty range {}", tile.range()));
            }
        }
        let mut ids: Vec<&str> = self.shards.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        for pair in ids.windows(2) {
            if pair[0] == pair[1] {
                return Err(format!("duplicate shard id {}", pair[0]));
            }
        }
        Ok(())
    }

    /// All shard and vacant ranges, sorted by lower bound.
    fn tiles(&self) -> Vec<Tile<'_>> {
        let mut tiles: Vec<Tile<'_>> = self
            .shards
            .iter()
            .map(Tile::Shard)
            .chain(self.vacant.iter().map(Tile::Vacant))
            .collect();
        tiles.sort_by(|a, b| cmp_low(a.range(), b.range()));
        tiles
    }

    /// The vacant or uncovered region containing `key`.
    fn uncovered_range_for(&self, key: &str) -> KeyRange {
        if let Some(v) = self.vacant.iter().find(|r| r.contains(key)) {
            return v.clone();
        }
        match self.coverage() {
            Some(cov) => {
                if let Some(low) = &cov.low {
                    if key < low.as_str() {
                        return KeyRange::up_to(low.clone());
                    }
                }
                match cov.high {
                    Some(high) => KeyRange::from(high),
                    None => KeyRange::full(),
                }
            }
            None => KeyRange::full(),
        }
    }
}

/// Whether `range.low <= key` (open low bound sorts below every key).
fn low_le(range: &KeyRange, key: &str) -> bool {
    match &range.low {
        None => true,
        Some(l) => l.as_str() <= key,
    }
}

/// Order ranges by lower bound, open bound first.
pub(super) fn cmp_low(a: &KeyRange, b: &KeyRange) -> std::cmp::Ordering {
    match (&a.low, &b.low) {
        (None, None) => std::cmp::Ordering::Equal,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::shard::ShardLocation;

    fn snapshot_abc() -> RegistrySnapshot {
        RegistrySnapshot {
            version: 3,
            shards: vec![
                Shard::new("a", KeyRange::up_to("B"), ShardLocation::local("t_a"), 1),
                Shard::new("b", KeyRange::new("B", "D"), ShardLocation::local("t_b"), 1),
                Shard::new("c", KeyRange::from("D"), ShardLocation::local("t_c"), 1),
            ],
            vacant: Vec::new(),
        }
    }

    #[test]
    fn test_lookup_resolves_to_owning_shard() {
        let snap = snapshot_abc();
        assert_eq!(snap.lookup("A").unwrap().id.as_str(), "a");
        assert_eq!(snap.lookup("B").unwrap().id.as_str(), "b");
        assert_eq!(snap.lookup("C9").unwrap().id.as_str(), "b");
        assert_eq!(snap.lookup("D").unwrap().id.as_str(), "c");
        assert_eq!(snap.lookup("Z").unwrap().id.as_str(), "c");
    }

    #[test]
    fn test_lookup_vacant_is_unroutable() {
        let mut snap = snapshot_abc();
        snap.shards.remove(1);
        snap.vacant.push(KeyRange::new("B", "D"));
        let err = snap.lookup("C").unwrap_err();
        assert_eq!(err.code(), "KSPAN_UNROUTABLE");
    }

    #[test]
    fn test_validate_accepts_contiguous_tiling() {
        assert!(snapshot_abc().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_gap() {
        let mut snap = snapshot_abc();
        snap.shards.remove(1); // hole at ['B','D') with no vacant record
        assert!(snap.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overlap() {
        let mut snap = snapshot_abc();
        snap.shards[1].range = KeyRange::new("A", "D");
        assert!(snap.validate().is_err());
    }

    #[test]
    fn test_coverage_full_domain() {
        assert_eq!(snapshot_abc().coverage(), Some(KeyRange::full()));
        assert_eq!(RegistrySnapshot::empty().coverage(), None);
    }
}
