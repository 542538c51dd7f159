//! Key range model for the shard registry
//!
//! Ranges are half-open `[low, high)` over the partition key. An absent
//! bound means the range is open on that side (domain minimum or maximum).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open key range `[low, high)`.
///
/// `low: None` means the range starts at the domain minimum;
/// `high: None` means it extends to the domain maximum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    /// Inclusive lower bound; `None` = domain minimum
    pub low: Option<String>,
    /// Exclusive upper bound; `None` = domain maximum
    pub high: Option<String>,
}

impl KeyRange {
    /// Create a bounded range `[low, high)`.
    pub fn new(low: impl Into<String>, high: impl Into<String>) -> Self {
        Self {
            low: Some(low.into()),
            high: Some(high.into()),
        }
    }

    /// The full key domain.
    pub fn full() -> Self {
        Self {
            low: None,
            high: None,
        }
    }

    /// Range from the domain minimum up to `high` (exclusive).
    pub fn up_to(high: impl Into<String>) -> Self {
        Self {
            low: None,
            high: Some(high.into()),
        }
    }

    /// Range from `low` (inclusive) to the domain maximum.
    pub fn from(low: impl Into<String>) -> Self {
        Self {
            low: Some(low.into()),
            high: None,
        }
    }

    /// Whether the range contains no keys.
    ///
    /// A range is empty when both bounds are present and `low >= high`.
    pub fn is_empty(&self) -> bool {
        match (&self.low, &self.high) {
            (Some(l), Some(h)) => l >= h,
            _ => false,
        }
    }

    /// Whether `key` falls inside the range.
    pub fn contains(&self, key: &str) -> bool {
        let above_low = match &self.low {
            Some(l) => key >= l.as_str(),
            None => true,
        };
        let below_high = match &self.high {
            Some(h) => key < h.as_str(),
            None => true,
        };
        above_low && below_high
    }

    /// Whether two ranges share at least one key.
    pub fn overlaps(&self, other: &KeyRange) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let low_ok = match (&self.low, &other.high) {
            (Some(l), Some(h)) => l < h,
            _ => true,
        };
        let high_ok = match (&self.high, &other.low) {
            (Some(h), Some(l)) => l < h,
            _ => true,
        };
        low_ok && high_ok
    }

    /// Whether `other` lies entirely inside this range.
    pub fn covers(&self, other: &KeyRange) -> bool {
        let low_ok = match (&self.low, &other.low) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => a <= b,
        };
        let high_ok = match (&self.high, &other.high) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => b <= a,
        };
        low_ok && high_ok
    }

    /// Whether this range ends exactly where `other` begins.
    pub fn abuts(&self, other: &KeyRange) -> bool {
        match (&self.high, &other.low) {
            (Some(h), Some(l)) => h == l,
            _ => false,
        }
    }

    /// The parts of this range not covered by `sub` (zero, one, or two
    /// pieces). `sub` must lie inside this range.
    pub fn subtract(&self, sub: &KeyRange) -> Vec<KeyRange> {
        let mut remainders = Vec::new();
        // Piece below the sub-range
        match (&self.low, &sub.low) {
            (_, None) => {}
            (low, Some(sub_low)) => {
                let below = KeyRange {
                    low: low.clone(),
                    high: Some(sub_low.clone()),
                };
                if !below.is_empty() && (low.is_none() || low.as_deref() < Some(sub_low.as_str())) {
                    remainders.push(below);
                }
            }
        }
        // Piece above the sub-range
        match (&sub.high, &self.high) {
            (None, _) => {}
            (Some(sub_high), high) => {
                let above = KeyRange {
                    low: Some(sub_high.clone()),
                    high: high.clone(),
                };
                if !above.is_empty()
                    && (high.is_none() || high.as_deref() > Some(sub_high.as_str()))
                {
                    remainders.push(above);
                }
            }
        }
        remainders
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let low = self.low.as_deref().unwrap_or("-inf");
        let high = self.high.as_deref().unwrap_or("+inf");
        write!(f, "[{}, {})", low, high)
    }
}
