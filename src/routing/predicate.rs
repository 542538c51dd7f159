//! Query predicates and key-interval extraction
//!
//! Shard pruning only ever looks at comparisons on the partition key.
//! The extracted interval is a conservative superset of the keys the
//! predicates can match: when in doubt a shard stays in the plan, it is
//! never pruned incorrectly.

use crate::engine::Row;
use crate::registry::KeyRange;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator in a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    /// Equals
    Eq,
    /// Strictly less than
    Lt,
    /// Less than or equal
    Lte,
    /// Strictly greater than
    Gt,
    /// Greater than or equal
    Gte,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
        };
        write!(f, "{}", symbol)
    }
}

/// A single-column comparison against a literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    /// Column the comparison applies to
    pub column: String,
    /// Comparison operator
    pub op: CmpOp,
    /// Literal value, compared with string ordering
    pub value: String,
}

impl Predicate {
    /// Build a predicate.
    pub fn new(column: impl Into<String>, op: CmpOp, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    /// Shorthand for an equality predicate.
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(column, CmpOp::Eq, value)
    }

    /// Evaluate the predicate against one row.
    ///
    /// The partition key compares as a string; other columns compare in
    /// their own type, with the literal parsed accordingly. A null or
    /// missing column never matches.
    pub fn matches(&self, key_column: &str, row: &Row) -> bool {
        let ordering = if self.column == key_column {
            Some(row.key.as_str().cmp(self.value.as_str()))
        } else {
            row.fields
                .get(&self.column)
                .and_then(|v| compare_value(v, &self.value))
        };
        match ordering {
            Some(ord) => match self.op {
                CmpOp::Eq => ord == Ordering::Equal,
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Lte => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                CmpOp::Gte => ord != Ordering::Less,
            },
            None => false,
        }
    }
}

/// Compare a stored value against a literal, in the stored value's type.
fn compare_value(value: &Value, literal: &str) -> Option<Ordering> {
    match value {
        Value::String(s) => Some(s.as_str().cmp(literal)),
        Value::Number(n) => {
            let lhs = n.as_f64()?;
            let rhs: f64 = literal.parse().ok()?;
            lhs.partial_cmp(&rhs)
        }
        Value::Bool(b) => {
            let rhs: bool = literal.parse().ok()?;
            Some(b.cmp(&rhs))
        }
        _ => None,
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.column, self.op, self.value)
    }
}

/// Conservative key interval implied by a predicate set.
///
/// `low` is inclusive; `high` carries its own inclusivity. A strict
/// lower bound (`key > v`) is widened to `key >= v`, which can only keep
/// an extra shard, never drop one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInterval {
    /// Inclusive lower bound; `None` = unbounded
    pub low: Option<String>,
    /// Upper bound with inclusivity; `None` = unbounded
    pub high: Option<(String, bool)>,
}

impl KeyInterval {
    /// The unbounded interval.
    pub fn unbounded() -> Self {
        Self {
            low: None,
            high: None,
        }
    }

    /// Intersect the key-column predicates of `predicates` into one
    /// interval. Predicates on other columns are ignored.
    pub fn from_predicates(key_column: &str, predicates: &[Predicate]) -> Self {
        let mut interval = Self::unbounded();
        for p in predicates.iter().filter(|p| p.column == key_column) {
            match p.op {
                CmpOp::Eq => {
                    interval.tighten_low(&p.value);
                    interval.tighten_high(&p.value, true);
                }
                CmpOp::Gte | CmpOp::Gt => interval.tighten_low(&p.value),
                CmpOp::Lt => interval.tighten_high(&p.value, false),
                CmpOp::Lte => interval.tighten_high(&p.value, true),
            }
        }
        interval
    }

    fn tighten_low(&mut self, value: &str) {
        if self.low.as_deref() < Some(value) || self.low.is_none() {
            self.low = Some(value.to_string());
        }
    }

    fn tighten_high(&mut self, value: &str, inclusive: bool) {
        let tighter = match &self.high {
            None => true,
            Some((h, h_incl)) => {
                value < h.as_str() || (value == h.as_str() && *h_incl && !inclusive)
            }
        };
        if tighter {
            self.high = Some((value.to_string(), inclusive));
        }
    }

    /// Whether the interval matches no key at all.
    pub fn is_empty(&self) -> bool {
        match (&self.low, &self.high) {
            (Some(l), Some((h, inclusive))) => {
                if *inclusive {
                    l > h
                } else {
                    l >= h
                }
            }
            _ => false,
        }
    }

    /// Whether any key in the interval can fall inside `range`.
    pub fn intersects(&self, range: &KeyRange) -> bool {
        if self.is_empty() || range.is_empty() {
            return false;
        }
        if let (Some(l), Some(range_high)) = (&self.low, &range.high) {
            if l >= range_high {
                return false;
            }
        }
        if let (Some((h, inclusive)), Some(range_low)) = (&self.high, &range.low) {
            let below = if *inclusive { h < range_low } else { h <= range_low };
            if below {
                return false;
            }
        }
        true
    }

    /// The single key the interval pins down, if it is a point.
    pub fn as_point(&self) -> Option<&str> {
        match (&self.low, &self.high) {
            (Some(l), Some((h, true))) if l == h => Some(l),
            _ => None,
        }
    }
}
