//! In-memory storage engine
//!
//! BTreeMap-backed engine used for local shards and tests. Key order is
//! the map order, so range scans and range-based pruning behave like a
//! primary-key index.

use super::errors::{EngineError, EngineResult};
use super::ops::ShardEngine;
use super::row::{fold_checksum, Row};
use crate::registry::KeyRange;
use crate::schema::ColumnDef;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Mutex;

struct MemTable {
    columns: Vec<ColumnDef>,
    rows: BTreeMap<String, Map<String, Value>>,
}

impl MemTable {
    /// Project stored fields onto the current column set.
    fn project(&self, key: &str, fields: &Map<String, Value>) -> Row {
        let mut projected = Map::new();
        for col in &self.columns {
            let value = fields.get(&col.name).cloned().unwrap_or(Value::Null);
            projected.insert(col.name.clone(), value);
        }
        Row::new(key.to_string(), projected)
    }
}

/// An in-memory `ShardEngine`.
pub struct MemoryEngine {
    tables: Mutex<HashMap<String, MemTable>>,
}

impl MemoryEngine {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// BTreeMap range bounds for a key range.
fn btree_bounds(range: &KeyRange) -> (Bound<String>, Bound<String>) {
    let low = match &range.low {
        Some(l) => Bound::Included(l.clone()),
        None => Bound::Unbounded,
    };
    let high = match &range.high {
        Some(h) => Bound::Excluded(h.clone()),
        None => Bound::Unbounded,
    };
    (low, high)
}

impl ShardEngine for MemoryEngine {
    fn create_table(&self, table: &str, columns: &[ColumnDef]) -> EngineResult<()> {
        let mut tables = self.tables.lock().expect("engine lock poisoned");
        if tables.contains_key(table) {
            return Err(EngineError::DuplicateTable {
                table: table.to_string(),
            });
        }
        tables.insert(
            table.to_string(),
            MemTable {
                columns: columns.to_vec(),
                rows: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn drop_table(&self, table: &str) -> EngineResult<()> {
        let mut tables = self.tables.lock().expect("engine lock poisoned");
        tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| EngineError::UnknownTable {
                table: table.to_string(),
            })
    }

    fn has_table(&self, table: &str) -> EngineResult<bool> {
        let tables = self.tables.lock().expect("engine lock poisoned");
        Ok(tables.contains_key(table))
    }

    fn add_column(&self, table: &str, column: &ColumnDef) -> EngineResult<()> {
        let mut tables = self.tables.lock().expect("engine lock poisoned");
        let t = tables.get_mut(table).ok_or_else(|| EngineError::UnknownTable {
            table: table.to_string(),
        })?;
        if t.columns.iter().any(|c| c.name == column.name) {
            return Err(EngineError::DuplicateColumn {
                table: table.to_string(),
                column: column.name.clone(),
            });
        }
        t.columns.push(column.clone());
        Ok(())
    }

    fn drop_column(&self, table: &str, name: &str) -> EngineResult<()> {
        let mut tables = self.tables.lock().expect("engine lock poisoned");
        let t = tables.get_mut(table).ok_or_else(|| EngineError::UnknownTable {
            table: table.to_string(),
        })?;
        let pos = t
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| EngineError::UnknownColumn {
                table: table.to_string(),
                column: name.to_string(),
            })?;
        t.columns.remove(pos);
        Ok(())
    }

    fn columns(&self, table: &str) -> EngineResult<Vec<ColumnDef>> {
        let tables = self.tables.lock().expect("engine lock poisoned");
        let t = tables.get(table).ok_or_else(|| EngineError::UnknownTable {
            table: table.to_string(),
        })?;
        Ok(t.columns.clone())
    }

    fn upsert(&self, table: &str, rows: &[Row]) -> EngineResult<usize> {
        let mut tables = self.tables.lock().expect("engine lock poisoned");
        let t = tables.get_mut(table).ok_or_else(|| EngineError::UnknownTable {
            table: table.to_string(),
        })?;
        for row in rows {
            t.rows.insert(row.key.clone(), row.fields.clone());
        }
        Ok(rows.len())
    }

    fn scan(&self, table: &str, range: &KeyRange, limit: Option<usize>) -> EngineResult<Vec<Row>> {
        let tables = self.tables.lock().expect("engine lock poisoned");
        let t = tables.get(table).ok_or_else(|| EngineError::UnknownTable {
            table: table.to_string(),
        })?;
        let limit = limit.unwrap_or(usize::MAX);
        Ok(t.rows
            .range(btree_bounds(range))
            .take(limit)
            .map(|(key, fields)| t.project(key, fields))
            .collect())
    }

    fn delete_keys(&self, table: &str, keys: &[String]) -> EngineResult<usize> {
        let mut tables = self.tables.lock().expect("engine lock poisoned");
        let t = tables.get_mut(table).ok_or_else(|| EngineError::UnknownTable {
            table: table.to_string(),
        })?;
        let mut deleted = 0;
        for key in keys {
            if t.rows.remove(key).is_some() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    fn row_count(&self, table: &str, range: &KeyRange) -> EngineResult<u64> {
        let tables = self.tables.lock().expect("engine lock poisoned");
        let t = tables.get(table).ok_or_else(|| EngineError::UnknownTable {
            table: table.to_string(),
        })?;
        Ok(t.rows.range(btree_bounds(range)).count() as u64)
    }

    fn checksum(&self, table: &str, range: &KeyRange) -> EngineResult<u32> {
        let tables = self.tables.lock().expect("engine lock poisoned");
        let t = tables.get(table).ok_or_else(|| EngineError::UnknownTable {
            table: table.to_string(),
        })?;
        let mut aggregate = 0u32;
        for (key, fields) in t.rows.range(btree_bounds(range)) {
            aggregate = fold_checksum(aggregate, &t.project(key, fields));
        }
        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use serde_json::json;

    fn engine_with_rows() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine
            .create_table(
                "events",
                &[ColumnDef::string("id"), ColumnDef::string("title")],
            )
            .unwrap();
        engine
            .upsert(
                "events",
                &[
                    Row::from_pairs("A1", &[("id", json!("A1")), ("title", json!("t1"))]),
                    Row::from_pairs("B1", &[("id", json!("B1")), ("title", json!("t2"))]),
                    Row::from_pairs("C1", &[("id", json!("C1")), ("title", json!("t3"))]),
                ],
            )
            .unwrap();
        engine
    }

    #[test]
    fn test_scan_respects_range_and_order() {
        let engine = engine_with_rows();
        let rows = engine
            .scan("events", &KeyRange::new("B", "D"), None)
            .unwrap();
        let keys: Vec<&str> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["B1", "C1"]);
    }

    #[test]
    fn test_scan_limit() {
        let engine = engine_with_rows();
        let rows = engine.scan("events", &KeyRange::full(), Some(2)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "A1");
    }

    #[test]
    fn test_upsert_replaces_by_key() {
        let engine = engine_with_rows();
        engine
            .upsert(
                "events",
                &[Row::from_pairs(
                    "A1",
                    &[("id", json!("A1")), ("title", json!("updated"))],
                )],
            )
            .unwrap();
        assert_eq!(engine.row_count("events", &KeyRange::full()).unwrap(), 3);
        let rows = engine
            .scan("events", &KeyRange::new("A", "B"), None)
            .unwrap();
        assert_eq!(rows[0].fields["title"], json!("updated"));
    }

    #[test]
    fn test_added_column_projected_as_null() {
        let engine = engine_with_rows();
        engine
            .add_column(
                "events",
                &ColumnDef::nullable("difficulty", ColumnType::Int),
            )
            .unwrap();
        let rows = engine.scan("events", &KeyRange::full(), None).unwrap();
        assert!(rows.iter().all(|r| r.fields["difficulty"].is_null()));
    }

    #[test]
    fn test_dropped_column_disappears_from_scans() {
        let engine = engine_with_rows();
        engine.drop_column("events", "title").unwrap();
        let rows = engine.scan("events", &KeyRange::full(), None).unwrap();
        assert!(rows.iter().all(|r| !r.fields.contains_key("title")));
    }

    #[test]
    fn test_delete_keys_counts_existing_only() {
        let engine = engine_with_rows();
        let deleted = engine
            .delete_keys("events", &["A1".into(), "missing".into()])
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(engine.row_count("events", &KeyRange::full()).unwrap(), 2);
        // Deleting again is a no-op
        assert_eq!(engine.delete_keys("events", &["A1".into()]).unwrap(), 0);
    }

    #[test]
    fn test_checksum_matches_across_engines() {
        let a = engine_with_rows();
        let b = engine_with_rows();
        assert_eq!(
            a.checksum("events", &KeyRange::full()).unwrap(),
            b.checksum("events", &KeyRange::full()).unwrap()
        );
    }

    #[test]
    fn test_unknown_table_rejected() {
        let engine = MemoryEngine::new();
        let err = engine.scan("nope", &KeyRange::full(), None).unwrap_err();
        assert_eq!(err.code(), "KSPAN_ENGINE_UNKNOWN_TABLE");
    }
}
