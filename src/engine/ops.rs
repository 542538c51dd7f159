//! The storage engine seam
//!
//! `ShardEngine` is the contract between keyspan and the single-node
//! relational engine behind each shard. Everything above this trait is
//! engine-agnostic: the registry, synchronizer, orchestrator, and planner
//! only see these operations.

use super::errors::EngineResult;
use super::row::Row;
use crate::registry::KeyRange;
use crate::schema::ColumnDef;

/// Operations keyspan consumes from a shard's storage engine.
///
/// `upsert` must be idempotent by key: re-writing a row that is already
/// present replaces it. Chunked migration relies on this to make chunk
/// replay after a crash harmless.
pub trait ShardEngine: Send + Sync {
    /// Create a physical table with the given columns.
    fn create_table(&self, table: &str, columns: &[ColumnDef]) -> EngineResult<()>;

    /// Drop a physical table and all its rows.
    fn drop_table(&self, table: &str) -> EngineResult<()>;

    /// Whether the physical table exists.
    fn has_table(&self, table: &str) -> EngineResult<bool>;

    /// Add a column to a physical table.
    fn add_column(&self, table: &str, column: &ColumnDef) -> EngineResult<()>;

    /// Drop a column from a physical table.
    fn drop_column(&self, table: &str, name: &str) -> EngineResult<()>;

    /// The physical table's current column set.
    fn columns(&self, table: &str) -> EngineResult<Vec<ColumnDef>>;

    /// Insert rows, replacing any existing row with the same key.
    fn upsert(&self, table: &str, rows: &[Row]) -> EngineResult<usize>;

    /// Rows in `range` ordered by key, up to `limit`.
    ///
    /// Rows are projected onto the table's current column set: missing
    /// columns come back as null, dropped columns are omitted.
    fn scan(&self, table: &str, range: &KeyRange, limit: Option<usize>) -> EngineResult<Vec<Row>>;

    /// Delete rows by key, returning how many existed.
    fn delete_keys(&self, table: &str, keys: &[String]) -> EngineResult<usize>;

    /// Number of rows whose key falls in `range`.
    fn row_count(&self, table: &str, range: &KeyRange) -> EngineResult<u64>;

    /// Order-independent XOR aggregate of per-row checksums over `range`.
    fn checksum(&self, table: &str, range: &KeyRange) -> EngineResult<u32>;
}
