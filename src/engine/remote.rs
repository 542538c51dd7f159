//! Remote shard connectivity
//!
//! `RemoteEngine` is the transport seam for shards that live behind a
//! network endpoint. It forwards every operation to the engine at the
//! endpoint and surfaces connectivity failures as `Unreachable`, distinct
//! from logical errors. The wrapper also supports fault injection so
//! tests can hold a shard unreachable during DDL or migration.

use super::errors::{EngineError, EngineResult};
use super::ops::ShardEngine;
use super::row::Row;
use crate::registry::KeyRange;
use crate::schema::ColumnDef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// An addressable remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEndpoint {
    /// Remote host
    pub host: String,
    /// Remote port
    pub port: u16,
    /// User to connect as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl RemoteEndpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            user: None,
        }
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A `ShardEngine` reached over a network transport.
///
/// The inner engine stands in for the engine running at the endpoint;
/// a wire client implementing `ShardEngine` plugs in the same way.
pub struct RemoteEngine {
    endpoint: RemoteEndpoint,
    inner: Arc<dyn ShardEngine>,
    reachable: AtomicBool,
    // Fail the next N operations, then recover (fault injection)
    fail_budget: AtomicU32,
}

impl RemoteEngine {
    /// Wrap the engine at `endpoint`.
    pub fn new(endpoint: RemoteEndpoint, inner: Arc<dyn ShardEngine>) -> Self {
        Self {
            endpoint,
            inner,
            reachable: AtomicBool::new(true),
            fail_budget: AtomicU32::new(0),
        }
    }

    /// The endpoint this engine talks to.
    pub fn endpoint(&self) -> &RemoteEndpoint {
        &self.endpoint
    }

    /// Simulate a network partition (or heal it).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Fail the next `n` operations with `Unreachable`, then recover.
    pub fn fail_next(&self, n: u32) {
        self.fail_budget.store(n, Ordering::SeqCst);
    }

    fn check(&self) -> EngineResult<()> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(EngineError::Unreachable {
                endpoint: self.endpoint.to_string(),
            });
        }
        if self
            .fail_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EngineError::Unreachable {
                endpoint: self.endpoint.to_string(),
            });
        }
        Ok(())
    }
}

impl ShardEngine for RemoteEngine {
    fn create_table(&self, table: &str, columns: &[ColumnDef]) -> EngineResult<()> {
        self.check()?;
        self.inner.create_table(table, columns)
    }

    fn drop_table(&self, table: &str) -> EngineResult<()> {
        self.check()?;
        self.inner.drop_table(table)
    }

    fn has_table(&self, table: &str) -> EngineResult<bool> {
        self.check()?;
        self.inner.has_table(table)
    }

    fn add_column(&self, table: &str, column: &ColumnDef) -> EngineResult<()> {
        self.check()?;
        self.inner.add_column(table, column)
    }

    fn drop_column(&self, table: &str, name: &str) -> EngineResult<()> {
        self.check()?;
        self.inner.drop_column(table, name)
    }

    fn columns(&self, table: &str) -> EngineResult<Vec<ColumnDef>> {
        self.check()?;
        self.inner.columns(table)
    }

    fn upsert(&self, table: &str, rows: &[Row]) -> EngineResult<usize> {
        self.check()?;
        self.inner.upsert(table, rows)
    }

    fn scan(&self, table: &str, range: &KeyRange, limit: Option<usize>) -> EngineResult<Vec<Row>> {
        self.check()?;
        self.inner.scan(table, range, limit)
    }

    fn delete_keys(&self, table: &str, keys: &[String]) -> EngineResult<usize> {
        self.check()?;
        self.inner.delete_keys(table, keys)
    }

    fn row_count(&self, table: &str, range: &KeyRange) -> EngineResult<u64> {
        self.check()?;
        self.inner.row_count(table, range)
    }

    fn checksum(&self, table: &str, range: &KeyRange) -> EngineResult<u32> {
        self.check()?;
        self.inner.checksum(table, range)
    }
}
