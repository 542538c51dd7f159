//! Schema synchronizer
//!
//! DDL is applied once against the catalog, then propagated to every
//! shard's physical location. Local and remote shards share one path;
//! the difference is that remote propagation can fail on connectivity,
//! in which case the shard is marked stale and the change waits in the
//! change log for `catch_up` to replay it in order. Local application
//! never waits on remote success.

use super::errors::{SyncError, SyncResult};
use super::retry::RetryPolicy;
use crate::engine::{EngineError, EngineSet, ShardEngine};
use crate::observability::{Event, Logger};
use crate::registry::{Shard, ShardId, ShardRegistry};
use crate::schema::{DdlChange, LogicalTable};
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Outcome of one DDL request.
#[derive(Debug, Clone, Serialize)]
pub struct DdlReport {
    /// The catalog version the change produced
    pub version: u64,
    /// Shards the change was applied to
    pub applied: Vec<ShardId>,
    /// Shards left stale (unreachable within the retry budget)
    pub deferred: Vec<ShardId>,
}

/// Propagates catalog changes to shards and tracks per-shard versions.
pub struct SchemaSynchronizer {
    catalog: Mutex<LogicalTable>,
    // (version, change) pairs in application order, for stale replay
    change_log: Mutex<Vec<(u64, DdlChange)>>,
    registry: Arc<ShardRegistry>,
    engines: Arc<EngineSet>,
    retry: RetryPolicy,
}

impl SchemaSynchronizer {
    /// Create a synchronizer over a validated logical table.
    pub fn new(
        table: LogicalTable,
        registry: Arc<ShardRegistry>,
        engines: Arc<EngineSet>,
        retry: RetryPolicy,
    ) -> SyncResult<Self> {
        table.validate_structure()?;
        Ok(Self {
            catalog: Mutex::new(table),
            change_log: Mutex::new(Vec::new()),
            registry,
            engines,
            retry,
        })
    }

    /// A copy of the current catalog.
    pub fn catalog(&self) -> LogicalTable {
        self.catalog.lock().expect("catalog lock poisoned").clone()
    }

    /// Current catalog schema version.
    pub fn catalog_version(&self) -> u64 {
        self.catalog.lock().expect("catalog lock poisoned").version
    }

    /// Apply a DDL change to the catalog and propagate it to all shards.
    ///
    /// The catalog commit is synchronous; per-shard propagation is
    /// eventually consistent. Shards that stay unreachable through the
    /// retry budget are marked stale and reported as deferred.
    pub fn apply_ddl(&self, change: DdlChange) -> SyncResult<DdlReport> {
        let version = {
            let mut catalog = self.catalog.lock().expect("catalog lock poisoned");
            catalog.apply_ddl(&change)?
        };
        self.change_log
            .lock()
            .expect("change log lock poisoned")
            .push((version, change.clone()));
        Logger::info(
            Event::DdlBegin.as_str(),
            &[
                ("change", &change.to_string()),
                ("version", &version.to_string()),
            ],
        );

        let mut applied = Vec::new();
        let mut deferred = Vec::new();
        for shard in &self.registry.snapshot().shards {
            match self.propagate(shard, &change) {
                Ok(()) => {
                    self.registry.set_applied_version(&shard.id, version)?;
                    Logger::info(
                        Event::DdlApplied.as_str(),
                        &[
                            ("shard", shard.id.as_str()),
                            ("version", &version.to_string()),
                        ],
                    );
                    applied.push(shard.id.clone());
                }
                Err(SyncError::Engine(err)) if err.is_connectivity() => {
                    self.registry.mark_stale(&shard.id)?;
                    Logger::warn(
                        Event::DdlDeferred.as_str(),
                        &[("shard", shard.id.as_str()), ("error", &err.to_string())],
                    );
                    deferred.push(shard.id.clone());
                }
                Err(other) => return Err(other),
            }
        }
        Ok(DdlReport {
            version,
            applied,
            deferred,
        })
    }

    /// Replay every change a stale shard missed, in version order.
    ///
    /// On success the shard is marked healthy at the catalog version and
    /// becomes writable again.
    pub fn catch_up(&self, id: &ShardId) -> SyncResult<u64> {
        let shard = self.registry.get(id)?;
        let missed: Vec<(u64, DdlChange)> = self
            .change_log
            .lock()
            .expect("change log lock poisoned")
            .iter()
            .filter(|(v, _)| *v > shard.applied_version)
            .cloned()
            .collect();
        for (_, change) in &missed {
            self.propagate(&shard, change)?;
        }
        let current = self.catalog_version();
        self.registry.mark_healthy(id, current)?;
        Ok(current)
    }

    /// Fail fast if `shard` lags the catalog version.
    pub fn check_drift(&self, shard: &Shard) -> SyncResult<()> {
        let current = self.catalog_version();
        if shard.applied_version < current {
            return Err(SyncError::SchemaDrift {
                shard: shard.id.clone(),
                applied: shard.applied_version,
                current,
            });
        }
        Ok(())
    }

    /// Apply one change at one shard's physical location, with retries.
    ///
    /// Application is idempotent: a column that already exists (or is
    /// already gone) counts as applied, so replaying a change that
    /// partially landed before a crash converges.
    fn propagate(&self, shard: &Shard, change: &DdlChange) -> SyncResult<()> {
        let engine = self.engines.get(&shard.id)?;
        let table = shard.location.table();
        let result = self.retry.run(|| apply_at(engine.as_ref(), table, change));
        match result {
            Ok(()) => Ok(()),
            Err(EngineError::DuplicateColumn { .. })
                if matches!(change, DdlChange::AddColumn { .. }) =>
            {
                Ok(())
            }
            Err(EngineError::UnknownColumn { .. })
                if matches!(change, DdlChange::DropColumn { .. }) =>
            {
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn apply_at(
    engine: &dyn ShardEngine,
    table: &str,
    change: &DdlChange,
) -> Result<(), EngineError> {
    match change {
        DdlChange::AddColumn { column } => engine.add_column(table, column),
        DdlChange::DropColumn { name } => engine.drop_column(table, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryEngine, RemoteEndpoint, RemoteEngine};
    use crate::registry::{KeyRange, Shard, ShardLocation};
    use crate::schema::{ColumnDef, ColumnType};

    struct Fixture {
        registry: Arc<ShardRegistry>,
        engines: Arc<EngineSet>,
        remote: Arc<RemoteEngine>,
        sync: SchemaSynchronizer,
    }

    /// Two shards: local "a" on [min,'M'), remote "b" on ['M',max).
    fn fixture() -> Fixture {
        let table = LogicalTable::new(
            "events",
            "id",
            vec![ColumnDef::string("id"), ColumnDef::string("title")],
        );
        let registry = Arc::new(ShardRegistry::new());
        registry
            .attach(Shard::new(
                "a",
                KeyRange::up_to("M"),
                ShardLocation::local("events_a"),
                1,
            ))
            .unwrap();
        registry
            .attach(Shard::new(
                "b",
                KeyRange::from("M"),
                ShardLocation::remote("10.0.0.2", 5433, "events_b"),
                1,
            ))
            .unwrap();

        let engines = Arc::new(EngineSet::new());
        let local = engines.insert_local(ShardId::new("a"));
        local.create_table("events_a", &table.columns).unwrap();

        let backing = Arc::new(MemoryEngine::new());
        backing.create_table("events_b", &table.columns).unwrap();
        let remote = Arc::new(RemoteEngine::new(
            RemoteEndpoint::new("10.0.0.2", 5433),
            backing,
        ));
        engines.insert(ShardId::new("b"), remote.clone());

        let sync = SchemaSynchronizer::new(
            table,
            registry.clone(),
            engines.clone(),
            RetryPolicy::no_retries(),
        )
        .unwrap();
        Fixture {
            registry,
            engines,
            remote,
            sync,
        }
    }

    #[test]
    fn test_ddl_reaches_all_shards() {
        let f = fixture();
        let report = f
            .sync
            .apply_ddl(DdlChange::add_nullable("difficulty", ColumnType::Int))
            .unwrap();
        assert_eq!(report.version, 2);
        assert_eq!(report.applied.len(), 2);
        assert!(report.deferred.is_empty());

        for id in ["a", "b"] {
            let shard = f.registry.get(&ShardId::new(id)).unwrap();
            assert_eq!(shard.applied_version, 2);
            let engine = f.engines.get(&shard.id).unwrap();
            let cols = engine.columns(shard.location.table()).unwrap();
            assert!(cols.iter().any(|c| c.name == "difficulty"));
        }
    }

    #[test]
    fn test_unreachable_shard_marked_stale() {
        let f = fixture();
        f.remote.set_reachable(false);
        let report = f
            .sync
            .apply_ddl(DdlChange::add_nullable("difficulty", ColumnType::Int))
            .unwrap();
        assert_eq!(report.applied, vec![ShardId::new("a")]);
        assert_eq!(report.deferred, vec![ShardId::new("b")]);

        let b = f.registry.get(&ShardId::new("b")).unwrap();
        assert!(b.is_stale());
        assert_eq!(b.applied_version, 1);
        assert!(f.sync.check_drift(&b).is_err());
    }

    #[test]
    fn test_catch_up_replays_missed_changes() {
        let f = fixture();
        f.remote.set_reachable(false);
        f.sync
            .apply_ddl(DdlChange::add_nullable("difficulty", ColumnType::Int))
            .unwrap();
        f.sync
            .apply_ddl(DdlChange::add_nullable("tags", ColumnType::String))
            .unwrap();

        f.remote.set_reachable(true);
        let version = f.sync.catch_up(&ShardId::new("b")).unwrap();
        assert_eq!(version, 3);

        let b = f.registry.get(&ShardId::new("b")).unwrap();
        assert!(!b.is_stale());
        assert_eq!(b.applied_version, 3);
        let cols = f
            .engines
            .get(&b.id)
            .unwrap()
            .columns("events_b")
            .unwrap();
        assert!(cols.iter().any(|c| c.name == "difficulty"));
        assert!(cols.iter().any(|c| c.name == "tags"));
        assert!(f.sync.check_drift(&b).is_ok());
    }

    #[test]
    fn test_catalog_rejection_propagates_nothing() {
        let f = fixture();
        let err = f
            .sync
            .apply_ddl(DdlChange::add_nullable("title", ColumnType::String))
            .unwrap_err();
        assert_eq!(err.code(), "KSPAN_DUPLICATE_COLUMN");
        assert_eq!(f.sync.catalog_version(), 1);
        let cols = f
            .engines
            .get(&ShardId::new("a"))
            .unwrap()
            .columns("events_a")
            .unwrap();
        assert_eq!(cols.len(), 2);
    }

    #[test]
    fn test_propagation_is_idempotent() {
        let f = fixture();
        // Column already present at the engine (e.g. replay after crash)
        f.engines
            .get(&ShardId::new("a"))
            .unwrap()
            .add_column(
                "events_a",
                &ColumnDef::nullable("difficulty", ColumnType::Int),
            )
            .unwrap();
        let report = f
            .sync
            .apply_ddl(DdlChange::add_nullable("difficulty", ColumnType::Int))
            .unwrap();
        assert_eq!(report.applied.len(), 2);
    }
}
