//! Migration orchestrator
//!
//! Moves a key sub-range from one shard to another in chunks, with a
//! durable checkpoint after every chunk. The copy protocol is
//! idempotent: rows are upserted at the destination before they are
//! deleted at the source, and the keys awaiting deletion are recorded in
//! the checkpoint, so replaying the last chunk after a crash cannot
//! duplicate or lose a row. Routing keeps pointing at the source until
//! the final registry cutover, which is a single snapshot swap.

use super::checkpoint::{CheckpointStore, JobCheckpoint};
use super::errors::{MigrateError, MigrateResult};
use super::job::{JobState, MigrationJob, MigrationStatus};
use crate::engine::{fold_checksum, EngineError, EngineSet, ShardEngine};
use crate::observability::{Event, Logger};
use crate::registry::{KeyRange, Shard, ShardHealth, ShardId, ShardRegistry};
use crate::schema::ColumnDef;
use crate::sync::{RetryPolicy, SchemaSynchronizer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

struct JobHandle {
    job: Mutex<MigrationJob>,
    cancel: AtomicBool,
}

impl JobHandle {
    fn new(job: MigrationJob) -> Self {
        Self {
            job: Mutex::new(job),
            cancel: AtomicBool::new(false),
        }
    }

    fn status(&self) -> MigrationStatus {
        self.job.lock().expect("job lock poisoned").status()
    }
}

/// Runs chunked, resumable range migrations.
pub struct MigrationOrchestrator {
    registry: Arc<ShardRegistry>,
    engines: Arc<EngineSet>,
    catalog: Arc<SchemaSynchronizer>,
    checkpoints: CheckpointStore,
    jobs: Mutex<HashMap<Uuid, Arc<JobHandle>>>,
    chunk_size: usize,
    retry: RetryPolicy,
}

impl MigrationOrchestrator {
    /// Create an orchestrator persisting checkpoints under `checkpoint_dir`.
    pub fn new(
        registry: Arc<ShardRegistry>,
        engines: Arc<EngineSet>,
        catalog: Arc<SchemaSynchronizer>,
        checkpoint_dir: impl Into<std::path::PathBuf>,
        chunk_size: usize,
        retry: RetryPolicy,
    ) -> MigrateResult<Self> {
        Ok(Self {
            registry,
            engines,
            catalog,
            checkpoints: CheckpointStore::open(checkpoint_dir)?,
            jobs: Mutex::new(HashMap::new()),
            chunk_size: chunk_size.max(1),
            retry,
        })
    }

    /// Accept a migration of `range` out of `source` into `destination`.
    ///
    /// Validates the range against the source shard, rejects overlap with
    /// any running job, and pre-flights the destination table: it is
    /// created with `columns` when absent, and rejected when it exists
    /// with a different column set.
    pub fn submit(
        &self,
        source: &ShardId,
        range: KeyRange,
        destination: Shard,
        columns: &[ColumnDef],
    ) -> MigrateResult<Uuid> {
        let source_shard = self.registry.get(source)?;
        if !source_shard.range.covers(&range) {
            return Err(crate::registry::RegistryError::SubRangeOutOfBounds {
                shard: source_shard.id,
                range: source_shard.range,
                sub: range,
            }
            .into());
        }
        {
            let jobs = self.jobs.lock().expect("jobs lock poisoned");
            for handle in jobs.values() {
                let job = handle.job.lock().expect("job lock poisoned");
                if !job.state.is_terminal() && job.range.overlaps(&range) {
                    return Err(MigrateError::OverlappingMigration {
                        range,
                        job: job.id,
                        active: job.range.clone(),
                    });
                }
            }
        }

        let dest_engine = self.engines.get(&destination.id)?;
        let dest_table = destination.location.table().to_string();
        let created_table = if dest_engine.has_table(&dest_table)? {
            check_columns(&dest_table, &dest_engine.columns(&dest_table)?, columns)?;
            false
        } else {
            dest_engine.create_table(&dest_table, columns)?;
            true
        };

        let mut job = MigrationJob::new(source.clone(), range, destination);
        job.created_dest_table = created_table;
        let id = job.id;
        self.checkpoints.save(&JobCheckpoint::initial(&job))?;
        Logger::info(
            Event::MigrationBegin.as_str(),
            &[
                ("job", &id.to_string()),
                ("source", source.as_str()),
                ("range", &job.range.to_string()),
                ("destination", job.destination.id.as_str()),
            ],
        );
        self.jobs
            .lock()
            .expect("jobs lock poisoned")
            .insert(id, Arc::new(JobHandle::new(job)));
        Ok(id)
    }

    /// Drive a job to completion (or rollback). Blocks until terminal.
    pub fn run(&self, id: Uuid) -> MigrateResult<MigrationStatus> {
        let handle = self.handle(id)?;
        match self.drive(&handle) {
            Ok(()) => Ok(handle.status()),
            Err(err) => {
                self.rollback(&handle, &err);
                Err(err)
            }
        }
    }

    /// Request cancellation; honored at the next chunk boundary.
    pub fn cancel(&self, id: Uuid) -> MigrateResult<MigrationStatus> {
        let handle = self.handle(id)?;
        handle.cancel.store(true, Ordering::SeqCst);
        Ok(handle.status())
    }

    /// Status of one job.
    pub fn status(&self, id: Uuid) -> MigrateResult<MigrationStatus> {
        Ok(self.handle(id)?.status())
    }

    /// Status of every known job.
    pub fn statuses(&self) -> Vec<MigrationStatus> {
        self.jobs
            .lock()
            .expect("jobs lock poisoned")
            .values()
            .map(|h| h.status())
            .collect()
    }

    /// Rebuild jobs from checkpoints left behind by a previous process.
    ///
    /// Recovered jobs come back pending with their progress counters
    /// intact; calling `run` resumes the copy where it stopped.
    pub fn recover(&self) -> MigrateResult<Vec<Uuid>> {
        let mut recovered = Vec::new();
        for checkpoint in self.checkpoints.load_all()? {
            let mut job = checkpoint.job.clone();
            if job.state.is_terminal() {
                self.checkpoints.remove(job.id)?;
                continue;
            }
            job.state = JobState::Pending;
            job.rows_moved = checkpoint.rows_moved;
            job.checksum = checkpoint.checksum_accum;
            let id = job.id;
            self.jobs
                .lock()
                .expect("jobs lock poisoned")
                .insert(id, Arc::new(JobHandle::new(job)));
            recovered.push(id);
        }
        Ok(recovered)
    }

    fn handle(&self, id: Uuid) -> MigrateResult<Arc<JobHandle>> {
        self.jobs
            .lock()
            .expect("jobs lock poisoned")
            .get(&id)
            .cloned()
            .ok_or(MigrateError::UnknownJob(id))
    }

    fn drive(&self, handle: &JobHandle) -> MigrateResult<()> {
        let (id, source_id, range, destination) = {
            let mut job = handle.job.lock().expect("job lock poisoned");
            job.transition(JobState::begin_moving)?;
            (
                job.id,
                job.source.clone(),
                job.range.clone(),
                job.destination.clone(),
            )
        };
        let source_shard = self.registry.get(&source_id)?;
        let source = self.engines.get(&source_id)?;
        let dest = self.engines.get(&destination.id)?;
        let src_table = source_shard.location.table().to_string();
        let dest_table = destination.location.table().to_string();

        let mut checkpoint = match self.checkpoints.load(id)? {
            Some(c) => c,
            None => JobCheckpoint::initial(&handle.job.lock().expect("job lock poisoned")),
        };

        // A non-empty pending_delete means the previous run crashed after
        // committing a chunk at the destination. Finish its delete first.
        if !checkpoint.pending_delete.is_empty() {
            let keys = checkpoint.pending_delete.clone();
            self.retry
                .run(|| source.delete_keys(&src_table, &keys))
                .map_err(|e| chunk_failure(id, &checkpoint.cursor, e))?;
            checkpoint.pending_delete.clear();
            checkpoint.updated_at = chrono::Utc::now();
            self.checkpoints.save(&checkpoint)?;
        }

        loop {
            if handle.cancel.load(Ordering::SeqCst) {
                return Err(MigrateError::Cancelled(id));
            }
            // Moved rows are deleted from the source, so scanning from the
            // range start always yields only rows not yet moved.
            let rows = self
                .retry
                .run(|| source.scan(&src_table, &range, Some(self.chunk_size)))
                .map_err(|e| chunk_failure(id, &checkpoint.cursor, e))?;
            if rows.is_empty() {
                break;
            }

            self.retry
                .run(|| dest.upsert(&dest_table, &rows))
                .map_err(|e| chunk_failure(id, &checkpoint.cursor, e))?;

            let keys: Vec<String> = rows.iter().map(|r| r.key.clone()).collect();
            checkpoint.cursor = keys.last().cloned();
            checkpoint.rows_moved += rows.len() as u64;
            for row in &rows {
                checkpoint.checksum_accum = fold_checksum(checkpoint.checksum_accum, row);
            }
            checkpoint.pending_delete = keys.clone();
            checkpoint.updated_at = chrono::Utc::now();
            self.checkpoints.save(&checkpoint)?;

            self.retry
                .run(|| source.delete_keys(&src_table, &keys))
                .map_err(|e| chunk_failure(id, &checkpoint.cursor, e))?;
            checkpoint.pending_delete.clear();
            checkpoint.updated_at = chrono::Utc::now();
            self.checkpoints.save(&checkpoint)?;

            {
                let mut job = handle.job.lock().expect("job lock poisoned");
                job.rows_moved = checkpoint.rows_moved;
                job.checksum = checkpoint.checksum_accum;
                job.updated_at = checkpoint.updated_at;
            }
            Logger::info(
                Event::ChunkMoved.as_str(),
                &[
                    ("job", &id.to_string()),
                    ("rows_moved", &checkpoint.rows_moved.to_string()),
                    ("cursor", checkpoint.cursor.as_deref().unwrap_or("")),
                ],
            );
        }

        handle
            .job
            .lock()
            .expect("job lock poisoned")
            .transition(JobState::begin_verifying)?;
        Logger::info(
            Event::MigrationVerifyBegin.as_str(),
            &[
                ("job", &id.to_string()),
                ("rows_moved", &checkpoint.rows_moved.to_string()),
            ],
        );

        let remaining = self
            .retry
            .run(|| source.row_count(&src_table, &range))
            .map_err(MigrateError::Engine)?;
        let dest_rows = self
            .retry
            .run(|| dest.row_count(&dest_table, &range))
            .map_err(MigrateError::Engine)?;
        let dest_checksum = self
            .retry
            .run(|| dest.checksum(&dest_table, &range))
            .map_err(MigrateError::Engine)?;
        if remaining != 0
            || dest_rows != checkpoint.rows_moved
            || dest_checksum != checkpoint.checksum_accum
        {
            return Err(MigrateError::ReconciliationMismatch {
                job: id,
                expected_rows: checkpoint.rows_moved,
                actual_rows: dest_rows + remaining,
                expected_checksum: checkpoint.checksum_accum,
                actual_checksum: dest_checksum,
            });
        }

        // DDL that landed after submit never reached the destination:
        // it is not in the registry until this cutover. Attach it at the
        // catalog version only when its columns actually match, stale
        // otherwise so the drift gate holds until catch_up.
        let catalog = self.catalog.catalog();
        let dest_columns = self
            .retry
            .run(|| dest.columns(&dest_table))
            .map_err(MigrateError::Engine)?;
        let mut destination = destination;
        if check_columns(&dest_table, &dest_columns, &catalog.columns).is_ok() {
            destination.applied_version = catalog.version;
        } else {
            destination.health = ShardHealth::Stale {
                since: chrono::Utc::now(),
            };
            Logger::warn(
                Event::ShardStale.as_str(),
                &[
                    ("shard", destination.id.as_str()),
                    ("applied_version", &destination.applied_version.to_string()),
                    ("catalog_version", &catalog.version.to_string()),
                ],
            );
        }

        self.registry.cutover(&range, destination.clone())?;
        // An interior cutover leaves an upper remainder under a derived id
        // backed by the source's physical table; alias its engine handle.
        for shard in &self.registry.snapshot().shards {
            if shard.location == source_shard.location && self.engines.get(&shard.id).is_err() {
                self.engines.insert(shard.id.clone(), source.clone());
            }
        }
        self.registry
            .set_rows_estimate(&destination.id, checkpoint.rows_moved)?;
        self.checkpoints.remove(id)?;

        let mut job = handle.job.lock().expect("job lock poisoned");
        job.transition(JobState::commit)?;
        Logger::info(
            Event::MigrationCommitted.as_str(),
            &[
                ("job", &id.to_string()),
                ("rows_moved", &job.rows_moved.to_string()),
                ("registry_version", &self.registry.version().to_string()),
            ],
        );
        Ok(())
    }

    /// Put already-moved rows back on the source, discard the partial
    /// destination data, and mark the job aborted.
    ///
    /// Upsert-by-key makes the copy-back idempotent too. If the rollback
    /// itself fails the checkpoint is kept for operator recovery.
    fn rollback(&self, handle: &JobHandle, cause: &MigrateError) {
        let (id, source_id, range, destination, created_table) = {
            let job = handle.job.lock().expect("job lock poisoned");
            (
                job.id,
                job.source.clone(),
                job.range.clone(),
                job.destination.clone(),
                job.created_dest_table,
            )
        };
        let restored = self.discard_destination(&source_id, &range, &destination, created_table);
        let mut job = handle.job.lock().expect("job lock poisoned");
        if job.transition(JobState::abort).is_ok() {
            job.error = Some(match &restored {
                Ok(()) => cause.to_string(),
                Err(rollback_err) => {
                    format!("{} (rollback failed: {})", cause, rollback_err)
                }
            });
        }
        if restored.is_ok() {
            // Best effort; an aborted job with a stray checkpoint is
            // re-aborted cleanly on recovery.
            let _ = self.checkpoints.remove(id);
        }
        Logger::error(
            Event::MigrationAborted.as_str(),
            &[
                ("job", &id.to_string()),
                ("code", cause.code()),
                ("error", &cause.to_string()),
            ],
        );
    }

    /// Copy moved rows back to the source, then delete them at the
    /// destination. A destination table this job created is dropped
    /// wholesale instead, which also discards any stray rows the
    /// range-scoped delete would miss.
    fn discard_destination(
        &self,
        source_id: &ShardId,
        range: &KeyRange,
        destination: &Shard,
        created_table: bool,
    ) -> MigrateResult<()> {
        let source_shard = self.registry.get(source_id)?;
        let source = self.engines.get(source_id)?;
        let dest = self.engines.get(&destination.id)?;
        let src_table = source_shard.location.table().to_string();
        let dest_table = destination.location.table().to_string();
        let rows = self
            .retry
            .run(|| dest.scan(&dest_table, range, None))
            .map_err(MigrateError::Engine)?;
        if !rows.is_empty() {
            self.retry
                .run(|| source.upsert(&src_table, &rows))
                .map_err(MigrateError::Engine)?;
            let keys: Vec<String> = rows.iter().map(|r| r.key.clone()).collect();
            self.retry
                .run(|| dest.delete_keys(&dest_table, &keys))
                .map_err(MigrateError::Engine)?;
        }
        if created_table {
            self.retry
                .run(|| dest.drop_table(&dest_table))
                .map_err(MigrateError::Engine)?;
        }
        Ok(())
    }
}

fn chunk_failure(job: Uuid, cursor: &Option<String>, err: EngineError) -> MigrateError {
    if err.is_connectivity() {
        MigrateError::ChunkCommitFailure {
            job,
            cursor: cursor.clone(),
            reason: err.to_string(),
        }
    } else {
        MigrateError::Engine(err)
    }
}

fn check_columns(
    table: &str,
    actual: &[ColumnDef],
    expected: &[ColumnDef],
) -> MigrateResult<()> {
    let mut actual_sorted: Vec<&ColumnDef> = actual.iter().collect();
    let mut expected_sorted: Vec<&ColumnDef> = expected.iter().collect();
    actual_sorted.sort_by(|a, b| a.name.cmp(&b.name));
    expected_sorted.sort_by(|a, b| a.name.cmp(&b.name));
    if actual_sorted.len() != expected_sorted.len() {
        return Err(MigrateError::DestinationSchemaMismatch {
            table: table.to_string(),
            reason: format!(
                "expected {} columns, found {}",
                expected_sorted.len(),
                actual_sorted.len()
            ),
        });
    }
    for (a, e) in actual_sorted.iter().zip(&expected_sorted) {
        if a.name != e.name || a.column_type != e.column_type {
            return Err(MigrateError::DestinationSchemaMismatch {
                table: table.to_string(),
                reason: format!(
                    "column '{}' {} does not match expected '{}' {}",
                    a.name,
                    a.column_type.type_name(),
                    e.name,
                    e.column_type.type_name()
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryEngine, RemoteEndpoint, RemoteEngine, Row};
    use crate::registry::ShardLocation;
    use crate::schema::{ColumnDef, ColumnType, DdlChange, LogicalTable};
    use serde_json::json;

    struct Fixture {
        registry: Arc<ShardRegistry>,
        engines: Arc<EngineSet>,
        remote: Arc<RemoteEngine>,
        sync: Arc<SchemaSynchronizer>,
        orchestrator: MigrationOrchestrator,
        _dir: tempfile::TempDir,
    }

    fn columns() -> Vec<ColumnDef> {
        vec![ColumnDef::string("id"), ColumnDef::string("title")]
    }

    /// One local shard "b" over ['B','D') holding six rows, plus a remote
    /// destination "d" with an empty backing engine.
    fn fixture() -> Fixture {
        let registry = Arc::new(ShardRegistry::new());
        registry
            .attach(Shard::new(
                "b",
                KeyRange::full(),
                ShardLocation::local("t_b"),
                1,
            ))
            .unwrap();

        let engines = Arc::new(EngineSet::new());
        let local = engines.insert_local(ShardId::new("b"));
        local.create_table("t_b", &columns()).unwrap();
        let rows: Vec<Row> = ["B1", "B2", "B3", "B4", "B5", "B6"]
            .iter()
            .map(|k| Row::from_pairs(*k, &[("id", json!(k)), ("title", json!("t"))]))
            .collect();
        local.upsert("t_b", &rows).unwrap();

        let backing = Arc::new(MemoryEngine::new());
        let remote = Arc::new(RemoteEngine::new(
            RemoteEndpoint::new("10.0.0.2", 5433),
            backing,
        ));
        engines.insert(ShardId::new("d"), remote.clone());

        let sync = Arc::new(
            SchemaSynchronizer::new(
                LogicalTable::new("events", "id", columns()),
                registry.clone(),
                engines.clone(),
                RetryPolicy::no_retries(),
            )
            .unwrap(),
        );

        let dir = tempfile::tempdir().unwrap();
        let orchestrator = MigrationOrchestrator::new(
            registry.clone(),
            engines.clone(),
            sync.clone(),
            dir.path(),
            2,
            RetryPolicy::no_retries(),
        )
        .unwrap();
        Fixture {
            registry,
            engines,
            remote,
            sync,
            orchestrator,
            _dir: dir,
        }
    }

    fn dest_shard() -> Shard {
        Shard::new(
            "d",
            KeyRange::new("B2", "B5"),
            ShardLocation::remote("10.0.0.2", 5433, "t_d"),
            1,
        )
    }

    #[test]
    fn test_migration_commits_and_cuts_over() {
        let f = fixture();
        let id = f
            .orchestrator
            .submit(
                &ShardId::new("b"),
                KeyRange::new("B2", "B5"),
                dest_shard(),
                &columns(),
            )
            .unwrap();
        let status = f.orchestrator.run(id).unwrap();
        assert_eq!(status.state, JobState::Committed);
        assert_eq!(status.rows_moved, 3);

        // Routing now resolves the moved range to the destination
        assert_eq!(f.registry.lookup("B3").unwrap().id.as_str(), "d");
        assert_eq!(f.registry.lookup("B1").unwrap().id.as_str(), "b");
        assert_eq!(f.registry.lookup("B6").unwrap().id.as_str(), "b-hi");

        // Rows moved exactly once
        let source = f.engines.get(&ShardId::new("b")).unwrap();
        let dest = f.engines.get(&ShardId::new("d")).unwrap();
        assert_eq!(source.row_count("t_b", &KeyRange::full()).unwrap(), 3);
        assert_eq!(dest.row_count("t_d", &KeyRange::full()).unwrap(), 3);
    }

    #[test]
    fn test_overlapping_submit_rejected() {
        let f = fixture();
        f.orchestrator
            .submit(
                &ShardId::new("b"),
                KeyRange::new("B2", "B5"),
                dest_shard(),
                &columns(),
            )
            .unwrap();
        let err = f
            .orchestrator
            .submit(
                &ShardId::new("b"),
                KeyRange::new("B4", "B6"),
                Shard::new(
                    "d",
                    KeyRange::new("B4", "B6"),
                    ShardLocation::remote("10.0.0.2", 5433, "t_d2"),
                    1,
                ),
                &columns(),
            )
            .unwrap_err();
        assert_eq!(err.code(), "KSPAN_OVERLAPPING_MIGRATION");
    }

    #[test]
    fn test_destination_schema_mismatch_rejected() {
        let f = fixture();
        // Destination table pre-exists with a different column set
        let dest = f.engines.get(&ShardId::new("d")).unwrap();
        dest.create_table(
            "t_d",
            &[ColumnDef::string("id"), ColumnDef::int("points")],
        )
        .unwrap();
        let err = f
            .orchestrator
            .submit(
                &ShardId::new("b"),
                KeyRange::new("B2", "B5"),
                dest_shard(),
                &columns(),
            )
            .unwrap_err();
        assert_eq!(err.code(), "KSPAN_DEST_SCHEMA_MISMATCH");
    }

    #[test]
    fn test_out_of_bounds_range_rejected() {
        let f = fixture();
        f.registry
            .cutover(
                &KeyRange::up_to("B4"),
                Shard::new("a", KeyRange::up_to("B4"), ShardLocation::local("t_a"), 1),
            )
            .unwrap();
        let err = f
            .orchestrator
            .submit(
                &ShardId::new("a"),
                KeyRange::new("B2", "B5"),
                dest_shard(),
                &columns(),
            )
            .unwrap_err();
        assert_eq!(err.code(), "KSPAN_RANGE_OUT_OF_BOUNDS");
    }

    #[test]
    fn test_chunk_failure_aborts_and_rolls_back() {
        let f = fixture();
        let id = f
            .orchestrator
            .submit(
                &ShardId::new("b"),
                KeyRange::new("B2", "B5"),
                dest_shard(),
                &columns(),
            )
            .unwrap();
        // First destination op after submit is the chunk upsert
        f.remote.fail_next(1);
        let err = f.orchestrator.run(id).unwrap_err();
        assert_eq!(err.code(), "KSPAN_CHUNK_COMMIT_FAILURE");

        let status = f.orchestrator.status(id).unwrap();
        assert_eq!(status.state, JobState::Aborted);
        assert!(status.error.is_some());

        // Source still owns and holds every row
        assert_eq!(f.registry.lookup("B3").unwrap().id.as_str(), "b");
        let source = f.engines.get(&ShardId::new("b")).unwrap();
        assert_eq!(source.row_count("t_b", &KeyRange::full()).unwrap(), 6);

        // The table submit created is gone with its partial data
        let dest = f.engines.get(&ShardId::new("d")).unwrap();
        assert!(!dest.has_table("t_d").unwrap());
    }

    #[test]
    fn test_rollback_keeps_preexisting_destination_table() {
        let f = fixture();
        let dest = f.engines.get(&ShardId::new("d")).unwrap();
        dest.create_table("t_d", &columns()).unwrap();
        let id = f
            .orchestrator
            .submit(
                &ShardId::new("b"),
                KeyRange::new("B2", "B5"),
                dest_shard(),
                &columns(),
            )
            .unwrap();
        f.remote.fail_next(1);
        assert!(f.orchestrator.run(id).is_err());

        // A table the operator owns survives the abort, emptied
        assert!(dest.has_table("t_d").unwrap());
        assert_eq!(dest.row_count("t_d", &KeyRange::full()).unwrap(), 0);
        let source = f.engines.get(&ShardId::new("b")).unwrap();
        assert_eq!(source.row_count("t_b", &KeyRange::full()).unwrap(), 6);
    }

    #[test]
    fn test_cancel_honored_at_chunk_boundary() {
        let f = fixture();
        let id = f
            .orchestrator
            .submit(
                &ShardId::new("b"),
                KeyRange::new("B2", "B5"),
                dest_shard(),
                &columns(),
            )
            .unwrap();
        f.orchestrator.cancel(id).unwrap();
        let err = f.orchestrator.run(id).unwrap_err();
        assert_eq!(err.code(), "KSPAN_MIGRATION_CANCELLED");

        let source = f.engines.get(&ShardId::new("b")).unwrap();
        assert_eq!(source.row_count("t_b", &KeyRange::full()).unwrap(), 6);
        assert_eq!(f.registry.lookup("B3").unwrap().id.as_str(), "b");
    }

    #[test]
    fn test_reconciliation_mismatch_aborts() {
        let f = fixture();
        let id = f
            .orchestrator
            .submit(
                &ShardId::new("b"),
                KeyRange::new("B2", "B5"),
                dest_shard(),
                &columns(),
            )
            .unwrap();
        // A row the orchestrator never moved appears at the destination
        let dest = f.engines.get(&ShardId::new("d")).unwrap();
        dest.upsert(
            "t_d",
            &[Row::from_pairs(
                "B2x",
                &[("id", json!("B2x")), ("title", json!("stray"))],
            )],
        )
        .unwrap();

        let err = f.orchestrator.run(id).unwrap_err();
        assert_eq!(err.code(), "KSPAN_RECONCILIATION_MISMATCH");
        assert_eq!(
            f.orchestrator.status(id).unwrap().state,
            JobState::Aborted
        );
        // No cutover happened, and the partial destination data is gone
        assert_eq!(f.registry.lookup("B3").unwrap().id.as_str(), "b");
        assert!(!dest.has_table("t_d").unwrap());
    }

    #[test]
    fn test_disjoint_jobs_on_one_source_both_commit() {
        let f = fixture();
        f.engines.insert_local(ShardId::new("d2"));
        let job1 = f
            .orchestrator
            .submit(
                &ShardId::new("b"),
                KeyRange::new("B2", "B4"),
                Shard::new(
                    "d",
                    KeyRange::new("B2", "B4"),
                    ShardLocation::remote("10.0.0.2", 5433, "t_d"),
                    1,
                ),
                &columns(),
            )
            .unwrap();
        let job2 = f
            .orchestrator
            .submit(
                &ShardId::new("b"),
                KeyRange::new("B5", "B6"),
                Shard::new(
                    "d2",
                    KeyRange::new("B5", "B6"),
                    ShardLocation::local("t_d2"),
                    1,
                ),
                &columns(),
            )
            .unwrap();

        // job1's interior cutover splits "b" before job2 reaches its own
        // cutover; job2's sub-range now belongs to the derived remainder.
        assert_eq!(f.orchestrator.run(job1).unwrap().state, JobState::Committed);
        assert_eq!(f.orchestrator.run(job2).unwrap().state, JobState::Committed);

        let snap = f.registry.snapshot();
        assert!(snap.validate().is_ok());
        assert_eq!(snap.lookup("B3").unwrap().id.as_str(), "d");
        assert_eq!(snap.lookup("B5").unwrap().id.as_str(), "d2");
        assert_eq!(snap.lookup("B4").unwrap().id.as_str(), "b-hi");
        let source = f.engines.get(&ShardId::new("b")).unwrap();
        assert_eq!(source.row_count("t_b", &KeyRange::full()).unwrap(), 3);
        let d2 = f.engines.get(&ShardId::new("d2")).unwrap();
        assert_eq!(d2.row_count("t_d2", &KeyRange::full()).unwrap(), 1);
    }

    #[test]
    fn test_ddl_during_move_attaches_destination_stale() {
        let f = fixture();
        let id = f
            .orchestrator
            .submit(
                &ShardId::new("b"),
                KeyRange::new("B2", "B5"),
                dest_shard(),
                &columns(),
            )
            .unwrap();
        // The destination is not in the registry yet, so propagation
        // cannot reach it.
        f.sync
            .apply_ddl(DdlChange::add_nullable("difficulty", ColumnType::Int))
            .unwrap();
        let status = f.orchestrator.run(id).unwrap();
        assert_eq!(status.state, JobState::Committed);

        let d = f.registry.get(&ShardId::new("d")).unwrap();
        assert!(d.is_stale());
        assert_eq!(d.applied_version, 1);
        assert_eq!(
            f.registry.get(&ShardId::new("b")).unwrap().applied_version,
            2
        );

        // catch_up replays the missed change and clears the flag
        assert_eq!(f.sync.catch_up(&ShardId::new("d")).unwrap(), 2);
        let d = f.registry.get(&ShardId::new("d")).unwrap();
        assert!(!d.is_stale());
        assert_eq!(d.applied_version, 2);
        let dest = f.engines.get(&ShardId::new("d")).unwrap();
        assert!(dest
            .columns("t_d")
            .unwrap()
            .iter()
            .any(|c| c.name == "difficulty"));
    }

    #[test]
    fn test_unknown_job_rejected() {
        let f = fixture();
        let err = f.orchestrator.status(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.code(), "KSPAN_UNKNOWN_JOB");
    }
}
