//! Durable migration checkpoints
//!
//! One JSON file per job, written with a temp-file-and-rename so a crash
//! mid-write leaves the previous checkpoint intact. The checkpoint holds
//! the whole job descriptor plus chunk progress, so a restarted process
//! can rebuild and resume the job from the file alone.

use super::errors::{MigrateError, MigrateResult};
use super::job::MigrationJob;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Durable progress record for one migration job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCheckpoint {
    /// The job this checkpoint belongs to
    pub job: MigrationJob,
    /// Key of the last row copied to the destination
    pub cursor: Option<String>,
    /// Rows committed to the destination so far
    pub rows_moved: u64,
    /// Running XOR checksum of committed rows
    pub checksum_accum: u32,
    /// Keys copied to the destination but not yet deleted at the source.
    /// Non-empty means the last chunk's delete did not complete; resume
    /// replays the delete before scanning further.
    pub pending_delete: Vec<String>,
    /// When the checkpoint was written
    pub updated_at: DateTime<Utc>,
}

impl JobCheckpoint {
    /// A fresh checkpoint for a job that has not moved a chunk yet.
    pub fn initial(job: &MigrationJob) -> Self {
        Self {
            job: job.clone(),
            cursor: None,
            rows_moved: 0,
            checksum_accum: 0,
            pending_delete: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Filesystem store for job checkpoints.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open (and create if needed) the checkpoint directory.
    pub fn open(dir: impl Into<PathBuf>) -> MigrateResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        Ok(Self { dir })
    }

    fn path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.checkpoint.json", id))
    }

    /// Persist a checkpoint atomically.
    pub fn save(&self, checkpoint: &JobCheckpoint) -> MigrateResult<()> {
        let path = self.path(checkpoint.job.id);
        let tmp = path.with_extension("tmp");
        let body = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| MigrateError::Checkpoint {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        fs::write(&tmp, body).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;
        Ok(())
    }

    /// Load the checkpoint for a job, if one exists.
    pub fn load(&self, id: Uuid) -> MigrateResult<Option<JobCheckpoint>> {
        let path = self.path(id);
        if !path.exists() {
            return Ok(None);
        }
        let body = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        let checkpoint =
            serde_json::from_str(&body).map_err(|e| MigrateError::Checkpoint {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Some(checkpoint))
    }

    /// Load every checkpoint in the directory (crash recovery).
    pub fn load_all(&self) -> MigrateResult<Vec<JobCheckpoint>> {
        let mut checkpoints = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_error(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let body = fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
            let checkpoint =
                serde_json::from_str(&body).map_err(|e| MigrateError::Checkpoint {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            checkpoints.push(checkpoint);
        }
        Ok(checkpoints)
    }

    /// Delete a job's checkpoint after commit or rollback.
    pub fn remove(&self, id: Uuid) -> MigrateResult<()> {
        let path = self.path(id);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| io_error(&path, e))?;
        }
        Ok(())
    }
}

fn io_error(path: &Path, e: std::io::Error) -> MigrateError {
    MigrateError::Checkpoint {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}
