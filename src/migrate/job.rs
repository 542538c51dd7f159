//! Migration job state machine
//!
//! Transitions consume the current state and return the next one, so an
//! illegal transition is unrepresentable at the call site: there is no
//! way to keep using a state after it has moved on.
//!
//! ```text
//! pending -> moving -> verifying -> committed
//!     \         \          \
//!      +---------+----------+-----> aborted
//! ```

use super::errors::{MigrateError, MigrateResult};
use crate::registry::{KeyRange, Shard, ShardId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of a migration job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted, not yet moving rows
    Pending,
    /// Copying chunks from source to destination
    Moving,
    /// All chunks moved, reconciling counts and checksums
    Verifying,
    /// Cutover committed; the destination owns the range
    Committed,
    /// Rolled back; the source still owns the range
    Aborted,
}

impl JobState {
    /// pending -> moving
    pub fn begin_moving(self) -> MigrateResult<Self> {
        self.step(Self::Pending, Self::Moving)
    }

    /// moving -> verifying
    pub fn begin_verifying(self) -> MigrateResult<Self> {
        self.step(Self::Moving, Self::Verifying)
    }

    /// verifying -> committed
    pub fn commit(self) -> MigrateResult<Self> {
        self.step(Self::Verifying, Self::Committed)
    }

    /// Any non-terminal state -> aborted
    pub fn abort(self) -> MigrateResult<Self> {
        if self.is_terminal() {
            return Err(MigrateError::ForbiddenTransition {
                from: self,
                to: Self::Aborted,
            });
        }
        Ok(Self::Aborted)
    }

    /// Whether the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }

    fn step(self, expected: Self, next: Self) -> MigrateResult<Self> {
        if self == expected {
            Ok(next)
        } else {
            Err(MigrateError::ForbiddenTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Moving => "moving",
            Self::Verifying => "verifying",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

/// One migration job: move `range` out of `source` into `destination`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationJob {
    /// Job identifier
    pub id: Uuid,
    /// Shard the range moves out of
    pub source: ShardId,
    /// The sub-range being moved
    pub range: KeyRange,
    /// Shard descriptor that will own the range after cutover
    pub destination: Shard,
    /// Lifecycle state
    pub state: JobState,
    /// Rows committed to the destination so far
    pub rows_moved: u64,
    /// Running XOR checksum of moved rows
    pub checksum: u32,
    /// Whether submit created the destination table; a table this job
    /// created is dropped wholesale on abort
    #[serde(default)]
    pub created_dest_table: bool,
    /// Failure description when aborted
    pub error: Option<String>,
    /// When the job was accepted
    pub created_at: DateTime<Utc>,
    /// Last state or progress change
    pub updated_at: DateTime<Utc>,
}

impl MigrationJob {
    /// Create a pending job.
    pub fn new(source: ShardId, range: KeyRange, destination: Shard) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source,
            range,
            destination,
            state: JobState::Pending,
            rows_moved: 0,
            checksum: 0,
            created_dest_table: false,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a state transition and stamp the update time.
    pub fn transition<F>(&mut self, f: F) -> MigrateResult<()>
    where
        F: FnOnce(JobState) -> MigrateResult<JobState>,
    {
        self.state = f(self.state)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// The externally visible status snapshot.
    pub fn status(&self) -> MigrationStatus {
        MigrationStatus {
            id: self.id,
            source: self.source.clone(),
            range: self.range.clone(),
            destination: self.destination.id.clone(),
            state: self.state,
            rows_moved: self.rows_moved,
            error: self.error.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Serializable job status for the API and CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationStatus {
    /// Job identifier
    pub id: Uuid,
    /// Source shard
    pub source: ShardId,
    /// Range being moved
    pub range: KeyRange,
    /// Destination shard
    pub destination: ShardId,
    /// Lifecycle state
    pub state: JobState,
    /// Rows committed to the destination so far
    pub rows_moved: u64,
    /// Failure description when aborted
    pub error: Option<String>,
    /// When the job was accepted
    pub created_at: DateTime<Utc>,
    /// Last state or progress change
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ShardLocation;

    #[test]
    fn test_happy_path_transitions() {
        let state = JobState::Pending;
        let state = state.begin_moving().unwrap();
        let state = state.begin_verifying().unwrap();
        let state = state.commit().unwrap();
        assert_eq!(state, JobState::Committed);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_abort_from_any_live_state() {
        assert_eq!(JobState::Pending.abort().unwrap(), JobState::Aborted);
        assert_eq!(JobState::Moving.abort().unwrap(), JobState::Aborted);
        assert_eq!(JobState::Verifying.abort().unwrap(), JobState::Aborted);
    }

    #[test]
    fn test_terminal_states_are_final() {
        assert!(JobState::Committed.abort().is_err());
        assert!(JobState::Aborted.begin_moving().is_err());
        let err = JobState::Pending.commit().unwrap_err();
        assert_eq!(err.code(), "KSPAN_FORBIDDEN_TRANSITION");
    }

    #[test]
    fn test_skipping_states_rejected() {
        assert!(JobState::Pending.begin_verifying().is_err());
        assert!(JobState::Moving.commit().is_err());
    }

    #[test]
    fn test_job_transition_stamps_update_time() {
        let mut job = MigrationJob::new(
            ShardId::new("b"),
            KeyRange::new("B", "C"),
            Shard::new(
                "d",
                KeyRange::new("B", "C"),
                ShardLocation::remote("10.0.0.2", 5433, "t_d"),
                1,
            ),
        );
        let before = job.updated_at;
        job.transition(JobState::begin_moving).unwrap();
        assert_eq!(job.state, JobState::Moving);
        assert!(job.updated_at >= before);
    }
}
