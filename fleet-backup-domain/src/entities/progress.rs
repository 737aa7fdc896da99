// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Progress Row (§4.3)
//!
//! One row per site describing the current or most recent backup job.
//! `epoch` is the correctness mechanism: starting a job increments it, and
//! every subsequent write the engine makes for that job must present the
//! same epoch it started with. A write from a stale epoch (a zombie job
//! that is still running after a "reset stuck" call bumped the epoch, or a
//! cancelled worker that hasn't noticed yet) is silently dropped rather than
//! clobbering the row of a freshly started job - see `ProgressRow::apply`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackupError;
use crate::value_objects::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressState {
    Idle,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl ProgressState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProgressState::Completed | ProgressState::Failed | ProgressState::Stopped)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRow {
    pub epoch: u64,
    pub job_id: Option<JobId>,
    pub state: ProgressState,
    pub progress_percent: u8,
    pub stage: Option<String>,
    pub message: Option<String>,
    pub bytes_processed: u64,
    pub bytes_total: u64,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub cancellation_requested: bool,
}

impl Default for ProgressRow {
    fn default() -> Self {
        Self {
            epoch: 0,
            job_id: None,
            state: ProgressState::Idle,
            progress_percent: 0,
            stage: None,
            message: None,
            bytes_processed: 0,
            bytes_total: 0,
            error: None,
            started_at: None,
            updated_at: Utc::now(),
            cancellation_requested: false,
        }
    }
}

/// A single field update the engine wants to apply, always carrying the
/// epoch it believes is current.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub epoch: u64,
    pub state: ProgressState,
    pub progress_percent: u8,
    pub stage: Option<String>,
    pub message: Option<String>,
    pub bytes_processed: u64,
    pub bytes_total: u64,
    pub error: Option<String>,
}

impl ProgressRow {
    /// §4.3: at most one RUNNING row per site; starting while RUNNING is a
    /// conflict. Resets the row atomically on success and returns the new
    /// epoch and job id the caller must use for every subsequent update.
    pub fn start(&mut self, job_id: JobId, bytes_total: u64, now: DateTime<Utc>) -> Result<u64, BackupError> {
        if self.state == ProgressState::Running {
            return Err(BackupError::conflict("a backup is already running for this site"));
        }
        self.epoch += 1;
        self.job_id = Some(job_id);
        self.state = ProgressState::Running;
        self.progress_percent = 0;
        self.stage = None;
        self.message = None;
        self.bytes_processed = 0;
        self.bytes_total = bytes_total;
        self.error = None;
        self.started_at = Some(now);
        self.updated_at = now;
        self.cancellation_requested = false;
        Ok(self.epoch)
    }

    /// Applies an update if and only if it was authored against the current
    /// epoch. Returns `true` if applied, `false` if silently dropped as
    /// stale. Terminal states are sticky - a terminal row only moves again
    /// through `start`.
    pub fn apply(&mut self, update: ProgressUpdate, now: DateTime<Utc>) -> bool {
        if update.epoch != self.epoch {
            return false;
        }
        if self.state.is_terminal() {
            return false;
        }
        self.state = update.state;
        self.progress_percent = update.progress_percent.min(100);
        self.stage = update.stage;
        self.message = update.message;
        self.bytes_processed = update.bytes_processed;
        self.bytes_total = update.bytes_total;
        self.error = update.error;
        self.updated_at = now;
        true
    }

    /// Request cancellation; ignored if the epoch has already moved on or
    /// nothing is running.
    pub fn request_cancellation(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.state != ProgressState::Running {
            return false;
        }
        self.cancellation_requested = true;
        true
    }

    /// Forces a stuck RUNNING row back to IDLE without a matching job
    /// (the `/daemon/backup/reset/{id}` endpoint, §6.3) - bumps the epoch so
    /// any zombie writer for the old job is locked out.
    pub fn force_reset(&mut self, now: DateTime<Utc>) {
        self.epoch += 1;
        self.job_id = None;
        self.state = ProgressState::Idle;
        self.progress_percent = 0;
        self.stage = None;
        self.message = None;
        self.error = None;
        self.updated_at = now;
        self.cancellation_requested = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_while_running_conflicts() {
        let mut row = ProgressRow::default();
        row.start(JobId::new(), 1000, Utc::now()).unwrap();
        assert!(row.start(JobId::new(), 1000, Utc::now()).is_err());
    }

    #[test]
    fn stale_epoch_write_is_dropped() {
        let mut row = ProgressRow::default();
        let epoch = row.start(JobId::new(), 1000, Utc::now()).unwrap();
        row.force_reset(Utc::now());
        let new_epoch = row.start(JobId::new(), 1000, Utc::now()).unwrap();
        assert_ne!(epoch, new_epoch);

        let applied = row.apply(
            ProgressUpdate {
                epoch,
                state: ProgressState::Running,
                progress_percent: 50,
                stage: Some("upload".into()),
                message: None,
                bytes_processed: 500,
                bytes_total: 1000,
                error: None,
            },
            Utc::now(),
        );
        assert!(!applied, "zombie write from the old epoch must be dropped");
        assert_eq!(row.progress_percent, 0);
    }

    #[test]
    fn start_after_terminal_resets_atomically() {
        let mut row = ProgressRow::default();
        let epoch = row.start(JobId::new(), 1000, Utc::now()).unwrap();
        row.apply(
            ProgressUpdate {
                epoch,
                state: ProgressState::Failed,
                progress_percent: 40,
                stage: Some("upload".into()),
                message: None,
                bytes_processed: 400,
                bytes_total: 1000,
                error: Some("disk full".into()),
            },
            Utc::now(),
        );
        assert!(row.state.is_terminal());

        let new_epoch = row.start(JobId::new(), 2000, Utc::now()).unwrap();
        assert_ne!(epoch, new_epoch);
        assert_eq!(row.progress_percent, 0);
        assert!(row.error.is_none());
        assert_eq!(row.state, ProgressState::Running);
    }

    #[test]
    fn terminal_state_is_sticky_within_same_epoch() {
        let mut row = ProgressRow::default();
        let epoch = row.start(JobId::new(), 1000, Utc::now()).unwrap();
        row.apply(
            ProgressUpdate {
                epoch,
                state: ProgressState::Completed,
                progress_percent: 100,
                stage: Some("cleanup".into()),
                message: None,
                bytes_processed: 1000,
                bytes_total: 1000,
                error: None,
            },
            Utc::now(),
        );
        let applied = row.apply(
            ProgressUpdate {
                epoch,
                state: ProgressState::Running,
                progress_percent: 10,
                stage: None,
                message: None,
                bytes_processed: 0,
                bytes_total: 1000,
                error: None,
            },
            Utc::now(),
        );
        assert!(!applied);
        assert_eq!(row.state, ProgressState::Completed);
    }
}
