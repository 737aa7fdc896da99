// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite-backed `ProgressRepository` (§3, §4.3 progress store, §9 design
//! notes on the epoch-CAS row and SSE as a small multicast). Every mutating
//! call takes a process-wide lock before touching the row: SQLite gives us
//! durability, but the read-modify-write itself (load row, apply the
//! epoch-gated domain method, persist) has to be atomic with respect to other
//! callers in this process, and a transaction alone does not guarantee that
//! against two concurrent `SELECT`s racing ahead of either `UPDATE`.
//!
//! A `watch::Sender<ProgressRow>` per site backs the SSE endpoint: every
//! successful mutation broadcasts the new row so subscribers observe it
//! without polling the database themselves.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tokio::sync::{watch, Mutex};

use fleet_backup_domain::entities::{ProgressRow, ProgressState, ProgressUpdate};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::repositories::ProgressRepository;
use fleet_backup_domain::value_objects::{JobId, SiteId};

pub struct SqliteProgressRepository {
    pool: SqlitePool,
    channels: Mutex<HashMap<SiteId, watch::Sender<ProgressRow>>>,
}

impl SqliteProgressRepository {
    pub fn new(pool: SqlitePool) -> Arc<Self> {
        Arc::new(Self { pool, channels: Mutex::new(HashMap::new()) })
    }

    /// Subscribes to live updates for a site's progress row, seeding the
    /// channel from the current persisted state (or the zeroed default) the
    /// first time a site is observed.
    pub async fn subscribe(&self, site_id: SiteId) -> Result<watch::Receiver<ProgressRow>, BackupError> {
        let mut channels = self.channels.lock().await;
        if let Some(sender) = channels.get(&site_id) {
            return Ok(sender.subscribe());
        }
        let current = load_row(&self.pool, site_id).await?;
        let (sender, receiver) = watch::channel(current);
        channels.insert(site_id, sender);
        Ok(receiver)
    }

    pub async fn get(&self, site_id: SiteId) -> Result<ProgressRow, BackupError> {
        load_row(&self.pool, site_id).await
    }

    pub async fn start(&self, site_id: SiteId, job_id: JobId, bytes_total: u64) -> Result<u64, BackupError> {
        let mut channels = self.channels.lock().await;
        let mut row = load_row(&self.pool, site_id).await?;
        let epoch = row.start(Some(job_id), bytes_total, Utc::now())?;
        persist_row(&self.pool, site_id, &row).await?;
        broadcast(&mut channels, site_id, row);
        Ok(epoch)
    }

    pub async fn apply(&self, site_id: SiteId, update: ProgressUpdate) -> Result<bool, BackupError> {
        let mut channels = self.channels.lock().await;
        let mut row = load_row(&self.pool, site_id).await?;
        let applied = row.apply(update, Utc::now());
        if applied {
            persist_row(&self.pool, site_id, &row).await?;
            broadcast(&mut channels, site_id, row);
        }
        Ok(applied)
    }

    pub async fn request_cancellation(&self, site_id: SiteId, epoch: u64) -> Result<bool, BackupError> {
        let mut channels = self.channels.lock().await;
        let mut row = load_row(&self.pool, site_id).await?;
        let accepted = row.request_cancellation(epoch);
        if accepted {
            persist_row(&self.pool, site_id, &row).await?;
            broadcast(&mut channels, site_id, row);
        }
        Ok(accepted)
    }

    pub async fn force_reset(&self, site_id: SiteId) -> Result<(), BackupError> {
        let mut channels = self.channels.lock().await;
        let mut row = load_row(&self.pool, site_id).await?;
        row.force_reset(Utc::now());
        persist_row(&self.pool, site_id, &row).await?;
        broadcast(&mut channels, site_id, row);
        Ok(())
    }
}

fn broadcast(channels: &mut HashMap<SiteId, watch::Sender<ProgressRow>>, site_id: SiteId, row: ProgressRow) {
    match channels.get(&site_id) {
        Some(sender) => {
            let _ = sender.send(row);
        }
        None => {
            let (sender, _receiver) = watch::channel(row);
            channels.insert(site_id, sender);
        }
    }
}

async fn load_row(pool: &SqlitePool, site_id: SiteId) -> Result<ProgressRow, BackupError> {
    let row = sqlx::query("SELECT * FROM progress_rows WHERE site_id = ?")
        .bind(site_id.to_string())
        .fetch_optional(pool)
        .await
        .map_err(db_err)?;
    match row {
        Some(row) => row_to_progress(&row),
        None => Ok(ProgressRow::default()),
    }
}

async fn persist_row(pool: &SqlitePool, site_id: SiteId, row: &ProgressRow) -> Result<(), BackupError> {
    sqlx::query(
        "INSERT INTO progress_rows (site_id, epoch, job_id, state, progress_percent, stage, message, \
         bytes_processed, bytes_total, error, started_at, updated_at, cancellation_requested) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT(site_id) DO UPDATE SET \
           epoch = excluded.epoch, job_id = excluded.job_id, state = excluded.state, \
           progress_percent = excluded.progress_percent, stage = excluded.stage, message = excluded.message, \
           bytes_processed = excluded.bytes_processed, bytes_total = excluded.bytes_total, error = excluded.error, \
           started_at = excluded.started_at, updated_at = excluded.updated_at, \
           cancellation_requested = excluded.cancellation_requested",
    )
    .bind(site_id.to_string())
    .bind(row.epoch as i64)
    .bind(row.job_id.map(|id| id.to_string()))
    .bind(state_str(row.state))
    .bind(row.progress_percent as i64)
    .bind(&row.stage)
    .bind(&row.message)
    .bind(row.bytes_processed as i64)
    .bind(row.bytes_total as i64)
    .bind(&row.error)
    .bind(row.started_at)
    .bind(row.updated_at)
    .bind(row.cancellation_requested as i64)
    .execute(pool)
    .await
    .map_err(db_err)?;
    Ok(())
}

fn state_str(state: ProgressState) -> &'static str {
    match state {
        ProgressState::Idle => "idle",
        ProgressState::Running => "running",
        ProgressState::Completed => "completed",
        ProgressState::Failed => "failed",
        ProgressState::Stopped => "stopped",
    }
}

fn parse_state(value: &str) -> Result<ProgressState, BackupError> {
    match value {
        "idle" => Ok(ProgressState::Idle),
        "running" => Ok(ProgressState::Running),
        "completed" => Ok(ProgressState::Completed),
        "failed" => Ok(ProgressState::Failed),
        "stopped" => Ok(ProgressState::Stopped),
        other => Err(BackupError::integrity(format!("unknown progress state '{other}' in database"))),
    }
}

fn row_to_progress(row: &sqlx::sqlite::SqliteRow) -> Result<ProgressRow, BackupError> {
    let epoch: i64 = row.try_get("epoch").map_err(db_err)?;
    let job_id: Option<String> = row.try_get("job_id").map_err(db_err)?;
    let state: String = row.try_get("state").map_err(db_err)?;
    let progress_percent: i64 = row.try_get("progress_percent").map_err(db_err)?;
    let bytes_processed: i64 = row.try_get("bytes_processed").map_err(db_err)?;
    let bytes_total: i64 = row.try_get("bytes_total").map_err(db_err)?;
    let started_at: Option<DateTime<Utc>> = row.try_get("started_at").map_err(db_err)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(db_err)?;
    let cancellation_requested: i64 = row.try_get("cancellation_requested").map_err(db_err)?;

    Ok(ProgressRow {
        epoch: epoch as u64,
        job_id: job_id.map(|id| JobId::parse(&id)).transpose()?,
        state: parse_state(&state)?,
        progress_percent: progress_percent as u8,
        stage: row.try_get("stage").map_err(db_err)?,
        message: row.try_get("message").map_err(db_err)?,
        bytes_processed: bytes_processed as u64,
        bytes_total: bytes_total as u64,
        error: row.try_get("error").map_err(db_err)?,
        started_at,
        updated_at,
        cancellation_requested: cancellation_requested != 0,
    })
}

fn db_err(err: impl std::fmt::Display) -> BackupError {
    BackupError::database(format!("progress repository: {err}"))
}

#[async_trait]
impl ProgressRepository for SqliteProgressRepository {
    async fn get(&self, site_id: SiteId) -> Result<ProgressRow, BackupError> {
        SqliteProgressRepository::get(self, site_id).await
    }

    async fn start(&self, site_id: SiteId, job_id: JobId, bytes_total: u64) -> Result<u64, BackupError> {
        SqliteProgressRepository::start(self, site_id, job_id, bytes_total).await
    }

    async fn apply(&self, site_id: SiteId, update: ProgressUpdate) -> Result<bool, BackupError> {
        SqliteProgressRepository::apply(self, site_id, update).await
    }

    async fn request_cancellation(&self, site_id: SiteId, epoch: u64) -> Result<bool, BackupError> {
        SqliteProgressRepository::request_cancellation(self, site_id, epoch).await
    }

    async fn force_reset(&self, site_id: SiteId) -> Result<(), BackupError> {
        SqliteProgressRepository::force_reset(self, site_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::initialize_database;

    async fn repo() -> Arc<SqliteProgressRepository> {
        let pool = initialize_database(":memory:").await.unwrap();
        SqliteProgressRepository::new(pool)
    }

    #[tokio::test]
    async fn get_on_unknown_site_returns_idle_default() {
        let repo = repo().await;
        let row = repo.get(SiteId::new()).await.unwrap();
        assert_eq!(row.state, ProgressState::Idle);
        assert_eq!(row.epoch, 0);
    }

    #[tokio::test]
    async fn start_persists_and_increments_epoch_across_restarts() {
        let site_id = SiteId::new();
        let repo = repo().await;
        let epoch = repo.start(site_id, JobId::new(), 1000).await.unwrap();
        assert_eq!(epoch, 1);

        let row = repo.get(site_id).await.unwrap();
        assert_eq!(row.state, ProgressState::Running);
        assert_eq!(row.bytes_total, 1000);
    }

    #[tokio::test]
    async fn apply_is_rejected_for_a_stale_epoch() {
        let site_id = SiteId::new();
        let repo = repo().await;
        let epoch = repo.start(site_id, JobId::new(), 1000).await.unwrap();

        let stale = ProgressUpdate {
            epoch: epoch - 1,
            state: ProgressState::Running,
            progress_percent: 50,
            stage: Some("dump".into()),
            message: None,
            bytes_processed: 500,
            bytes_total: 1000,
            error: None,
        };
        assert!(!repo.apply(site_id, stale).await.unwrap());
    }

    #[tokio::test]
    async fn subscribe_observes_subsequent_mutations() {
        let site_id = SiteId::new();
        let repo = repo().await;
        let mut receiver = repo.subscribe(site_id).await.unwrap();
        assert_eq!(receiver.borrow().state, ProgressState::Idle);

        repo.start(site_id, JobId::new(), 500).await.unwrap();
        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().state, ProgressState::Running);
    }

    #[tokio::test]
    async fn request_cancellation_requires_the_current_epoch() {
        let site_id = SiteId::new();
        let repo = repo().await;
        let epoch = repo.start(site_id, JobId::new(), 500).await.unwrap();

        assert!(!repo.request_cancellation(site_id, epoch - 1).await.unwrap());
        assert!(repo.request_cancellation(site_id, epoch).await.unwrap());
        assert!(repo.get(site_id).await.unwrap().cancellation_requested);
    }
}
