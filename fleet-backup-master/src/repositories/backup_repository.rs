// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! SQLite adapter for `BackupRepository` (§3, §4.5 retention accounting).
//! There is no `delete`: a backup row is retired via `Backup::mark_deleted`
//! followed by `update`, never removed outright, so the activity trail stays
//! intact for audit and drift reconciliation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use fleet_backup_domain::entities::{Backup, BackupStatus, BackupType};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::repositories::BackupRepository;
use fleet_backup_domain::value_objects::{BackupId, ByteSize, SiteId, StorageProviderId};

pub struct SqliteBackupRepository {
    pool: SqlitePool,
}

impl SqliteBackupRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, backup: &Backup) -> Result<(), BackupError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            "INSERT INTO backups (id, site_id, filename, size_bytes, object_path, storage_provider_id, \
             created_at, status, scheduled_deletion, backup_type) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(backup.id.to_string())
        .bind(backup.site_id.to_string())
        .bind(&backup.filename)
        .bind(backup.size_bytes.bytes() as i64)
        .bind(&backup.object_path)
        .bind(backup.storage_provider_id.to_string())
        .bind(backup.created_at)
        .bind(status_str(backup.status))
        .bind(backup.scheduled_deletion)
        .bind(backup_type_str(backup.backup_type))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: BackupId) -> Result<Option<Backup>, BackupError> {
        let row = sqlx::query("SELECT * FROM backups WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|row| row_to_backup(&row)).transpose()
    }

    pub async fn list_for_site(&self, site_id: SiteId) -> Result<Vec<Backup>, BackupError> {
        let rows = sqlx::query("SELECT * FROM backups WHERE site_id = ? ORDER BY created_at DESC")
            .bind(site_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_backup).collect()
    }

    pub async fn sum_usage_for_site(&self, site_id: SiteId) -> Result<ByteSize, BackupError> {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(size_bytes) FROM backups WHERE site_id = ? AND status = 'success'",
        )
        .bind(site_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(ByteSize::from_bytes(total.unwrap_or(0) as u64))
    }

    pub async fn list_due_for_deletion(&self, now: DateTime<Utc>) -> Result<Vec<Backup>, BackupError> {
        let rows = sqlx::query(
            "SELECT * FROM backups WHERE scheduled_deletion IS NOT NULL AND scheduled_deletion <= ? \
             AND status != 'deleted' ORDER BY scheduled_deletion",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(row_to_backup).collect()
    }

    pub async fn update(&self, backup: &Backup) -> Result<(), BackupError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            "UPDATE backups SET filename = ?, size_bytes = ?, object_path = ?, storage_provider_id = ?, \
             status = ?, scheduled_deletion = ?, backup_type = ? WHERE id = ?",
        )
        .bind(&backup.filename)
        .bind(backup.size_bytes.bytes() as i64)
        .bind(&backup.object_path)
        .bind(backup.storage_provider_id.to_string())
        .bind(status_str(backup.status))
        .bind(backup.scheduled_deletion)
        .bind(backup_type_str(backup.backup_type))
        .bind(backup.id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}

fn status_str(status: BackupStatus) -> &'static str {
    match status {
        BackupStatus::Running => "running",
        BackupStatus::Success => "success",
        BackupStatus::Failed => "failed",
        BackupStatus::Deleted => "deleted",
    }
}

fn parse_status(value: &str) -> Result<BackupStatus, BackupError> {
    match value {
        "running" => Ok(BackupStatus::Running),
        "success" => Ok(BackupStatus::Success),
        "failed" => Ok(BackupStatus::Failed),
        "deleted" => Ok(BackupStatus::Deleted),
        other => Err(BackupError::integrity(format!("unknown backup status '{other}' in database"))),
    }
}

fn backup_type_str(backup_type: BackupType) -> &'static str {
    match backup_type {
        BackupType::Full => "full",
    }
}

fn parse_backup_type(value: &str) -> Result<BackupType, BackupError> {
    match value {
        "full" => Ok(BackupType::Full),
        other => Err(BackupError::integrity(format!("unknown backup type '{other}' in database"))),
    }
}

fn row_to_backup(row: &sqlx::sqlite::SqliteRow) -> Result<Backup, BackupError> {
    let id: String = row.try_get("id").map_err(db_err)?;
    let site_id: String = row.try_get("site_id").map_err(db_err)?;
    let storage_provider_id: String = row.try_get("storage_provider_id").map_err(db_err)?;
    let size_bytes: i64 = row.try_get("size_bytes").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;
    let backup_type: String = row.try_get("backup_type").map_err(db_err)?;

    Ok(Backup {
        id: BackupId::parse(&id)?,
        site_id: SiteId::parse(&site_id)?,
        filename: row.try_get("filename").map_err(db_err)?,
        size_bytes: ByteSize::from_bytes(size_bytes as u64),
        object_path: row.try_get("object_path").map_err(db_err)?,
        storage_provider_id: StorageProviderId::parse(&storage_provider_id)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        status: parse_status(&status)?,
        scheduled_deletion: row.try_get("scheduled_deletion").map_err(db_err)?,
        backup_type: parse_backup_type(&backup_type)?,
    })
}

fn db_err(err: impl std::fmt::Display) -> BackupError {
    BackupError::database(format!("backup repository: {err}"))
}

#[async_trait]
impl BackupRepository for SqliteBackupRepository {
    async fn insert(&self, backup: &Backup) -> Result<(), BackupError> {
        SqliteBackupRepository::insert(self, backup).await
    }

    async fn find_by_id(&self, id: BackupId) -> Result<Option<Backup>, BackupError> {
        SqliteBackupRepository::find_by_id(self, id).await
    }

    async fn list_for_site(&self, site_id: SiteId) -> Result<Vec<Backup>, BackupError> {
        SqliteBackupRepository::list_for_site(self, site_id).await
    }

    async fn sum_usage_for_site(&self, site_id: SiteId) -> Result<ByteSize, BackupError> {
        SqliteBackupRepository::sum_usage_for_site(self, site_id).await
    }

    async fn list_due_for_deletion(&self, now: DateTime<Utc>) -> Result<Vec<Backup>, BackupError> {
        SqliteBackupRepository::list_due_for_deletion(self, now).await
    }

    async fn update(&self, backup: &Backup) -> Result<(), BackupError> {
        SqliteBackupRepository::update(self, backup).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::initialize_database;

    async fn repo() -> SqliteBackupRepository {
        let pool = initialize_database(":memory:").await.unwrap();
        SqliteBackupRepository::new(pool)
    }

    #[tokio::test]
    async fn insert_then_find_round_trips() {
        let repo = repo().await;
        let site_id = SiteId::new();
        let backup = Backup::new_running(site_id, StorageProviderId::new(), "example_20260730_020000.tar.zst".into());
        repo.insert(&backup).await.unwrap();

        let found = repo.find_by_id(backup.id).await.unwrap().unwrap();
        assert_eq!(found.status, BackupStatus::Running);
        assert_eq!(found.site_id, site_id);
    }

    #[tokio::test]
    async fn sum_usage_only_counts_successful_backups() {
        let repo = repo().await;
        let site_id = SiteId::new();

        let mut success = Backup::new_running(site_id, StorageProviderId::new(), "a.tar.zst".into());
        success.mark_success("node/site/a.tar.zst".into(), ByteSize::mib(100)).unwrap();
        repo.insert(&success).await.unwrap();

        let mut failed = Backup::new_running(site_id, StorageProviderId::new(), "b.tar.zst".into());
        failed.mark_failed();
        repo.insert(&failed).await.unwrap();

        let running = Backup::new_running(site_id, StorageProviderId::new(), "c.tar.zst".into());
        repo.insert(&running).await.unwrap();

        let total = repo.sum_usage_for_site(site_id).await.unwrap();
        assert_eq!(total, ByteSize::mib(100));
    }

    #[tokio::test]
    async fn list_due_for_deletion_excludes_already_deleted() {
        let repo = repo().await;
        let site_id = SiteId::new();
        let past = Utc::now() - chrono::Duration::days(1);

        let mut due = Backup::new_running(site_id, StorageProviderId::new(), "due.tar.zst".into());
        due.mark_success("node/site/due.tar.zst".into(), ByteSize::mib(10)).unwrap();
        due.schedule_deletion(past);
        repo.insert(&due).await.unwrap();

        let mut already_deleted = Backup::new_running(site_id, StorageProviderId::new(), "gone.tar.zst".into());
        already_deleted.mark_success("node/site/gone.tar.zst".into(), ByteSize::mib(10)).unwrap();
        already_deleted.schedule_deletion(past);
        already_deleted.mark_deleted();
        repo.insert(&already_deleted).await.unwrap();

        let results = repo.list_due_for_deletion(Utc::now()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, due.id);
    }
}
