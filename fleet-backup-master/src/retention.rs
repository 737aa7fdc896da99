// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Retention sweep (§4.5): deletes backups whose grace period has elapsed.
//! The object-store blob is deleted before the row is marked `Deleted`, so a
//! crash between the two leaves the row still `scheduled_deletion <= now`
//! and `status != deleted` - exactly the state `list_due_for_deletion`
//! selects on, so the next sweep retries it rather than orphaning the blob.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tracing::{info, warn};

use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::repositories::BackupRepository;
use fleet_backup_domain::services::object_store::ObjectStore;

pub struct RetentionSweeper {
    backups: Arc<dyn BackupRepository>,
    object_store: Arc<dyn ObjectStore>,
}

impl RetentionSweeper {
    pub fn new(backups: Arc<dyn BackupRepository>, object_store: Arc<dyn ObjectStore>) -> Self {
        Self { backups, object_store }
    }

    /// Runs one sweep, returning the number of backups actually deleted.
    pub async fn sweep_once(&self) -> Result<usize, BackupError> {
        let due = self.backups.list_due_for_deletion(Utc::now()).await?;
        let mut deleted = 0;
        for mut backup in due {
            match self.object_store.delete(&backup.object_path).await {
                Ok(()) => {
                    backup.mark_deleted();
                    self.backups.update(&backup).await?;
                    deleted += 1;
                }
                Err(err) => {
                    warn!(backup_id = %backup.id, error = %err, "retention sweep: blob delete failed, will retry next sweep");
                }
            }
        }
        if deleted > 0 {
            info!(deleted, "retention sweep removed expired backups");
        }
        Ok(deleted)
    }

    /// Runs `sweep_once` on a fixed interval until `cancel` fires.
    pub async fn run(&self, interval: StdDuration, cancel: fleet_backup_bootstrap::CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep_once().await {
                        warn!(error = %err, "retention sweep failed");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::initialize_database;
    use crate::repositories::SqliteBackupRepository;
    use fleet_backup_domain::entities::Backup;
    use fleet_backup_domain::value_objects::{ByteSize, SiteId, StorageProviderId};
    use fleet_backup_engine::object_store::LocalObjectStore;

    async fn backups() -> Arc<SqliteBackupRepository> {
        let pool = initialize_database(":memory:").await.unwrap();
        Arc::new(SqliteBackupRepository::new(pool))
    }

    #[tokio::test]
    async fn sweep_deletes_blob_then_marks_the_row_deleted() {
        let repo = backups().await;
        let tmp = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(tmp.path().to_path_buf()));

        let object_path = "node/site/example_20260101_020000.tar.zst";
        let local_file = tmp.path().join("source.tar.zst");
        tokio::fs::write(&local_file, b"payload").await.unwrap();
        store.put(&local_file, object_path, &tokio_util::sync::CancellationToken::new()).await.unwrap();

        let mut backup = Backup::new_running(SiteId::new(), StorageProviderId::new(), "example_20260101_020000.tar.zst".into());
        backup.mark_success(object_path.to_string(), ByteSize::from_bytes(7)).unwrap();
        backup.schedule_deletion(Utc::now() - chrono::Duration::minutes(1));
        repo.insert(&backup).await.unwrap();

        let sweeper = RetentionSweeper::new(repo.clone(), store.clone());
        let deleted = sweeper.sweep_once().await.unwrap();
        assert_eq!(deleted, 1);

        let found = repo.find_by_id(backup.id).await.unwrap().unwrap();
        assert_eq!(found.status, fleet_backup_domain::entities::BackupStatus::Deleted);
        assert!(store.list("node/site").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sweep_leaves_the_row_alone_when_blob_delete_fails() {
        let repo = backups().await;
        // An object store rooted at a path with no matching object: delete fails closed.
        let tmp = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(tmp.path().to_path_buf()));

        let mut backup = Backup::new_running(SiteId::new(), StorageProviderId::new(), "missing.tar.zst".into());
        backup.mark_success("node/site/missing.tar.zst".into(), ByteSize::from_bytes(7)).unwrap();
        backup.schedule_deletion(Utc::now() - chrono::Duration::minutes(1));
        repo.insert(&backup).await.unwrap();

        let sweeper = RetentionSweeper::new(repo.clone(), store);
        let deleted = sweeper.sweep_once().await.unwrap();
        assert_eq!(deleted, 0);

        let found = repo.find_by_id(backup.id).await.unwrap().unwrap();
        assert_ne!(found.status, fleet_backup_domain::entities::BackupStatus::Deleted);
    }
}
