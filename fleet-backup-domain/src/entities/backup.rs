// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Backup entity (§3) - one archive of one site.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackupError;
use crate::value_objects::{BackupId, ByteSize, SiteId, StorageProviderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Running,
    Success,
    Failed,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    Full,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub id: BackupId,
    pub site_id: SiteId,
    pub filename: String,
    pub size_bytes: ByteSize,
    /// Object-store path, e.g. `{node_uuid}/{site_uuid}/{filename}`. Only
    /// ever non-empty once `status == Success`.
    pub object_path: String,
    pub storage_provider_id: StorageProviderId,
    pub created_at: DateTime<Utc>,
    pub status: BackupStatus,
    pub scheduled_deletion: Option<DateTime<Utc>>,
    pub backup_type: BackupType,
}

impl Backup {
    pub fn new_running(site_id: SiteId, storage_provider_id: StorageProviderId, filename: String) -> Self {
        Self {
            id: BackupId::new(),
            site_id,
            filename,
            size_bytes: ByteSize::ZERO,
            object_path: String::new(),
            storage_provider_id,
            created_at: Utc::now(),
            status: BackupStatus::Running,
            scheduled_deletion: None,
            backup_type: BackupType::Full,
        }
    }

    pub fn mark_success(&mut self, object_path: String, size_bytes: ByteSize) -> Result<(), BackupError> {
        if object_path.is_empty() {
            return Err(BackupError::integrity("a SUCCESS backup must have a non-empty object path"));
        }
        self.status = BackupStatus::Success;
        self.object_path = object_path;
        self.size_bytes = size_bytes;
        Ok(())
    }

    pub fn mark_failed(&mut self) {
        self.status = BackupStatus::Failed;
    }

    /// §3 invariant: a DELETED backup contributes nothing to accounting and
    /// leaves no object-store residue.
    pub fn mark_deleted(&mut self) {
        self.status = BackupStatus::Deleted;
        self.scheduled_deletion = None;
        self.object_path.clear();
    }

    pub fn contributes_to_usage(&self) -> bool {
        self.status == BackupStatus::Success
    }

    pub fn schedule_deletion(&mut self, at: DateTime<Utc>) {
        self.scheduled_deletion = Some(at);
    }

    pub fn cancel_scheduled_deletion(&mut self) {
        self.scheduled_deletion = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_requires_object_path() {
        let mut backup = Backup::new_running(SiteId::new(), StorageProviderId::new(), "f.tar.zst".into());
        assert!(backup.mark_success(String::new(), ByteSize::from_bytes(1)).is_err());
        backup.mark_success("node/site/f.tar.zst".into(), ByteSize::from_bytes(1)).unwrap();
        assert!(backup.contributes_to_usage());
    }

    #[test]
    fn deleted_backup_has_no_residue() {
        let mut backup = Backup::new_running(SiteId::new(), StorageProviderId::new(), "f.tar.zst".into());
        backup.mark_success("node/site/f.tar.zst".into(), ByteSize::from_bytes(1)).unwrap();
        backup.mark_deleted();
        assert!(backup.object_path.is_empty());
        assert!(!backup.contributes_to_usage());
    }
}
