// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Persistence port for `Backup` (§3, §4.5).

use async_trait::async_trait;

use crate::entities::Backup;
use crate::error::BackupError;
use crate::value_objects::{BackupId, ByteSize, SiteId};

#[async_trait]
pub trait BackupRepository: Send + Sync {
    async fn insert(&self, backup: &Backup) -> Result<(), BackupError>;

    async fn find_by_id(&self, id: BackupId) -> Result<Option<Backup>, BackupError>;

    async fn list_for_site(&self, site_id: SiteId) -> Result<Vec<Backup>, BackupError>;

    /// Sum of `size_bytes` for SUCCESS, non-deleted backups of a site - the
    /// authoritative figure the quota engine reconciles `storage_used_bytes`
    /// against (§4.5 step 4, §8 invariant on recorded usage).
    async fn sum_usage_for_site(&self, site_id: SiteId) -> Result<ByteSize, BackupError>;

    /// Backups whose `scheduled_deletion` is due, across all sites, for the
    /// retention sweep (§4.5).
    async fn list_due_for_deletion(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<Backup>, BackupError>;

    async fn update(&self, backup: &Backup) -> Result<(), BackupError>;
}
