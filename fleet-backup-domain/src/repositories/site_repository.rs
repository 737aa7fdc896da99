// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Persistence port for `Site` (§3).

use async_trait::async_trait;

use crate::entities::Site;
use crate::error::BackupError;
use crate::value_objects::{NodeId, SiteId};

#[async_trait]
pub trait SiteRepository: Send + Sync {
    async fn insert(&self, site: &Site) -> Result<(), BackupError>;

    async fn find_by_id(&self, id: SiteId) -> Result<Option<Site>, BackupError>;

    async fn list_for_node(&self, node_id: NodeId) -> Result<Vec<Site>, BackupError>;

    async fn list_all(&self) -> Result<Vec<Site>, BackupError>;

    /// Sites whose `next_run_at` has passed, for the scheduler's one-minute
    /// tick (§4.7).
    async fn list_due(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<Site>, BackupError>;

    async fn update(&self, site: &Site) -> Result<(), BackupError>;

    async fn delete(&self, id: SiteId) -> Result<(), BackupError>;
}
