// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Persistence port for `ActivityLogEntry` (§3).

use async_trait::async_trait;

use crate::entities::ActivityLogEntry;
use crate::error::BackupError;
use crate::value_objects::UserId;

#[async_trait]
pub trait ActivityLogRepository: Send + Sync {
    /// Inserts an entry and trims the actor's history down to
    /// `ACTIVITY_LOG_RETENTION`, oldest first.
    async fn append(&self, entry: ActivityLogEntry) -> Result<(), BackupError>;

    async fn list_for_actor(&self, actor: UserId, limit: usize) -> Result<Vec<ActivityLogEntry>, BackupError>;
}
