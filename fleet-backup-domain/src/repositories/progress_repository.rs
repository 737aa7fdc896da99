// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Persistence port for the one-row-per-site `ProgressRow` (§4.3).
//!
//! Every mutating method here must be a single atomic read-modify-write -
//! `apply` and `request_cancellation` both depend on comparing the stored
//! epoch before touching the row, and a non-atomic implementation reopens
//! exactly the race `ProgressRow::apply` exists to close.

use async_trait::async_trait;

use crate::entities::{ProgressRow, ProgressUpdate};
use crate::error::BackupError;
use crate::value_objects::{JobId, SiteId};

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    async fn get(&self, site_id: SiteId) -> Result<ProgressRow, BackupError>;

    /// Atomically calls `ProgressRow::start` against the stored row and
    /// persists the result, returning the new epoch.
    async fn start(&self, site_id: SiteId, job_id: JobId, bytes_total: u64) -> Result<u64, BackupError>;

    /// Atomically calls `ProgressRow::apply`; returns whether it was applied
    /// or dropped as stale, it never errors on a stale epoch.
    async fn apply(&self, site_id: SiteId, update: ProgressUpdate) -> Result<bool, BackupError>;

    async fn request_cancellation(&self, site_id: SiteId, epoch: u64) -> Result<bool, BackupError>;

    async fn force_reset(&self, site_id: SiteId) -> Result<(), BackupError>;
}
