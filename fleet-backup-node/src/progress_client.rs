// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `ProgressRepository` over HTTP (§4.3: "writes are authored by the Node
//! daemon via an authenticated API or by an embedded Master-mode pipeline,
//! same code path"). This is the authenticated-API half of that sentence -
//! `fleet-backup-master` provides the embedded half directly against its
//! SQLite-backed store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use fleet_backup_domain::entities::{ProgressRow, ProgressUpdate};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::repositories::ProgressRepository;
use fleet_backup_domain::value_objects::{JobId, SiteId};

pub struct HttpProgressRepository {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpProgressRepository {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

fn map_err(err: reqwest::Error) -> BackupError {
    BackupError::transient(format!("progress store request failed: {err}"))
}

#[derive(Serialize)]
struct StartRequest {
    job_id: JobId,
    bytes_total: u64,
}

#[derive(Deserialize)]
struct StartResponse {
    epoch: u64,
}

#[derive(Deserialize)]
struct AppliedResponse {
    applied: bool,
}

#[async_trait]
impl ProgressRepository for HttpProgressRepository {
    async fn get(&self, site_id: SiteId) -> Result<ProgressRow, BackupError> {
        self.http
            .get(self.url(&format!("/sites/{site_id}/backup/status")))
            .header("X-Node-Key", &self.api_key)
            .send()
            .await
            .map_err(map_err)?
            .error_for_status()
            .map_err(map_err)?
            .json()
            .await
            .map_err(map_err)
    }

    async fn start(&self, site_id: SiteId, job_id: JobId, bytes_total: u64) -> Result<u64, BackupError> {
        let response: StartResponse = self
            .http
            .post(self.url(&format!("/sites/{site_id}/backup/progress/start")))
            .header("X-Node-Key", &self.api_key)
            .json(&StartRequest { job_id, bytes_total })
            .send()
            .await
            .map_err(map_err)?
            .error_for_status()
            .map_err(map_err)?
            .json()
            .await
            .map_err(map_err)?;
        Ok(response.epoch)
    }

    async fn apply(&self, site_id: SiteId, update: ProgressUpdate) -> Result<bool, BackupError> {
        let response: AppliedResponse = self
            .http
            .post(self.url(&format!("/sites/{site_id}/backup/progress")))
            .header("X-Node-Key", &self.api_key)
            .json(&ProgressUpdateWire::from(update))
            .send()
            .await
            .map_err(map_err)?
            .error_for_status()
            .map_err(map_err)?
            .json()
            .await
            .map_err(map_err)?;
        Ok(response.applied)
    }

    async fn request_cancellation(&self, site_id: SiteId, epoch: u64) -> Result<bool, BackupError> {
        let response: AppliedResponse = self
            .http
            .post(self.url(&format!("/sites/{site_id}/backup/stop")))
            .header("X-Node-Key", &self.api_key)
            .json(&serde_json::json!({ "epoch": epoch }))
            .send()
            .await
            .map_err(map_err)?
            .error_for_status()
            .map_err(map_err)?
            .json()
            .await
            .map_err(map_err)?;
        Ok(response.applied)
    }

    async fn force_reset(&self, site_id: SiteId) -> Result<(), BackupError> {
        self.http
            .post(self.url(&format!("/daemon/backup/reset/{site_id}")))
            .header("X-Node-Key", &self.api_key)
            .send()
            .await
            .map_err(map_err)?
            .error_for_status()
            .map_err(map_err)?;
        Ok(())
    }
}

/// Wire shape for `ProgressUpdate`, which intentionally carries no
/// `Serialize` impl in the domain crate (it is an in-process command, not a
/// persisted shape) - this is the one adapter that needs it on the wire.
#[derive(Serialize)]
struct ProgressUpdateWire {
    epoch: u64,
    state: fleet_backup_domain::entities::ProgressState,
    progress_percent: u8,
    stage: Option<String>,
    message: Option<String>,
    bytes_processed: u64,
    bytes_total: u64,
    error: Option<String>,
}

impl From<ProgressUpdate> for ProgressUpdateWire {
    fn from(update: ProgressUpdate) -> Self {
        Self {
            epoch: update.epoch,
            state: update.state,
            progress_percent: update.progress_percent,
            stage: update.stage,
            message: update.message,
            bytes_processed: update.bytes_processed,
            bytes_total: update.bytes_total,
            error: update.error,
        }
    }
}
