// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The Node's job queue and worker loop (§9 open question #1: "a single
//! `tokio::sync::mpsc` bounded queue feeding one `PipelineEngine` worker
//! loop per Node process"). Jobs for different sites run concurrently,
//! bounded only by the resource governor; §4.7 guarantees at most one job
//! per site at a time, enforced here with a `running` set rather than by
//! serializing the whole queue.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use fleet_backup_domain::entities::DbCredentials;
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::repositories::ProgressRepository;
use fleet_backup_domain::value_objects::{JobId, SiteId, StageGraph};
use fleet_backup_engine::{PipelineEngine, ResourceGovernor, StageRegistry};

use crate::master_client::{BackupReport, MasterApiClient};

#[derive(Debug, Clone)]
pub struct BackupJob {
    pub site_id: SiteId,
    pub site_name: String,
    pub wp_config_path: PathBuf,
    pub wp_content_path: PathBuf,
    pub db_credentials: Option<DbCredentials>,
    pub estimated_bytes: u64,
}

#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<BackupJob>,
}

impl JobQueue {
    /// `submit` is non-blocking best-effort: a full queue means the daemon
    /// is already behind, and a dropped enqueue will be retried on the next
    /// scheduler tick rather than backing up indefinitely.
    pub fn submit(&self, job: BackupJob) {
        if let Err(mpsc::error::TrySendError::Full(job)) = self.sender.try_send(job) {
            tracing::warn!(site_id = %job.site_id, "job queue full, dropping enqueue for this tick");
        }
    }
}

#[derive(Clone)]
struct WorkerCore {
    temp_root: PathBuf,
    resource_governor: Arc<ResourceGovernor>,
    registry: Arc<StageRegistry>,
    progress: Arc<dyn ProgressRepository>,
    master: Arc<dyn MasterApiClient>,
    running: Arc<Mutex<HashMap<SiteId, CancellationToken>>>,
}

pub struct PipelineWorker {
    core: WorkerCore,
    receiver: mpsc::Receiver<BackupJob>,
}

/// A cheap, cloneable handle to a running `PipelineWorker`, kept by `main`
/// after the worker itself has been handed to `drain` - `drain` consumes
/// the job receiver, so it can't also be queried for stop requests.
#[derive(Clone)]
pub struct WorkerHandle {
    running: Arc<Mutex<HashMap<SiteId, CancellationToken>>>,
}

impl WorkerHandle {
    /// Cancels the job currently running for `site_id`, if any. Returns
    /// `false` when there is nothing to cancel - the caller (command poll)
    /// treats that as a no-op, not an error.
    pub async fn request_stop(&self, site_id: SiteId) -> bool {
        if let Some(token) = self.running.lock().await.get(&site_id) {
            token.cancel();
            true
        } else {
            false
        }
    }
}

impl PipelineWorker {
    pub fn new(
        temp_root: PathBuf,
        resource_governor: Arc<ResourceGovernor>,
        registry: Arc<StageRegistry>,
        progress: Arc<dyn ProgressRepository>,
        master: Arc<dyn MasterApiClient>,
    ) -> (Self, JobQueue) {
        let (sender, receiver) = mpsc::channel(256);
        let core = WorkerCore {
            temp_root,
            resource_governor,
            registry,
            progress,
            master,
            running: Arc::new(Mutex::new(HashMap::new())),
        };
        (Self { core, receiver }, JobQueue { sender })
    }

    pub fn handle(&self) -> WorkerHandle {
        WorkerHandle {
            running: self.core.running.clone(),
        }
    }

    pub async fn drain(mut self) {
        while let Some(job) = self.receiver.recv().await {
            let core = self.core.clone();
            tokio::spawn(async move { core.dispatch(job).await });
        }
    }
}

impl WorkerCore {
    async fn dispatch(&self, job: BackupJob) {
        {
            let mut running = self.running.lock().await;
            if running.contains_key(&job.site_id) {
                tracing::info!(site_id = %job.site_id, "backup already running for this site, skipping");
                return;
            }
            running.insert(job.site_id, CancellationToken::new());
        }

        let result = self.run_job(&job).await;

        self.running.lock().await.remove(&job.site_id);

        let report = match result {
            Ok((object_path, size_bytes)) => BackupReport {
                site_id: job.site_id,
                success: true,
                object_path: Some(object_path),
                size_bytes: Some(size_bytes),
                error: None,
            },
            Err(err) => BackupReport {
                site_id: job.site_id,
                success: false,
                object_path: None,
                size_bytes: None,
                error: Some(err.to_string()),
            },
        };
        if let Err(err) = self.master.report_backup_result(report).await {
            tracing::error!(site_id = %job.site_id, error = %err, "failed to report backup result to master");
        }
    }

    async fn run_job(&self, job: &BackupJob) -> Result<(String, u64), BackupError> {
        let job_id = JobId::new();
        let epoch = self.progress.start(job.site_id, job_id, job.estimated_bytes).await?;

        let temp_dir = self.temp_root.join(job_id.to_string());
        tokio::fs::create_dir_all(&temp_dir).await?;

        let cancellation = self.running.lock().await.get(&job.site_id).cloned().unwrap_or_else(CancellationToken::new);

        let mut ctx = fleet_backup_engine::Context::new(
            job_id,
            job.site_id,
            job.site_name.clone(),
            job.db_credentials.clone(),
            job.wp_content_path.clone(),
            job.wp_config_path.clone(),
            temp_dir,
            self.resource_governor.clone(),
            self.progress.clone(),
            StageGraph::wordpress(),
            epoch,
        );
        ctx.cancellation = cancellation;

        let engine = PipelineEngine::new();
        let (outcome, _results) = engine.run(&mut ctx, &self.registry).await?;

        match outcome {
            fleet_backup_engine::JobOutcome::Completed => {
                let object_path = ctx.object_path.clone().unwrap_or_default();
                let size = ctx.scratchpad.get("uploaded_bytes").and_then(|s| s.parse().ok()).unwrap_or(0);
                Ok((object_path, size))
            }
            fleet_backup_engine::JobOutcome::Failed(msg) => Err(BackupError::fatal(msg)),
            fleet_backup_engine::JobOutcome::Stopped => Err(BackupError::cancelled("backup stopped by operator")),
        }
    }
}
