// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The per-job `Context` (§4.1) every stage reads and writes. It is
//! constructed once by the engine at job start and threaded through every
//! stage call by mutable reference - no stage owns its own copy of shared
//! state, and nothing here is a global singleton (§9 redesign guidance).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use fleet_backup_domain::entities::{DbCredentials, ProgressUpdate};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::repositories::ProgressRepository;
use fleet_backup_domain::value_objects::{JobId, SiteId, StageGraph};

use crate::resource::ResourceGovernor;

/// Throttles progress writes to at most 4 Hz (§4.1), except the first and
/// last report of a stage, which always go through immediately.
const PROGRESS_THROTTLE: Duration = Duration::from_millis(250);

pub struct Context {
    pub job_id: JobId,
    pub site_id: SiteId,
    pub site_name: String,
    pub db_path_hint: Option<PathBuf>,
    /// Explicit credentials from the site record, when the operator supplied
    /// them; `dump_db` falls back to parsing `wp-config.php` when this is
    /// `None`.
    pub db_credentials: Option<DbCredentials>,
    pub wp_content_path: PathBuf,
    pub wp_config_path: PathBuf,
    pub temp_dir: PathBuf,
    pub archive_path: Option<PathBuf>,
    pub object_path: Option<String>,
    pub scratchpad: BTreeMap<String, String>,
    pub cancellation: CancellationToken,

    pub(crate) resource_governor: Arc<ResourceGovernor>,
    pub(crate) progress: Arc<dyn ProgressRepository>,
    pub(crate) graph: StageGraph,
    epoch: u64,
    last_report: Mutex<Option<Instant>>,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: JobId,
        site_id: SiteId,
        site_name: String,
        db_credentials: Option<DbCredentials>,
        wp_content_path: PathBuf,
        wp_config_path: PathBuf,
        temp_dir: PathBuf,
        resource_governor: Arc<ResourceGovernor>,
        progress: Arc<dyn ProgressRepository>,
        graph: StageGraph,
        epoch: u64,
    ) -> Self {
        Self {
            job_id,
            site_id,
            site_name,
            db_path_hint: None,
            db_credentials,
            wp_content_path,
            wp_config_path,
            temp_dir,
            archive_path: None,
            object_path: None,
            scratchpad: BTreeMap::new(),
            cancellation: CancellationToken::new(),
            resource_governor,
            progress,
            graph,
            epoch,
            last_report: Mutex::new(None),
        }
    }

    pub fn resource_governor(&self) -> &ResourceGovernor {
        &self.resource_governor
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Reports fractional progress within `stage_name` (§4.1 progress
    /// accounting: `sum(weights of finished stages) + stage_weight *
    /// fraction`). `force` bypasses the 4 Hz throttle for the first and
    /// last report of a stage.
    pub async fn report_progress(
        &self,
        stage_name: &str,
        fraction: f64,
        bytes_processed: u64,
        bytes_total: u64,
        force: bool,
    ) -> Result<(), BackupError> {
        if !force {
            let mut last = self.last_report.lock().await;
            if let Some(at) = *last {
                if at.elapsed() < PROGRESS_THROTTLE {
                    return Ok(());
                }
            }
            *last = Some(Instant::now());
        }

        let fraction = fraction.clamp(0.0, 1.0);
        let before = self.graph.weight_before(stage_name) as f64;
        let weight = self.graph.weight_of(stage_name).unwrap_or(0) as f64;
        let percent = (before + weight * fraction).round().clamp(0.0, 100.0) as u8;

        let update = ProgressUpdate {
            epoch: self.epoch,
            state: fleet_backup_domain::entities::ProgressState::Running,
            progress_percent: percent,
            stage: Some(stage_name.to_string()),
            message: None,
            bytes_processed,
            bytes_total,
            error: None,
        };
        self.progress.apply(self.site_id, update).await?;
        Ok(())
    }
}
