// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Crash recovery (§4.1): on Node restart, any progress row still RUNNING
//! past `crash_recovery_grace_secs` is moved to FAILED("abandoned"), and
//! any temp directory left under the Node's temp root is swept.

use std::path::Path;
use std::time::Duration;

use chrono::Utc;

use fleet_backup_domain::entities::{ProgressState, ProgressUpdate};
use fleet_backup_domain::repositories::ProgressRepository;
use fleet_backup_domain::value_objects::SiteId;

/// Reconciles one site's progress row against the crash-recovery grace
/// period. Intentionally narrow: the Node only knows about the sites in
/// its own local configuration, so the caller iterates that list.
pub async fn reconcile_site(progress: &dyn ProgressRepository, site_id: SiteId, grace: Duration) {
    let row = match progress.get(site_id).await {
        Ok(row) => row,
        Err(err) => {
            tracing::error!(site_id = %site_id, error = %err, "failed to read progress row during crash recovery");
            return;
        }
    };

    if row.state != ProgressState::Running {
        return;
    }

    let started_at = match row.started_at {
        Some(started_at) => started_at,
        None => return,
    };

    let age = Utc::now().signed_duration_since(started_at);
    if age < chrono::Duration::from_std(grace).unwrap_or(chrono::Duration::zero()) {
        return;
    }

    tracing::warn!(site_id = %site_id, "abandoning stale RUNNING progress row from before restart");
    let update = ProgressUpdate {
        epoch: row.epoch,
        state: ProgressState::Failed,
        progress_percent: row.progress_percent,
        stage: row.stage.clone(),
        message: Some("abandoned".to_string()),
        bytes_processed: row.bytes_processed,
        bytes_total: row.bytes_total,
        error: Some("abandoned".to_string()),
    };
    if let Err(err) = progress.apply(site_id, update).await {
        tracing::error!(site_id = %site_id, error = %err, "failed to mark abandoned progress row");
    }
}

/// Sweeps every entry directly under `temp_root`, per §6.4 ("swept on
/// daemon start"). Jobs always run inside `temp_root/<job_id>/`, so this is
/// safe even while the daemon is not yet accepting new jobs.
pub async fn sweep_temp_root(temp_root: &Path) {
    let mut entries = match tokio::fs::read_dir(temp_root).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
        Err(err) => {
            tracing::error!(temp_root = %temp_root.display(), error = %err, "failed to read temp root for sweep");
            return;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let result = if path.is_dir() {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        if let Err(err) = result {
            tracing::error!(path = %path.display(), error = %err, "failed to sweep leftover temp entry");
        }
    }
}
