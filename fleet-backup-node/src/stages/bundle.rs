// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `bundle` (§4.1): tars `database.sql`, `wp-config.php`, and `wp-content/`
//! into `temp/{site_name}_{YYYYMMDD}_{HHMMSS}.tar.zst`. The zstd compressor
//! runs multithreaded up to the governor's CPU worker bound.

use std::fs::File;
use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;

use fleet_backup_domain::error::BackupError;
use fleet_backup_engine::{Context, Stage, StageResult};

pub struct BundleStage;

fn build_archive(temp_dir: PathBuf, dest: PathBuf, wp_config_path: PathBuf, cpu_workers: u32) -> Result<u64, BackupError> {
    let file = File::create(&dest).map_err(|err| BackupError::fatal(format!("cannot create archive: {err}")))?;
    let mut encoder = zstd::Encoder::new(file, 3).map_err(|err| BackupError::fatal(format!("cannot init zstd encoder: {err}")))?;
    encoder
        .multithread(cpu_workers)
        .map_err(|err| BackupError::internal(format!("zstd multithread setup failed: {err}")))?;

    {
        let mut tar = tar::Builder::new(&mut encoder);

        let db_path = temp_dir.join("database.sql");
        if db_path.exists() {
            tar.append_path_with_name(&db_path, "database.sql")
                .map_err(|err| BackupError::fatal(format!("failed to append database.sql: {err}")))?;
        }
        if wp_config_path.exists() {
            tar.append_path_with_name(&wp_config_path, "wp-config.php")
                .map_err(|err| BackupError::fatal(format!("failed to append wp-config.php: {err}")))?;
        }
        let wp_content = temp_dir.join("wp-content");
        if wp_content.exists() {
            tar.append_dir_all("wp-content", &wp_content)
                .map_err(|err| BackupError::fatal(format!("failed to append wp-content: {err}")))?;
        }
        tar.finish().map_err(|err| BackupError::fatal(format!("failed to finalize tar: {err}")))?;
    }

    encoder.finish().map_err(|err| BackupError::fatal(format!("failed to finalize zstd stream: {err}")))?;
    let size = std::fs::metadata(&dest).map_err(|err| BackupError::fatal(format!("cannot stat archive: {err}")))?.len();
    Ok(size)
}

#[async_trait]
impl Stage for BundleStage {
    fn name(&self) -> &'static str {
        "bundle"
    }

    async fn run(&self, ctx: &mut Context) -> StageResult {
        let start = Instant::now();

        if ctx.is_cancelled() {
            return StageResult::stopped(start.elapsed());
        }

        let permit = match ctx.resource_governor().acquire_cpu(&ctx.cancellation).await {
            Ok(permit) => permit,
            Err(err) => return StageResult::failed(err.to_string(), start.elapsed()),
        };

        let now = Utc::now();
        let filename = format!("{}_{}.tar.zst", ctx.site_name, now.format("%Y%m%d_%H%M%S"));
        let dest = ctx.temp_dir.join(&filename);
        let cpu_workers = ctx.resource_governor().cpu_worker_count();

        let temp_dir = ctx.temp_dir.clone();
        let wp_config_path = ctx.wp_config_path.clone();
        let dest_for_task = dest.clone();
        let result = tokio::task::spawn_blocking(move || build_archive(temp_dir, dest_for_task, wp_config_path, cpu_workers)).await;
        drop(permit);

        let size = match result {
            Ok(Ok(size)) => size,
            Ok(Err(err)) => return StageResult::failed(err.to_string(), start.elapsed()),
            Err(join_err) => return StageResult::failed(format!("bundle task panicked: {join_err}"), start.elapsed()),
        };

        ctx.archive_path = Some(dest);
        if let Err(err) = ctx.report_progress(self.name(), 1.0, size, size, true).await {
            tracing::warn!(error = %err, "failed to report bundle progress");
        }

        StageResult::ok("archive bundled", start.elapsed()).with_detail("archive_bytes", size.to_string())
    }
}
