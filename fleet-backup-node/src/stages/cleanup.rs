// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `cleanup` (§4.1): removes the temp directory. Runs unconditionally -
//! on OK, FAILED, or cancellation, including when a prior stage threw.
//! Its own failures are logged but never override the pipeline outcome.

use std::time::Instant;

use async_trait::async_trait;

use fleet_backup_engine::{Context, Stage, StageResult};

pub struct CleanupStage;

#[async_trait]
impl Stage for CleanupStage {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    async fn run(&self, ctx: &mut Context) -> StageResult {
        let start = Instant::now();
        match tokio::fs::remove_dir_all(&ctx.temp_dir).await {
            Ok(()) => StageResult::ok("temp directory removed", start.elapsed()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StageResult::ok("nothing to clean up", start.elapsed()),
            Err(err) => {
                tracing::warn!(temp_dir = %ctx.temp_dir.display(), error = %err, "cleanup failed to remove temp directory");
                StageResult::failed(format!("cleanup failed: {err}"), start.elapsed())
            }
        }
    }
}
