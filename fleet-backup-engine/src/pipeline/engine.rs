// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The engine itself: runs a job's stages sequentially against a
//! `Context`, decides the job's terminal state from each `StageResult`, and
//! guarantees `cleanup` always runs (§4.1 state machine).

use std::time::Instant;

use fleet_backup_domain::entities::{ProgressState, ProgressUpdate};
use fleet_backup_domain::error::BackupError;

use super::context::Context;
use super::registry::StageRegistry;
use super::stage::{StageResult, StageStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
    Stopped,
}

pub struct PipelineEngine;

impl PipelineEngine {
    pub fn new() -> Self {
        Self
    }

    /// Runs every stage in `ctx.graph` in order. Stages after the first
    /// failure or cancellation are skipped, except those with
    /// `always_run = true` (cleanup), which run regardless.
    pub async fn run(
        &self,
        ctx: &mut Context,
        registry: &StageRegistry,
    ) -> Result<(JobOutcome, Vec<(&'static str, StageResult)>), BackupError> {
        let stages = ctx.graph.stages.clone();
        let mut results = Vec::with_capacity(stages.len());
        let mut failed: Option<String> = None;
        let mut stopped = false;

        for spec in &stages {
            if !spec.always_run && (failed.is_some() || stopped) {
                results.push((spec.name, StageResult::skipped("skipped after prior failure or cancellation")));
                continue;
            }

            if !spec.always_run && ctx.is_cancelled() {
                stopped = true;
                results.push((spec.name, StageResult::skipped("cancelled before stage start")));
                continue;
            }

            let Some(stage) = registry.get(spec.name) else {
                let msg = format!("no stage registered for '{}'", spec.name);
                tracing::error!(stage = spec.name, "{msg}");
                let result = StageResult::failed(msg.clone(), std::time::Duration::ZERO);
                if !spec.always_run && failed.is_none() {
                    failed = Some(msg);
                }
                results.push((spec.name, result));
                continue;
            };

            let started = Instant::now();
            tracing::info!(stage = spec.name, job_id = %ctx.job_id, "stage starting");
            let result = stage.run(ctx).await;
            tracing::info!(
                stage = spec.name,
                job_id = %ctx.job_id,
                status = ?result.status,
                elapsed = ?started.elapsed(),
                "stage finished"
            );

            match result.status {
                StageStatus::Failed if result.message == "stopped" => stopped = true,
                // An always-run stage (cleanup) never overrides a job that
                // otherwise completed (§4.1: "failures here are logged but
                // do not override the pipeline's outcome").
                StageStatus::Failed if !spec.always_run && failed.is_none() => failed = Some(result.message.clone()),
                _ => {}
            }
            results.push((spec.name, result));
        }

        let final_state = if stopped {
            ProgressState::Stopped
        } else if failed.is_some() {
            ProgressState::Failed
        } else {
            ProgressState::Completed
        };

        let mut current = ctx.progress.get(ctx.site_id).await?;
        if final_state == ProgressState::Completed {
            current.progress_percent = 100;
        }
        let update = ProgressUpdate {
            epoch: ctx.epoch(),
            state: final_state,
            progress_percent: current.progress_percent,
            stage: current.stage.clone(),
            message: None,
            bytes_processed: current.bytes_processed,
            bytes_total: current.bytes_total,
            error: failed.clone(),
        };
        ctx.progress.apply(ctx.site_id, update).await?;

        let outcome = match final_state {
            ProgressState::Completed => JobOutcome::Completed,
            ProgressState::Failed => JobOutcome::Failed(failed.unwrap_or_else(|| "unknown failure".into())),
            ProgressState::Stopped => JobOutcome::Stopped,
            ProgressState::Idle | ProgressState::Running => unreachable!("terminal state computed above"),
        };
        Ok((outcome, results))
    }
}

impl Default for PipelineEngine {
    fn default() -> Self {
        Self::new()
    }
}
