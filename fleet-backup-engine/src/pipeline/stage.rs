// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The Stage contract (§4.1). A stage is a pure function over the shared
//! `Context`; it never throws - it returns a `StageResult` and the engine
//! alone decides whether to continue, fail the job, or route to cleanup.

use std::time::Duration;

use async_trait::async_trait;

use super::context::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Ok,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct StageResult {
    pub status: StageStatus,
    pub message: String,
    pub details: Vec<(String, String)>,
    pub duration: Duration,
}

impl StageResult {
    pub fn ok(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            status: StageStatus::Ok,
            message: message.into(),
            details: Vec::new(),
            duration,
        }
    }

    pub fn failed(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            status: StageStatus::Failed,
            message: message.into(),
            details: Vec::new(),
            duration,
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Skipped,
            message: message.into(),
            details: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn stopped(duration: Duration) -> Self {
        Self {
            status: StageStatus::Failed,
            message: "stopped".into(),
            details: Vec::new(),
            duration,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((key.into(), value.into()));
        self
    }
}

/// One step of the stage graph. Implementations live in `fleet-backup-node`
/// (`dump_db`, `copy_files`, `bundle`, `upload`, `cleanup`); this crate only
/// defines the contract and the generic registry/engine that drive it.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Must match one of `StageSpec::name` in the `StageGraph` the engine
    /// was given - the registry looks stages up by this name.
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &mut Context) -> StageResult;
}
