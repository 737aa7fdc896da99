// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Fleet Backup Engine
//!
//! Shared infrastructure used by both `fleet-backup-node` (running the
//! pipeline against real sites) and `fleet-backup-master` (running the same
//! engine embedded, per §9's resolution of the daemon-queue /
//! background-task overlap - one engine, one queue, regardless of which
//! process drives it): the stage contract and registry, the pipeline
//! engine, the resource governor, and the object-store adapters.

pub mod object_store;
pub mod pipeline;
pub mod resource;

pub use pipeline::{Context, JobOutcome, PipelineEngine, Stage, StageRegistry, StageResult, StageStatus};
pub use resource::{ResourceConfig, ResourceGovernor};
