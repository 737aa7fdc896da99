// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

pub mod byte_size;
pub mod ids;
pub mod opaque_id;
pub mod schedule;
pub mod stage_graph;

pub use byte_size::ByteSize;
pub use ids::{BackupId, JobId, NodeId, SiteId, StorageProviderId, UserId};
pub use schedule::{Frequency, Schedule};
pub use stage_graph::{StageGraph, StageSpec};
