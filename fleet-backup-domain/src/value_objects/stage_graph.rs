// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Graph
//!
//! The WordPress backup module's stage graph is fixed metadata: an ordered
//! list of stage names, a progress weight per stage, and an always-run flag
//! for cleanup (§4.1). Per §9's redesign guidance ("many small dispatchers
//! over abstract bases... model as a tagged variant with a registry"), this
//! is data the engine looks up once at job start, not a trait object per
//! stage - today there is exactly one module (`wordpress`), but a second
//! module would add a row here rather than a new engine code path.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    pub name: &'static str,
    pub weight: u8,
    pub always_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageGraph {
    pub module: &'static str,
    pub stages: Vec<StageSpec>,
}

impl StageGraph {
    /// The one module specified: dump_db -> copy_files -> bundle -> upload
    /// -> cleanup, weights summing to 100, cleanup always-run.
    pub fn wordpress() -> Self {
        Self {
            module: "wordpress",
            stages: vec![
                StageSpec {
                    name: "dump_db",
                    weight: 20,
                    always_run: false,
                },
                StageSpec {
                    name: "copy_files",
                    weight: 20,
                    always_run: false,
                },
                StageSpec {
                    name: "bundle",
                    weight: 20,
                    always_run: false,
                },
                StageSpec {
                    name: "upload",
                    weight: 30,
                    always_run: false,
                },
                StageSpec {
                    name: "cleanup",
                    weight: 10,
                    always_run: true,
                },
            ],
        }
    }

    pub fn total_weight(&self) -> u32 {
        self.stages.iter().map(|s| s.weight as u32).sum()
    }

    /// Sum of weights for stages before `stage_name` (exclusive).
    pub fn weight_before(&self, stage_name: &str) -> u32 {
        self.stages
            .iter()
            .take_while(|s| s.name != stage_name)
            .map(|s| s.weight as u32)
            .sum()
    }

    pub fn weight_of(&self, stage_name: &str) -> Option<u32> {
        self.stages.iter().find(|s| s.name == stage_name).map(|s| s.weight as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wordpress_weights_sum_to_100() {
        assert_eq!(StageGraph::wordpress().total_weight(), 100);
    }

    #[test]
    fn cleanup_is_always_run() {
        let graph = StageGraph::wordpress();
        let cleanup = graph.stages.last().unwrap();
        assert_eq!(cleanup.name, "cleanup");
        assert!(cleanup.always_run);
    }

    #[test]
    fn weight_before_upload_is_60() {
        assert_eq!(StageGraph::wordpress().weight_before("upload"), 60);
    }
}
