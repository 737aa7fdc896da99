// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Tagged-variant stage registry (§9 redesign guidance: "model as a tagged
//! variant with a registry; the engine looks up by tag at job start and
//! never again"). The registry is built once at daemon start from the
//! concrete stage implementations and handed to the engine per job.

use std::collections::HashMap;
use std::sync::Arc;

use super::stage::Stage;

#[derive(Default)]
pub struct StageRegistry {
    stages: HashMap<&'static str, Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, stage: Arc<dyn Stage>) -> &mut Self {
        self.stages.insert(stage.name(), stage);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(name).cloned()
    }
}
