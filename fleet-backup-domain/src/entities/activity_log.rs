// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Append-only activity log (§3), capped at 100 entries per user. The cap
//! is enforced by the repository adapter (a trimming delete after insert);
//! this module only models the entry shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value_objects::UserId;

/// Entries kept per actor before the oldest are trimmed (§3).
pub const ACTIVITY_LOG_RETENTION: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub actor: UserId,
    pub action: String,
    pub target: String,
    pub source_address: String,
    pub user_agent: String,
    pub timestamp: DateTime<Utc>,
    pub detail: BTreeMap<String, serde_json::Value>,
}

impl ActivityLogEntry {
    pub fn new(actor: UserId, action: impl Into<String>, target: impl Into<String>, source_address: impl Into<String>) -> Self {
        Self {
            actor,
            action: action.into(),
            target: target.into(),
            source_address: source_address.into(),
            user_agent: String::new(),
            timestamp: Utc::now(),
            detail: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.detail.insert(key.into(), value.into());
        self
    }
}
