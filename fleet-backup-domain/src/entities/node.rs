// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Node entity (§3). A Node's lifecycle is PENDING -> ACTIVE -> {BLOCKED,
//! INACTIVE}; the registration code and the API key hash are mutually
//! exclusive in time (the code is cleared the instant the key is retrieved).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BackupError;
use crate::value_objects::{ByteSize, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Active,
    Blocked,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub hostname: String,
    pub last_known_address: String,
    pub status: NodeStatus,
    /// 5-char base-32 code, present only while PENDING.
    pub registration_code: Option<String>,
    /// Salted hash of the API key; present iff `status == Active`.
    pub api_key_hash: Option<String>,
    pub storage_quota_bytes: ByteSize,
    pub storage_used_bytes: ByteSize,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// In-flight uploads may briefly push usage past quota before the upload
/// stage's pre-flight check would have refused a *new* job; this tolerance
/// only softens the invariant check below, it never changes pre-flight math.
pub const QUOTA_TOLERANCE: ByteSize = ByteSize::from_bytes(64 * 1024 * 1024);

impl Node {
    pub fn new_pending(hostname: String, address: String, registration_code: String) -> Self {
        Self {
            id: NodeId::new(),
            hostname,
            last_known_address: address,
            status: NodeStatus::Pending,
            registration_code: Some(registration_code),
            api_key_hash: None,
            storage_quota_bytes: ByteSize::ZERO,
            storage_used_bytes: ByteSize::ZERO,
            created_at: Utc::now(),
            last_seen_at: None,
        }
    }

    /// Approves a PENDING node: clears the registration code and installs
    /// the hashed key atomically with the status flip (§4.4 step 3).
    pub fn approve(&mut self, api_key_hash: String) -> Result<(), BackupError> {
        if self.status != NodeStatus::Pending {
            return Err(BackupError::conflict(format!(
                "node {} is not pending approval (status={:?})",
                self.id, self.status
            )));
        }
        self.status = NodeStatus::Active;
        self.registration_code = None;
        self.api_key_hash = Some(api_key_hash);
        Ok(())
    }

    /// Invariant 4 (§8): an approved node has exactly one non-null key hash
    /// and no registration code.
    pub fn check_invariants(&self) -> Result<(), BackupError> {
        match self.status {
            NodeStatus::Active => {
                if self.api_key_hash.is_none() || self.registration_code.is_some() {
                    return Err(BackupError::integrity(format!(
                        "active node {} must have exactly one key hash and no registration code",
                        self.id
                    )));
                }
            }
            NodeStatus::Pending => {
                if self.api_key_hash.is_some() {
                    return Err(BackupError::integrity(format!("pending node {} must not have a key hash", self.id)));
                }
            }
            NodeStatus::Blocked | NodeStatus::Inactive => {}
        }
        if self.storage_used_bytes > self.storage_quota_bytes + QUOTA_TOLERANCE {
            return Err(BackupError::integrity(format!(
                "node {} storage_used_bytes exceeds quota beyond tolerance",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approving_clears_code_and_sets_hash() {
        let mut node = Node::new_pending("api1".into(), "1.2.3.4".into(), "XK7M2".into());
        node.approve("hashed".into()).unwrap();
        assert_eq!(node.status, NodeStatus::Active);
        assert!(node.registration_code.is_none());
        assert_eq!(node.api_key_hash.as_deref(), Some("hashed"));
        node.check_invariants().unwrap();
    }

    #[test]
    fn approving_twice_conflicts() {
        let mut node = Node::new_pending("api1".into(), "1.2.3.4".into(), "XK7M2".into());
        node.approve("hashed".into()).unwrap();
        assert!(matches!(node.approve("again".into()), Err(BackupError::Conflict(_))));
    }
}
