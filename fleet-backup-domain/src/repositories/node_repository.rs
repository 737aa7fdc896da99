// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Persistence port for `Node` (§3, §4.4).

use async_trait::async_trait;

use crate::entities::Node;
use crate::error::BackupError;
use crate::value_objects::NodeId;

#[async_trait]
pub trait NodeRepository: Send + Sync {
    async fn insert(&self, node: &Node) -> Result<(), BackupError>;

    async fn find_by_id(&self, id: NodeId) -> Result<Option<Node>, BackupError>;

    /// Looks up a still-PENDING node by its registration code (§4.4 step 2).
    async fn find_by_registration_code(&self, code: &str) -> Result<Option<Node>, BackupError>;

    async fn find_by_api_key_hash(&self, hash: &str) -> Result<Option<Node>, BackupError>;

    async fn list_all(&self) -> Result<Vec<Node>, BackupError>;

    /// Replaces the full row; callers are responsible for the entity's own
    /// invariant checks (`Node::check_invariants`) before calling this.
    async fn update(&self, node: &Node) -> Result<(), BackupError>;

    async fn delete(&self, id: NodeId) -> Result<(), BackupError>;
}
