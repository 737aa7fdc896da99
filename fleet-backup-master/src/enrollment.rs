// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Node enrollment (§4.4): a new Node requests a registration code, an
//! operator approves it out of band, and the Node's status poll eventually
//! observes ACTIVE and receives its API key exactly once. The join-request
//! and status-poll endpoints are unauthenticated by necessity, so this
//! module also carries the per-address rate limiter that keeps them from
//! being trivially hammered.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;

use fleet_backup_domain::entities::{Node, NodeStatus};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::repositories::NodeRepository;
use fleet_backup_domain::value_objects::NodeId;

use crate::auth::api_key::{generate_api_key, hash_api_key};

const REGISTRATION_CODE_LEN: usize = 5;
/// Crockford base-32 minus easily-confused characters (no I, L, O, U).
const REGISTRATION_CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

pub fn generate_registration_code() -> String {
    let mut rng = rand::rng();
    (0..REGISTRATION_CODE_LEN)
        .map(|_| {
            let idx = rng.random_range(0..REGISTRATION_CODE_ALPHABET.len());
            REGISTRATION_CODE_ALPHABET[idx] as char
        })
        .collect()
}

pub struct EnrollmentService {
    nodes: std::sync::Arc<dyn NodeRepository>,
    /// Remembers which node a registration code was issued for, since
    /// `Node::approve` clears the code from the row itself the moment the
    /// node goes ACTIVE (an active node carries no registration code by
    /// invariant) - without this, a poll arriving just after approval would
    /// have no way to resolve the code to a node any more.
    code_registry: Mutex<HashMap<String, NodeId>>,
    /// Holds the plaintext API key exactly until the first status poll that
    /// observes ACTIVE retrieves it; taken out of the map on read so a
    /// second poll (or a replay) never sees it again.
    pending_keys: Mutex<HashMap<NodeId, String>>,
}

pub struct ApprovalResult {
    pub node_id: NodeId,
    pub api_key: String,
}

/// `poll_status`'s view of a node: the node itself, plus the plaintext key
/// if this is the first observation of ACTIVE since approval.
pub struct StatusPoll {
    pub node: Node,
    pub api_key: Option<String>,
}

impl EnrollmentService {
    pub fn new(nodes: std::sync::Arc<dyn NodeRepository>) -> Self {
        Self { nodes, code_registry: Mutex::new(HashMap::new()), pending_keys: Mutex::new(HashMap::new()) }
    }

    /// Handles `POST /nodes/join-request`: always creates a new pending
    /// node and code, even if this hostname has requested one before - a
    /// stale abandoned request is simply superseded by a fresh one.
    pub async fn join_request(&self, hostname: String, address: String) -> Result<Node, BackupError> {
        let code = generate_registration_code();
        let node = Node::new_pending(hostname, address, code.clone());
        self.nodes.insert(&node).await?;
        self.code_registry.lock().expect("enrollment code registry mutex poisoned").insert(code, node.id);
        Ok(node)
    }

    /// Handles `GET /nodes/status/code/{code}`: resolves the code through
    /// the in-memory registry first (not the node row, which may have
    /// already cleared it), falling back to the durable
    /// `registration_code` column when the registry has no entry - a
    /// Master restart between `join_request` and `approve` loses the
    /// in-memory mapping, but the still-pending node row carries the code
    /// itself, so a poll after restart still resolves instead of looking
    /// like an unknown code.
    pub async fn poll_status(&self, code: &str) -> Result<Option<StatusPoll>, BackupError> {
        let registered = self.code_registry.lock().expect("enrollment code registry mutex poisoned").get(code).copied();

        let node = match registered {
            Some(node_id) => match self.nodes.find_by_id(node_id).await? {
                Some(node) => node,
                None => return Ok(None),
            },
            None => match self.nodes.find_by_registration_code(code).await? {
                Some(node) => node,
                None => return Ok(None),
            },
        };
        let node_id = node.id;

        let api_key = self.pending_keys.lock().expect("enrollment pending-keys mutex poisoned").remove(&node_id);
        Ok(Some(StatusPoll { node, api_key }))
    }

    /// Approves a pending node: generates a fresh API key, hashes it, and
    /// flips the node to ACTIVE. Returns the plaintext key so the caller
    /// (the admin CLI) can display it immediately; it is also stashed for
    /// the Node's own next status poll to pick up exactly once.
    pub async fn approve(&self, node_id: NodeId) -> Result<ApprovalResult, BackupError> {
        let mut node = self
            .nodes
            .find_by_id(node_id)
            .await?
            .ok_or_else(|| BackupError::not_found(format!("node {node_id} not found")))?;

        if node.status != NodeStatus::Pending {
            return Err(BackupError::conflict(format!("node {node_id} is not pending approval")));
        }

        let api_key = generate_api_key();
        let hashed = hash_api_key(&api_key)?;
        node.approve(hashed)?;
        self.nodes.update(&node).await?;
        self.pending_keys
            .lock()
            .expect("enrollment pending-keys mutex poisoned")
            .insert(node_id, api_key.clone());

        Ok(ApprovalResult { node_id, api_key })
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// A small per-address token bucket guarding the unauthenticated join and
/// status-poll endpoints against brute-force enumeration of registration
/// codes. Refills continuously rather than on a fixed tick, matching the
/// resource governor's own bandwidth-throttle style.
pub struct JoinRateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    capacity: f64,
    refill_per_sec: f64,
}

impl JoinRateLimiter {
    pub fn new(requests_per_minute: u32) -> Self {
        let capacity = requests_per_minute.max(1) as f64;
        Self {
            buckets: Mutex::new(HashMap::new()),
            capacity,
            refill_per_sec: capacity / 60.0,
        }
    }

    /// Returns `true` if `address` may proceed, consuming one token.
    pub fn check(&self, address: &str) -> bool {
        let mut buckets = self.buckets.lock().expect("join rate limiter mutex poisoned");
        let now = Instant::now();
        let bucket = buckets.entry(address.to_string()).or_insert_with(|| Bucket { tokens: self.capacity, last_refill: now });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl Default for JoinRateLimiter {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::SqliteNodeRepository;
    use crate::schema::initialize_database;

    async fn service() -> EnrollmentService {
        let pool = initialize_database(":memory:").await.unwrap();
        EnrollmentService::new(std::sync::Arc::new(SqliteNodeRepository::new(pool)))
    }

    #[test]
    fn registration_codes_use_only_the_unambiguous_alphabet() {
        let code = generate_registration_code();
        assert_eq!(code.len(), REGISTRATION_CODE_LEN);
        assert!(code.bytes().all(|b| REGISTRATION_CODE_ALPHABET.contains(&b)));
    }

    #[tokio::test]
    async fn join_request_then_approve_yields_a_verifiable_key() {
        let service = service().await;
        let node = service.join_request("api1".into(), "10.0.0.1".into()).await.unwrap();
        assert_eq!(node.status, NodeStatus::Pending);
        let code = node.registration_code.clone().unwrap();

        let approval = service.approve(node.id).await.unwrap();
        assert!(!approval.api_key.is_empty());

        // The code still resolves the node through the in-memory registry,
        // even though `Node::approve` already cleared it from the row - and
        // the first poll after approval carries the plaintext key exactly once.
        let first = service.poll_status(&code).await.unwrap().unwrap();
        assert_eq!(first.node.status, NodeStatus::Active);
        assert_eq!(first.api_key.as_deref(), Some(approval.api_key.as_str()));

        let second = service.poll_status(&code).await.unwrap().unwrap();
        assert!(second.api_key.is_none());
    }

    #[tokio::test]
    async fn approving_twice_is_rejected() {
        let service = service().await;
        let node = service.join_request("api1".into(), "10.0.0.1".into()).await.unwrap();
        service.approve(node.id).await.unwrap();
        assert!(service.approve(node.id).await.is_err());
    }

    #[test]
    fn rate_limiter_denies_once_the_bucket_is_empty() {
        let limiter = JoinRateLimiter::new(2);
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.1"));
        assert!(!limiter.check("10.0.0.1"));
    }

    #[test]
    fn rate_limiter_tracks_addresses_independently() {
        let limiter = JoinRateLimiter::new(1);
        assert!(limiter.check("10.0.0.1"));
        assert!(limiter.check("10.0.0.2"));
    }
}
