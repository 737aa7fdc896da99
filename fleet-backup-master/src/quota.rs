// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Quota pre-flight and post-flight accounting (§4.5). Pre-flight is a pure
//! projection with no side effects, so a Node can ask "would this fit"
//! before it spends any bandwidth. Post-flight is the only place that ever
//! writes `storage_used_bytes`, and it always recomputes from the ground
//! truth (`BackupRepository::sum_usage_for_site`) rather than incrementing a
//! running counter, so a missed update can never drift permanently.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use fleet_backup_domain::entities::{Backup, Node, Site};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::repositories::{BackupRepository, NodeRepository, SiteRepository};
use fleet_backup_domain::value_objects::{ByteSize, SiteId};

/// Mirrors the Node's own `QuotaCheck` wire struct field-for-field; Master
/// and Node are separate crates so this isn't a shared type, just the same
/// shape serialized the same way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaCheck {
    pub can_proceed: bool,
    pub projected_site_used_bytes: u64,
    pub projected_node_used_bytes: u64,
    pub exceeds: Option<String>,
}

/// Pure pre-flight projection (§4.5 formula): projects what site and node
/// usage would become if a backup of `estimated_bytes` succeeded right now,
/// without mutating anything.
pub fn pre_flight_check(node: &Node, site: &Site, estimated_bytes: u64) -> QuotaCheck {
    let projected_site_used = site.storage_used_bytes.bytes().saturating_add(estimated_bytes);
    let projected_node_used = node
        .storage_used_bytes
        .bytes()
        .saturating_sub(site.storage_used_bytes.bytes())
        .saturating_add(projected_site_used);

    let site_within_quota = projected_site_used <= site.storage_quota_bytes.bytes();
    let node_within_quota = projected_node_used <= node.storage_quota_bytes.bytes();

    let exceeds = if !site_within_quota {
        Some("site".to_string())
    } else if !node_within_quota {
        Some("node".to_string())
    } else {
        None
    };

    QuotaCheck {
        can_proceed: site_within_quota && node_within_quota,
        projected_site_used_bytes: projected_site_used,
        projected_node_used_bytes: projected_node_used,
        exceeds,
    }
}

pub struct QuotaLedger {
    backups: Arc<dyn BackupRepository>,
    sites: Arc<dyn SiteRepository>,
    nodes: Arc<dyn NodeRepository>,
    retention_grace: Duration,
}

impl QuotaLedger {
    pub fn new(
        backups: Arc<dyn BackupRepository>,
        sites: Arc<dyn SiteRepository>,
        nodes: Arc<dyn NodeRepository>,
        retention_grace: Duration,
    ) -> Self {
        Self { backups, sites, nodes, retention_grace }
    }

    /// Post-flight accounting (§4.5 steps 1-5): persists the finished
    /// backup, recomputes the owning site's and node's used-bytes from the
    /// backup table, refreshes the site's quota-exceeded flag, and schedules
    /// deletion for whatever now falls outside the site's retention window.
    pub async fn record_successful_backup(&self, mut backup: Backup, object_path: String, size_bytes: ByteSize) -> Result<(), BackupError> {
        backup.mark_success(object_path, size_bytes)?;
        self.backups.insert(&backup).await?;
        self.recompute_usage(backup.site_id).await?;
        self.apply_retention(backup.site_id).await?;
        Ok(())
    }

    pub async fn record_failed_backup(&self, mut backup: Backup) -> Result<(), BackupError> {
        backup.mark_failed();
        self.backups.insert(&backup).await?;
        Ok(())
    }

    /// Recomputes `storage_used_bytes` for a site and its owning node from
    /// the backup table, never from an incremental counter.
    pub async fn recompute_usage(&self, site_id: SiteId) -> Result<(), BackupError> {
        let mut site = self
            .sites
            .find_by_id(site_id)
            .await?
            .ok_or_else(|| BackupError::not_found(format!("site {site_id} not found during quota accounting")))?;

        let used = self.backups.sum_usage_for_site(site_id).await?;
        site.set_storage_used(used, Utc::now());
        self.sites.update(&site).await?;

        let mut node = self
            .nodes
            .find_by_id(site.node_id)
            .await?
            .ok_or_else(|| BackupError::not_found(format!("node {} not found during quota accounting", site.node_id)))?;

        let mut node_total = 0u64;
        for owned_site in self.sites.list_for_node(node.id).await? {
            node_total = node_total.saturating_add(owned_site.storage_used_bytes.bytes());
        }
        node.storage_used_bytes = ByteSize::from_bytes(node_total);
        self.nodes.update(&node).await?;

        Ok(())
    }

    /// Marks backups beyond `schedule.retention_copies` for deletion once
    /// the retention grace period has elapsed, keeping the most recent
    /// successful copies untouched (§4.5 retention).
    async fn apply_retention(&self, site_id: SiteId) -> Result<(), BackupError> {
        let site = self
            .sites
            .find_by_id(site_id)
            .await?
            .ok_or_else(|| BackupError::not_found(format!("site {site_id} not found during retention sweep")))?;

        let mut successful: Vec<Backup> = self
            .backups
            .list_for_site(site_id)
            .await?
            .into_iter()
            .filter(|b| b.contributes_to_usage())
            .collect();
        successful.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let keep = site.schedule.retention_copies as usize;
        let deletion_at: DateTime<Utc> = Utc::now() + self.retention_grace;

        for stale in successful.into_iter().skip(keep) {
            if stale.scheduled_deletion.is_none() {
                let mut stale = stale;
                stale.schedule_deletion(deletion_at);
                self.backups.update(&stale).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_backup_domain::value_objects::{NodeId, StorageProviderId};

    fn node_with_usage(quota: u64, used: u64) -> Node {
        let mut node = Node::new_pending("api1".into(), "10.0.0.1".into(), "XK7M2".into());
        node.storage_quota_bytes = ByteSize::from_bytes(quota);
        node.storage_used_bytes = ByteSize::from_bytes(used);
        node
    }

    fn site_with_usage(node_id: NodeId, quota: u64, used: u64) -> Site {
        Site {
            id: SiteId::new(),
            node_id,
            name: "example".into(),
            wp_config_path: "/wp-config.php".into(),
            wp_content_path: "/wp-content".into(),
            db_credentials: None,
            storage_quota_bytes: ByteSize::from_bytes(quota),
            storage_used_bytes: ByteSize::from_bytes(used),
            quota_exceeded_at: None,
            schedule: Default::default(),
            next_run_at: None,
            last_backup_size_bytes: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn allows_a_backup_that_fits_within_both_quotas() {
        let node = node_with_usage(ByteSize::gib(100).bytes(), ByteSize::gib(20).bytes());
        let site = site_with_usage(node.id, ByteSize::gib(30).bytes(), ByteSize::gib(10).bytes());
        let check = pre_flight_check(&node, &site, ByteSize::gib(5).bytes());
        assert!(check.can_proceed);
        assert!(check.exceeds.is_none());
    }

    #[test]
    fn denies_when_the_site_quota_alone_would_be_exceeded() {
        let node = node_with_usage(ByteSize::gib(100).bytes(), ByteSize::gib(20).bytes());
        let site = site_with_usage(node.id, ByteSize::gib(10).bytes(), ByteSize::gib(9).bytes());
        let check = pre_flight_check(&node, &site, ByteSize::gib(5).bytes());
        assert!(!check.can_proceed);
        assert_eq!(check.exceeds.as_deref(), Some("site"));
    }

    #[test]
    fn denies_when_only_the_node_aggregate_would_be_exceeded() {
        let node = node_with_usage(ByteSize::gib(50).bytes(), ByteSize::gib(48).bytes());
        let site = site_with_usage(node.id, ByteSize::gib(100).bytes(), ByteSize::gib(1).bytes());
        let check = pre_flight_check(&node, &site, ByteSize::gib(5).bytes());
        assert!(!check.can_proceed);
        assert_eq!(check.exceeds.as_deref(), Some("node"));
    }
}
