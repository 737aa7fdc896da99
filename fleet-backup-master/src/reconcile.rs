// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Drift reconciliation (§4.5 step 5, §6.5 object layout): compares what the
//! object store actually holds for a site against what the backup table
//! records. Orphan objects (present in the store, absent or unreferenced in
//! the table) are reported, never deleted automatically - only an operator
//! acting through the admin CLI removes data outright. Rows whose object is
//! missing are marked `Failed` and excluded from usage accounting. When the
//! drift between recomputed and recorded usage exceeds `drift_threshold`,
//! the site's `storage_used_bytes` is corrected from the store's own totals.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use fleet_backup_domain::entities::{Backup, BackupStatus, Site};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::repositories::{BackupRepository, NodeRepository, SiteRepository};
use fleet_backup_domain::services::object_store::ObjectStore;
use fleet_backup_domain::value_objects::{ByteSize, SiteId};

#[derive(Debug, Clone, Serialize, Default)]
pub struct ReconciliationReport {
    pub site_id: SiteId,
    pub orphaned_objects: Vec<String>,
    pub missing_objects: Vec<String>,
    pub recorded_used_bytes: u64,
    pub observed_used_bytes: u64,
    pub drift_ratio: f64,
    pub corrected: bool,
}

pub struct Reconciler {
    backups: Arc<dyn BackupRepository>,
    sites: Arc<dyn SiteRepository>,
    nodes: Arc<dyn NodeRepository>,
    object_store: Arc<dyn ObjectStore>,
    drift_threshold: f64,
}

impl Reconciler {
    pub fn new(
        backups: Arc<dyn BackupRepository>,
        sites: Arc<dyn SiteRepository>,
        nodes: Arc<dyn NodeRepository>,
        object_store: Arc<dyn ObjectStore>,
        drift_threshold: f64,
    ) -> Self {
        Self { backups, sites, nodes, object_store, drift_threshold }
    }

    /// Reconciles a single site. `dry_run` suppresses every mutation
    /// (missing-object status flips and the usage correction) while still
    /// returning the same report, so operators can preview drift first.
    pub async fn reconcile_site(&self, site: &Site, dry_run: bool) -> Result<ReconciliationReport, BackupError> {
        let prefix = site_prefix(site);
        let observed_objects: HashSet<String> = self.object_store.list(&prefix).await?.into_iter().collect();

        let mut recorded_objects = HashSet::new();
        let mut missing_objects = Vec::new();
        let mut recorded_used_bytes = 0u64;

        for backup in self.backups.list_for_site(site.id).await? {
            if !backup.contributes_to_usage() {
                continue;
            }
            recorded_used_bytes = recorded_used_bytes.saturating_add(backup.size_bytes.bytes());
            recorded_objects.insert(backup.object_path.clone());

            if !observed_objects.contains(&backup.object_path) {
                missing_objects.push(backup.object_path.clone());
                if !dry_run {
                    self.mark_missing(backup).await?;
                }
            }
        }

        let orphaned_objects: Vec<String> = observed_objects
            .iter()
            .filter(|path| !recorded_objects.contains(*path))
            .cloned()
            .collect();

        let missing_bytes: u64 = self.sum_missing_bytes(site.id, &missing_objects).await?;
        let observed_used_bytes = recorded_used_bytes.saturating_sub(missing_bytes);

        let drift_ratio = if recorded_used_bytes == 0 {
            0.0
        } else {
            (recorded_used_bytes as f64 - observed_used_bytes as f64).abs() / recorded_used_bytes as f64
        };

        let mut corrected = false;
        if drift_ratio > self.drift_threshold && !dry_run {
            let mut site = site.clone();
            site.set_storage_used(ByteSize::from_bytes(observed_used_bytes), chrono::Utc::now());
            self.sites.update(&site).await?;
            self.recompute_node_usage(site.node_id).await?;
            corrected = true;
        }

        Ok(ReconciliationReport {
            site_id: site.id,
            orphaned_objects,
            missing_objects,
            recorded_used_bytes,
            observed_used_bytes,
            drift_ratio,
            corrected,
        })
    }

    /// Recomputes `node.storage_used_bytes` as the sum of its sites' current
    /// totals (§4.5 step 5, §9 invariant "node usage = Σ site usage"),
    /// keeping the node aggregate in lockstep with a corrected site total
    /// rather than letting it silently diverge.
    async fn recompute_node_usage(&self, node_id: fleet_backup_domain::value_objects::NodeId) -> Result<(), BackupError> {
        let Some(mut node) = self.nodes.find_by_id(node_id).await? else {
            return Ok(());
        };
        let total: u64 = self.sites.list_for_node(node_id).await?.iter().map(|site| site.storage_used_bytes.bytes()).sum();
        node.storage_used_bytes = ByteSize::from_bytes(total);
        self.nodes.update(&node).await?;
        Ok(())
    }

    async fn mark_missing(&self, mut backup: Backup) -> Result<(), BackupError> {
        if backup.status != BackupStatus::Failed {
            backup.mark_failed();
            self.backups.update(&backup).await?;
        }
        Ok(())
    }

    async fn sum_missing_bytes(&self, site_id: SiteId, missing_objects: &[String]) -> Result<u64, BackupError> {
        if missing_objects.is_empty() {
            return Ok(0);
        }
        let missing: HashSet<&str> = missing_objects.iter().map(String::as_str).collect();
        let total = self
            .backups
            .list_for_site(site_id)
            .await?
            .into_iter()
            .filter(|b| b.contributes_to_usage() && missing.contains(b.object_path.as_str()))
            .map(|b| b.size_bytes.bytes())
            .sum();
        Ok(total)
    }
}

fn site_prefix(site: &Site) -> String {
    format!("{}/{}", site.node_id, site.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{SqliteBackupRepository, SqliteNodeRepository, SqliteSiteRepository};
    use crate::schema::initialize_database;
    use fleet_backup_domain::value_objects::{NodeId, StorageProviderId};
    use fleet_backup_engine::object_store::LocalObjectStore;

    async fn fixture() -> (Arc<SqliteBackupRepository>, Arc<SqliteSiteRepository>, Arc<SqliteNodeRepository>, Arc<dyn ObjectStore>, tempfile::TempDir) {
        let pool = initialize_database(":memory:").await.unwrap();
        let backups = Arc::new(SqliteBackupRepository::new(pool.clone()));
        let sites = Arc::new(SqliteSiteRepository::new(pool.clone()));
        let nodes = Arc::new(SqliteNodeRepository::new(pool));
        let tmp = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(tmp.path().to_path_buf()));
        (backups, sites, nodes, store, tmp)
    }

    fn sample_site(node_id: NodeId) -> Site {
        Site {
            id: SiteId::new(),
            node_id,
            name: "example".into(),
            wp_config_path: "/wp-config.php".into(),
            wp_content_path: "/wp-content".into(),
            db_credentials: None,
            storage_quota_bytes: ByteSize::gib(10),
            storage_used_bytes: ByteSize::from_bytes(0),
            quota_exceeded_at: None,
            schedule: Default::default(),
            next_run_at: None,
            last_backup_size_bytes: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn missing_object_marks_the_backup_failed() {
        let (backups, sites, nodes, store, _tmp) = fixture().await;
        let site = sample_site(NodeId::new());
        sites.insert(&site).await.unwrap();

        let object_path = format!("{}/{}/example_20260101_020000.tar.zst", site.node_id, site.id);
        let mut backup = Backup::new_running(site.id, StorageProviderId::new(), "example_20260101_020000.tar.zst".into());
        backup.mark_success(object_path, ByteSize::mib(50)).unwrap();
        backups.insert(&backup).await.unwrap();

        let reconciler = Reconciler::new(backups.clone(), sites.clone(), nodes, store, 0.01);
        let report = reconciler.reconcile_site(&site, false).await.unwrap();

        assert_eq!(report.missing_objects.len(), 1);
        let reloaded = backups.find_by_id(backup.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, BackupStatus::Failed);
    }

    #[tokio::test]
    async fn dry_run_reports_drift_without_mutating_anything() {
        let (backups, sites, nodes, store, _tmp) = fixture().await;
        let site = sample_site(NodeId::new());
        sites.insert(&site).await.unwrap();

        let object_path = format!("{}/{}/example_20260101_020000.tar.zst", site.node_id, site.id);
        let mut backup = Backup::new_running(site.id, StorageProviderId::new(), "example_20260101_020000.tar.zst".into());
        backup.mark_success(object_path, ByteSize::mib(50)).unwrap();
        backups.insert(&backup).await.unwrap();

        let reconciler = Reconciler::new(backups.clone(), sites.clone(), nodes, store, 0.01);
        let report = reconciler.reconcile_site(&site, true).await.unwrap();

        assert_eq!(report.missing_objects.len(), 1);
        assert!(!report.corrected);
        let reloaded = backups.find_by_id(backup.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, BackupStatus::Success);
    }
}
