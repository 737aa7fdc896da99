// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Server-side RBAC filtering (§6.2). `super_admin` sees everything.
//! `node_admin` sees the nodes it is assigned plus those nodes' sites,
//! backups, and site admins. `site_admin` sees only the sites it is
//! assigned (and their backups). Filtering happens here, not in the
//! handlers, so every route applies the same rule.

use std::collections::HashSet;

use fleet_backup_domain::entities::Site;
use fleet_backup_domain::value_objects::{NodeId, SiteId};

use super::jwt::Role;

#[derive(Debug, Clone, Default)]
pub struct Assignments {
    pub node_ids: HashSet<NodeId>,
    pub site_ids: HashSet<SiteId>,
}

pub fn can_view_node(role: Role, assignments: &Assignments, node_id: NodeId) -> bool {
    match role {
        Role::SuperAdmin => true,
        Role::NodeAdmin => assignments.node_ids.contains(&node_id),
        Role::SiteAdmin => false,
    }
}

/// A site is visible to a node_admin through its owning node, and to a
/// site_admin only through a direct assignment.
pub fn can_view_site(role: Role, assignments: &Assignments, site: &Site) -> bool {
    match role {
        Role::SuperAdmin => true,
        Role::NodeAdmin => assignments.node_ids.contains(&site.node_id),
        Role::SiteAdmin => assignments.site_ids.contains(&site.id),
    }
}

pub fn filter_nodes(role: Role, assignments: &Assignments, node_ids: Vec<NodeId>) -> Vec<NodeId> {
    node_ids.into_iter().filter(|id| can_view_node(role, assignments, *id)).collect()
}

pub fn filter_sites(role: Role, assignments: &Assignments, sites: Vec<Site>) -> Vec<Site> {
    sites.into_iter().filter(|site| can_view_site(role, assignments, site)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleet_backup_domain::value_objects::ByteSize;

    fn site_for(node_id: NodeId) -> Site {
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
            created_at: Utc::now(),
        }
    }

    #[test]
    fn super_admin_sees_everything() {
        let assignments = Assignments::default();
        let site = site_for(NodeId::new());
        assert!(can_view_node(Role::SuperAdmin, &assignments, site.node_id));
        assert!(can_view_site(Role::SuperAdmin, &assignments, &site));
    }

    #[test]
    fn node_admin_sees_only_assigned_nodes_and_their_sites() {
        let assigned_node = NodeId::new();
        let other_node = NodeId::new();
        let assignments = Assignments { node_ids: HashSet::from([assigned_node]), site_ids: HashSet::new() };

        assert!(can_view_node(Role::NodeAdmin, &assignments, assigned_node));
        assert!(!can_view_node(Role::NodeAdmin, &assignments, other_node));

        let owned_site = site_for(assigned_node);
        let foreign_site = site_for(other_node);
        assert!(can_view_site(Role::NodeAdmin, &assignments, &owned_site));
        assert!(!can_view_site(Role::NodeAdmin, &assignments, &foreign_site));
    }

    #[test]
    fn site_admin_sees_only_directly_assigned_sites_never_nodes() {
        let site = site_for(NodeId::new());
        let assignments = Assignments { node_ids: HashSet::new(), site_ids: HashSet::from([site.id]) };

        assert!(!can_view_node(Role::SiteAdmin, &assignments, site.node_id));
        assert!(can_view_site(Role::SiteAdmin, &assignments, &site));

        let other_site = site_for(NodeId::new());
        assert!(!can_view_site(Role::SiteAdmin, &assignments, &other_site));
    }
}
