// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The operator-facing surface (§6.2, §6.3): bearer-JWT authenticated list
//! endpoints filtered through RBAC, node approval, quota administration,
//! backup start/stop (delivered to the owning Node through the pending
//! command queue, since Master cannot call back into a Node behind NAT),
//! and on-demand drift reconciliation.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use fleet_backup_domain::entities::{Node, ProgressState, Site};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::value_objects::{ByteSize, NodeId, SiteId};

use crate::auth::jwt::Role;
use crate::commands::{enqueue_command, CommandAction};
use crate::http::middleware::{forbidden, load_assignments, ApiError, AuthenticatedUser};
use crate::http::state::AppState;

pub async fn list_nodes(AuthenticatedUser(claims): AuthenticatedUser, State(state): State<AppState>) -> Result<Json<Vec<Node>>, ApiError> {
    let assignments = load_assignments(&state, &claims).await?;
    let nodes = state.nodes.list_all().await?;
    let visible_ids: std::collections::HashSet<NodeId> =
        crate::auth::rbac::filter_nodes(claims.role, &assignments, nodes.iter().map(|n| n.id).collect()).into_iter().collect();
    Ok(Json(nodes.into_iter().filter(|n| visible_ids.contains(&n.id)).collect()))
}

pub async fn list_sites(AuthenticatedUser(claims): AuthenticatedUser, State(state): State<AppState>) -> Result<Json<Vec<Site>>, ApiError> {
    let assignments = load_assignments(&state, &claims).await?;
    let sites = state.sites.list_all().await?;
    Ok(Json(crate::auth::rbac::filter_sites(claims.role, &assignments, sites)))
}

pub async fn approve_node(
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(node_id): Path<NodeId>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if claims.role != Role::SuperAdmin {
        return Err(forbidden("only super_admin may approve nodes"));
    }

    let approval = state.enrollment.approve(node_id).await?;

    state
        .activity_log
        .append(
            fleet_backup_domain::entities::ActivityLogEntry::new(claims.sub, "approve_node", node_id.to_string(), "")
                .with_detail("node_id", node_id.to_string()),
        )
        .await?;

    Ok(Json(serde_json::json!({ "node_id": approval.node_id, "api_key": approval.api_key })))
}

#[derive(Debug, Deserialize)]
pub struct SetQuotaQuery {
    pub quota_gb: f64,
}

/// `PUT /sites/{id}/quota?quota_gb=…`: rejects if the requested quota would
/// push the owning node's committed site quotas above the node's own quota
/// (§6.3).
pub async fn set_site_quota(
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(site_id): Path<SiteId>,
    Query(query): Query<SetQuotaQuery>,
    State(state): State<AppState>,
) -> Result<(), ApiError> {
    let mut site = state
        .sites
        .find_by_id(site_id)
        .await?
        .ok_or_else(|| BackupError::not_found(format!("site {site_id} not found")))?;

    let assignments = load_assignments(&state, &claims).await?;
    if !crate::auth::rbac::can_view_site(claims.role, &assignments, &site) {
        return Err(forbidden("not authorized for this site"));
    }

    let node = state
        .nodes
        .find_by_id(site.node_id)
        .await?
        .ok_or_else(|| BackupError::not_found(format!("node {} not found", site.node_id)))?;

    let requested = ByteSize::gib(query.quota_gb.max(0.0) as u64);
    let other_sites_quota: u64 = state
        .sites
        .list_for_node(node.id)
        .await?
        .into_iter()
        .filter(|s| s.id != site_id)
        .map(|s| s.storage_quota_bytes.bytes())
        .sum();

    if other_sites_quota.saturating_add(requested.bytes()) > node.storage_quota_bytes.bytes() {
        return Err(ApiError(BackupError::quota_exceeded(format!(
            "site quota of {query:.1} GB would push node {} past its own quota",
            node.id
        ))));
    }

    site.storage_quota_bytes = requested;
    state.sites.update(&site).await?;
    Ok(())
}

/// `POST /sites/{id}/backup/start`: rejects with 409 if the site already has
/// a RUNNING progress row, otherwise queues a Start command for the owning
/// Node to pick up on its next poll.
pub async fn start_backup(
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(site_id): Path<SiteId>,
    State(state): State<AppState>,
) -> Result<(), ApiError> {
    let site = state
        .sites
        .find_by_id(site_id)
        .await?
        .ok_or_else(|| BackupError::not_found(format!("site {site_id} not found")))?;

    let assignments = load_assignments(&state, &claims).await?;
    if !crate::auth::rbac::can_view_site(claims.role, &assignments, &site) {
        return Err(forbidden("not authorized for this site"));
    }

    let row = state.progress.get(site_id).await?;
    if row.state == ProgressState::Running {
        return Err(ApiError(BackupError::conflict(format!("a backup is already running for site {site_id}"))));
    }

    enqueue_command(&state.pool, site.node_id, site_id, CommandAction::Start).await?;
    Ok(())
}

// `POST /sites/{id}/backup/stop` is handled by `node_routes::stop_backup`,
// which disambiguates Node vs. operator callers at the same literal path.

#[derive(Debug, Deserialize)]
pub struct ReconcileQuery {
    #[serde(default)]
    pub dry_run: bool,
    pub site_id: Option<SiteId>,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub reports: Vec<crate::reconcile::ReconciliationReport>,
}

/// `POST /storage/reconcile?dry_run=…`: super-admin only. Reconciles a
/// single site when `site_id` is given, otherwise every site.
pub async fn reconcile_storage(
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<ReconcileQuery>,
    State(state): State<AppState>,
) -> Result<Json<ReconcileResponse>, ApiError> {
    if claims.role != Role::SuperAdmin {
        return Err(forbidden("only super_admin may run reconciliation"));
    }

    let sites = match query.site_id {
        Some(site_id) => {
            let site = state
                .sites
                .find_by_id(site_id)
                .await?
                .ok_or_else(|| BackupError::not_found(format!("site {site_id} not found")))?;
            vec![site]
        }
        None => state.sites.list_all().await?,
    };

    let mut reports = Vec::with_capacity(sites.len());
    for site in &sites {
        reports.push(state.reconciler.reconcile_site(site, query.dry_run).await?);
    }

    Ok(Json(ReconcileResponse { reports }))
}
