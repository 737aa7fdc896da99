// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The Node-facing surface (§4.4, §6.3): public enrollment, and everything
//! a Node's `HttpMasterClient`/`HttpProgressRepository` call, authenticated
//! with `X-Node-Key`. Every wire shape here is the mirror image of the one
//! `fleet-backup-node` already sends/expects - see `master_client.rs` and
//! `progress_client.rs` in that crate.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use fleet_backup_domain::entities::{ProgressState, ProgressUpdate};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::value_objects::{JobId, NodeId, SiteId};

use crate::commands::{enqueue_command, CommandAction};
use crate::http::middleware::{authenticate_bearer, authenticate_node_by_key, forbidden, load_assignments, ApiError, AuthenticatedNode};
use crate::http::state::AppState;
use crate::quota::{pre_flight_check, QuotaCheck};

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub hostname: String,
    pub address: String,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub request_id: String,
    pub registration_code: String,
}

pub async fn join_request(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    Json(request): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, ApiError> {
    if !state.join_rate_limiter.check(&peer.ip().to_string()) {
        return Err(ApiError(BackupError::transient("too many join requests, try again shortly")));
    }

    let node = state.enrollment.join_request(request.hostname, request.address).await?;
    let code = node.registration_code.clone().unwrap_or_default();
    Ok(Json(JoinResponse { request_id: node.id.to_string(), registration_code: code }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStatus {
    Pending,
    Active,
    Blocked,
}

#[derive(Debug, Serialize)]
pub struct JoinStatusResponse {
    pub status: JoinStatus,
    pub node_id: Option<NodeId>,
    pub api_key: Option<String>,
}

/// "Exactly once" (§4.4 step 4) is enforced by `EnrollmentService`, which
/// resolves the code through its own in-memory registry (the node row
/// itself clears its registration code the instant it goes ACTIVE) and
/// hands back the plaintext key only on the first poll that observes it.
pub async fn poll_status(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<JoinStatusResponse>, ApiError> {
    if !state.join_rate_limiter.check(&peer.ip().to_string()) {
        return Err(ApiError(BackupError::transient("too many status polls, try again shortly")));
    }

    match state.enrollment.poll_status(&code).await? {
        Some(poll) => {
            let status = match poll.node.status {
                fleet_backup_domain::entities::NodeStatus::Pending => JoinStatus::Pending,
                fleet_backup_domain::entities::NodeStatus::Active => JoinStatus::Active,
                _ => JoinStatus::Blocked,
            };
            Ok(Json(JoinStatusResponse { status, node_id: Some(poll.node.id), api_key: poll.api_key }))
        }
        None => Err(ApiError(BackupError::not_found("no pending node for that registration code"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct QuotaCheckQuery {
    pub estimated_bytes: Option<u64>,
}

pub async fn quota_check(
    AuthenticatedNode(node): AuthenticatedNode,
    Path(site_id): Path<SiteId>,
    Query(query): Query<QuotaCheckQuery>,
    State(state): State<AppState>,
) -> Result<Json<QuotaCheck>, ApiError> {
    let site = state
        .sites
        .find_by_id(site_id)
        .await?
        .ok_or_else(|| BackupError::not_found(format!("site {site_id} not found")))?;

    if site.node_id != node.id {
        return Err(ApiError(BackupError::validation("site does not belong to this node")));
    }

    let estimated = query
        .estimated_bytes
        .or_else(|| site.last_backup_size_bytes.map(|size| size.bytes()))
        .unwrap_or(fleet_backup_domain::value_objects::ByteSize::gib(1).bytes());

    Ok(Json(pre_flight_check(&node, &site, estimated)))
}

#[derive(Debug, Serialize)]
pub struct StorageCredentials {
    pub provider_type: String,
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

pub async fn storage_config(AuthenticatedNode(_node): AuthenticatedNode, State(state): State<AppState>) -> Result<Json<StorageCredentials>, ApiError> {
    let mut provider = state
        .storage_providers
        .find_default()
        .await?
        .ok_or_else(|| BackupError::not_found("no default storage provider configured"))?;

    let access_key = state.sealer.unseal(&provider.sealed_access_key).await?;
    let secret_key = state.sealer.unseal(&provider.sealed_secret_key).await?;

    // Credentials sealed under a retired generation migrate forward lazily,
    // the first time they're read after a rotation, rather than all at once.
    let current_generation = state.sealer.current_generation();
    if provider.sealed_access_key.key_generation < current_generation || provider.sealed_secret_key.key_generation < current_generation {
        provider.sealed_access_key = state.sealer.seal(&access_key).await?;
        provider.sealed_secret_key = state.sealer.seal(&secret_key).await?;
        state.storage_providers.update(&provider).await?;
    }

    let provider_type = match provider.provider_type {
        fleet_backup_domain::entities::ProviderType::S3Compatible => "s3_compatible",
        fleet_backup_domain::entities::ProviderType::Local => "local",
    };

    Ok(Json(StorageCredentials {
        provider_type: provider_type.to_string(),
        endpoint: provider.endpoint,
        region: provider.region,
        bucket: provider.bucket,
        access_key: String::from_utf8_lossy(&access_key).into_owned(),
        secret_key: String::from_utf8_lossy(&secret_key).into_owned(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct BackupReport {
    pub site_id: SiteId,
    pub success: bool,
    pub object_path: Option<String>,
    pub size_bytes: Option<u64>,
    pub error: Option<String>,
}

/// §4.5 post-flight accounting, steps 1-5. The site-ownership check (step 1)
/// happens here rather than in `QuotaLedger`, since ownership is a wire-layer
/// authorization concern, not an accounting one.
pub async fn report_backup(
    AuthenticatedNode(node): AuthenticatedNode,
    Path(site_id): Path<SiteId>,
    State(state): State<AppState>,
    Json(report): Json<BackupReport>,
) -> Result<(), ApiError> {
    if report.site_id != site_id {
        return Err(ApiError(BackupError::validation("path and body site_id disagree")));
    }

    let site = state
        .sites
        .find_by_id(site_id)
        .await?
        .ok_or_else(|| BackupError::not_found(format!("site {site_id} not found")))?;
    if site.node_id != node.id {
        return Err(ApiError(BackupError::validation("site does not belong to this node")));
    }

    let provider = state
        .storage_providers
        .find_default()
        .await?
        .ok_or_else(|| BackupError::not_found("no default storage provider configured"))?;

    let filename = report
        .object_path
        .as_deref()
        .and_then(|path| path.rsplit('/').next())
        .unwrap_or("backup")
        .to_string();
    let backup = fleet_backup_domain::entities::Backup::new_running(site_id, provider.id, filename);

    if report.success {
        let object_path = report.object_path.ok_or_else(|| BackupError::validation("success report missing object_path"))?;
        let size_bytes = fleet_backup_domain::value_objects::ByteSize::from_bytes(report.size_bytes.unwrap_or(0));
        state.quota.record_successful_backup(backup, object_path, size_bytes).await?;
    } else {
        state.quota.record_failed_backup(backup).await?;
    }

    Ok(())
}

pub async fn poll_commands(
    AuthenticatedNode(node): AuthenticatedNode,
    Path(node_id): Path<NodeId>,
    State(state): State<AppState>,
) -> Result<Json<Vec<PendingCommandWire>>, ApiError> {
    if node_id != node.id {
        return Err(ApiError(BackupError::validation("cannot poll another node's command queue")));
    }

    let commands = crate::commands::poll_commands(&state.pool, node_id).await?;
    Ok(Json(commands.into_iter().map(PendingCommandWire::from).collect()))
}

#[derive(Debug, Serialize)]
pub struct PendingCommandWire {
    pub site_id: SiteId,
    pub action: CommandActionWire,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandActionWire {
    Start,
    Stop,
}

impl From<crate::commands::PendingCommand> for PendingCommandWire {
    fn from(command: crate::commands::PendingCommand) -> Self {
        let action = match command.action {
            CommandAction::Start => CommandActionWire::Start,
            CommandAction::Stop => CommandActionWire::Stop,
        };
        Self { site_id: command.site_id, action }
    }
}

pub async fn backup_status(
    AuthenticatedNode(_node): AuthenticatedNode,
    Path(site_id): Path<SiteId>,
    State(state): State<AppState>,
) -> Result<Json<fleet_backup_domain::entities::ProgressRow>, ApiError> {
    Ok(Json(state.progress.get(site_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct StartProgressRequest {
    pub job_id: JobId,
    pub bytes_total: u64,
}

#[derive(Debug, Serialize)]
pub struct StartProgressResponse {
    pub epoch: u64,
}

pub async fn start_progress(
    AuthenticatedNode(_node): AuthenticatedNode,
    Path(site_id): Path<SiteId>,
    State(state): State<AppState>,
    Json(request): Json<StartProgressRequest>,
) -> Result<Json<StartProgressResponse>, ApiError> {
    let epoch = state.progress.start(site_id, request.job_id, request.bytes_total).await?;
    Ok(Json(StartProgressResponse { epoch }))
}

#[derive(Debug, Deserialize)]
pub struct ApplyProgressRequest {
    pub epoch: u64,
    pub state: ProgressState,
    pub progress_percent: u8,
    pub stage: Option<String>,
    pub message: Option<String>,
    pub bytes_processed: u64,
    pub bytes_total: u64,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AppliedResponse {
    pub applied: bool,
}

pub async fn apply_progress(
    AuthenticatedNode(_node): AuthenticatedNode,
    Path(site_id): Path<SiteId>,
    State(state): State<AppState>,
    Json(request): Json<ApplyProgressRequest>,
) -> Result<Json<AppliedResponse>, ApiError> {
    let update = ProgressUpdate {
        epoch: request.epoch,
        state: request.state,
        progress_percent: request.progress_percent,
        stage: request.stage,
        message: request.message,
        bytes_processed: request.bytes_processed,
        bytes_total: request.bytes_total,
        error: request.error,
    };
    let applied = state.progress.apply(site_id, update).await?;
    Ok(Json(AppliedResponse { applied }))
}

#[derive(Debug, Deserialize, Default)]
pub struct StopRequest {
    pub epoch: Option<u64>,
}

/// `POST /sites/{id}/backup/stop` is hit by two different callers at the
/// exact same path: a Node's `HttpProgressRepository::request_cancellation`
/// (authenticated with `X-Node-Key`, body carries the epoch it's cancelling)
/// and an operator's "stop this backup" action (authenticated with a Bearer
/// JWT, no epoch - it cancels whatever is currently running and also queues
/// a Stop command so a not-yet-dispatched job is never started). Since axum
/// cannot register two handlers on one literal route, this single handler
/// inspects which credential was presented and picks the matching semantics.
pub async fn stop_backup(
    Path(site_id): Path<SiteId>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<StopRequest>,
) -> Result<Json<AppliedResponse>, ApiError> {
    if let Some(key) = headers.get("X-Node-Key").and_then(|value| value.to_str().ok()) {
        let node = authenticate_node_by_key(key, &state).await?;
        let site = state
            .sites
            .find_by_id(site_id)
            .await?
            .ok_or_else(|| BackupError::not_found(format!("site {site_id} not found")))?;
        if site.node_id != node.id {
            return Err(ApiError(BackupError::validation("site does not belong to this node")));
        }
        let epoch = request.epoch.ok_or_else(|| BackupError::validation("missing epoch"))?;
        let applied = state.progress.request_cancellation(site_id, epoch).await?;
        return Ok(Json(AppliedResponse { applied }));
    }

    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| BackupError::validation("missing X-Node-Key or Bearer Authorization header"))?;
    let claims = authenticate_bearer(token, &state).await?;

    let site = state
        .sites
        .find_by_id(site_id)
        .await?
        .ok_or_else(|| BackupError::not_found(format!("site {site_id} not found")))?;
    let assignments = load_assignments(&state, &claims).await?;
    if !crate::auth::rbac::can_view_site(claims.role, &assignments, &site) {
        return Err(forbidden("not authorized for this site"));
    }

    enqueue_command(&state.pool, site.node_id, site_id, CommandAction::Stop).await?;
    let row = state.progress.get(site_id).await?;
    let applied = state.progress.request_cancellation(site_id, row.epoch).await?;
    Ok(Json(AppliedResponse { applied }))
}

pub async fn reset_progress(
    AuthenticatedNode(_node): AuthenticatedNode,
    Path(site_id): Path<SiteId>,
    State(state): State<AppState>,
) -> Result<(), ApiError> {
    state.progress.force_reset(site_id).await?;
    Ok(())
}
