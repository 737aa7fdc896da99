// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Authentication extractors for the two authenticated surfaces (§6.1): the
//! Node-facing surface authenticates with the `X-Node-Key` header (the
//! header the already-shipped Node crate sends; §4.4's literal `X-API-KEY`
//! wording is superseded by this in practice - see DESIGN.md), the
//! operator-facing surface authenticates with a `Bearer` JWT.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use fleet_backup_domain::entities::{Node, NodeStatus};
use fleet_backup_domain::error::BackupError;

use crate::auth::api_key::verify_api_key;
use crate::auth::jwt::Claims;
use crate::http::state::AppState;

pub struct AuthenticatedNode(pub Node);

/// Shared by the `AuthenticatedNode` extractor and by `stop_backup`, which
/// must pick between Node and operator authentication by hand since both
/// callers hit the same literal path (see `node_routes::stop_backup`).
pub async fn authenticate_node_by_key(key: &str, state: &AppState) -> Result<Node, ApiError> {
    let nodes = state.nodes.list_all().await.map_err(ApiError)?;
    let node = nodes
        .into_iter()
        .find(|node| node.api_key_hash.as_deref().is_some_and(|hash| verify_api_key(key, hash)))
        .ok_or_else(|| ApiError(BackupError::validation("invalid node API key")))?;

    if node.status != NodeStatus::Active {
        return Err(ApiError(BackupError::validation(format!("node {} is not active", node.id))));
    }

    Ok(node)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthenticatedNode {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get("X-Node-Key")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError(BackupError::validation("missing X-Node-Key header")))?
            .to_string();

        authenticate_node_by_key(&key, state).await.map(AuthenticatedNode)
    }
}

pub struct AuthenticatedUser(pub Claims);

/// Shared by the `AuthenticatedUser` extractor and by `stop_backup`.
pub async fn authenticate_bearer(token: &str, state: &AppState) -> Result<Claims, ApiError> {
    state.tokens.verify_fully_authenticated(token).map_err(ApiError)
}

pub fn forbidden(message: impl std::fmt::Display) -> ApiError {
    ApiError(BackupError::validation(format!("forbidden: {message}")))
}

/// Loads the RBAC assignment sets for an authenticated caller.
pub async fn load_assignments(state: &AppState, claims: &Claims) -> Result<crate::auth::Assignments, ApiError> {
    let node_ids = state.users.assigned_node_ids(claims.sub).await?;
    let site_ids = state.users.assigned_site_ids(claims.sub).await?;
    Ok(crate::auth::Assignments { node_ids, site_ids })
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError(BackupError::validation("missing Authorization header")))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError(BackupError::validation("Authorization header is not a Bearer token")))?;

        let claims = authenticate_bearer(token, state).await?;
        Ok(AuthenticatedUser(claims))
    }
}

/// Wraps `BackupError` so handlers can propagate it with plain `?` while
/// still producing the status codes §6.1 calls for.
pub struct ApiError(pub BackupError);

impl From<BackupError> for ApiError {
    fn from(err: BackupError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            BackupError::NotFound(_) => StatusCode::NOT_FOUND,
            BackupError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BackupError::Conflict(_) => StatusCode::CONFLICT,
            BackupError::QuotaExceeded(_) => StatusCode::CONFLICT,
            BackupError::Cancelled(_) => StatusCode::CONFLICT,
            BackupError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            BackupError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BackupError::Integrity(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BackupError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BackupError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BackupError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BackupError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BackupError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Unauthenticated/unauthorized requests still surface as Validation
        // above; the `X-Node-Key`/Bearer extractors map "missing or wrong
        // credential" to 401 explicitly rather than leaking through 422.
        let status = if matches!(&self.0, BackupError::Validation(msg) if msg.contains("API key") || msg.contains("Bearer") || msg.contains("Authorization")) {
            StatusCode::UNAUTHORIZED
        } else if matches!(&self.0, BackupError::Validation(msg) if msg.starts_with("forbidden:")) {
            StatusCode::FORBIDDEN
        } else {
            status
        };

        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}
