// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The REST+SSE API (§6.1-6.3). Each handler authenticates itself via a
//! typed extractor (`AuthenticatedNode` or `AuthenticatedUser`) rather than
//! the router applying a blanket auth layer, since the two public enrollment
//! endpoints sit in the same tree as everything else and need no extractor
//! at all.

pub mod middleware;
pub mod node_routes;
pub mod operator_routes;
pub mod sse;
pub mod state;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/nodes/join-request", post(node_routes::join_request))
        .route("/nodes/status/code/{code}", get(node_routes::poll_status))
        .route("/nodes/{node_id}/commands", get(node_routes::poll_commands))
        .route("/nodes/storage-config", get(node_routes::storage_config))
        .route("/nodes/approve/{node_id}", post(operator_routes::approve_node))
        .route("/nodes", get(operator_routes::list_nodes))
        .route("/sites", get(operator_routes::list_sites))
        .route("/sites/{site_id}/quota/check", get(node_routes::quota_check))
        .route("/sites/{site_id}/quota", put(operator_routes::set_site_quota))
        .route("/sites/{site_id}/backup/start", post(operator_routes::start_backup))
        .route("/sites/{site_id}/backup/stop", post(node_routes::stop_backup))
        .route("/sites/{site_id}/backup/status", get(node_routes::backup_status))
        .route("/sites/{site_id}/backup/progress/start", post(node_routes::start_progress))
        .route("/sites/{site_id}/backup/progress", post(node_routes::apply_progress))
        .route("/sites/{site_id}/backup/report", post(node_routes::report_backup))
        .route("/daemon/backup/reset/{site_id}", post(node_routes::reset_progress))
        .route("/daemon/backup/stream/{site_id}", get(sse::stream_progress))
        .route("/storage/reconcile", post(operator_routes::reconcile_storage))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
