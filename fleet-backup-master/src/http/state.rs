// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Shared application state handed to every axum handler via `State`.

use std::sync::Arc;

use sqlx::SqlitePool;

use fleet_backup_domain::repositories::{
    ActivityLogRepository, BackupRepository, NodeRepository, ProgressRepository, SiteRepository,
    StorageProviderRepository,
};
use fleet_backup_domain::services::object_store::ObjectStore;
use fleet_backup_domain::services::seal::SecretSealer;

use crate::auth::TokenIssuer;
use crate::enrollment::{EnrollmentService, JoinRateLimiter};
use crate::quota::QuotaLedger;
use crate::reconcile::Reconciler;
use crate::repositories::{SqliteProgressRepository, UserRepository};
use crate::retention::RetentionSweeper;
use crate::settings::MasterSettings;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub nodes: Arc<dyn NodeRepository>,
    pub sites: Arc<dyn SiteRepository>,
    pub backups: Arc<dyn BackupRepository>,
    pub storage_providers: Arc<dyn StorageProviderRepository>,
    pub activity_log: Arc<dyn ActivityLogRepository>,
    pub progress: Arc<SqliteProgressRepository>,
    pub users: Arc<dyn UserRepository>,
    pub object_store: Arc<dyn ObjectStore>,
    pub sealer: Arc<dyn SecretSealer>,
    pub quota: Arc<QuotaLedger>,
    pub retention: Arc<RetentionSweeper>,
    pub reconciler: Arc<Reconciler>,
    pub enrollment: Arc<EnrollmentService>,
    pub join_rate_limiter: Arc<JoinRateLimiter>,
    pub tokens: Arc<TokenIssuer>,
    pub settings: Arc<MasterSettings>,
}

impl axum::extract::FromRef<AppState> for Arc<dyn NodeRepository> {
    fn from_ref(state: &AppState) -> Self {
        state.nodes.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<TokenIssuer> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<dyn UserRepository> {
    fn from_ref(state: &AppState) -> Self {
        state.users.clone()
    }
}

/// The `ProgressRepository` trait object, distinct from `Arc<SqliteProgressRepository>`
/// above, so handlers that only need the trait surface (not `subscribe`) can
/// depend on the port rather than the concrete adapter.
impl axum::extract::FromRef<AppState> for Arc<dyn ProgressRepository> {
    fn from_ref(state: &AppState) -> Self {
        state.progress.clone() as Arc<dyn ProgressRepository>
    }
}
