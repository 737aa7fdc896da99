// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! The Master daemon binary: loads settings, opens the SQLite store, wires
//! every repository and service into `AppState`, and serves the REST+SSE
//! API until a shutdown signal arrives, alongside the retention sweep and
//! reconciliation background loops.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use clap::Parser;

use fleet_backup_bootstrap::{config, error_to_exit_code, logger, signals, GlobalArgs, ShutdownCoordinator};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::repositories::{
    ActivityLogRepository, BackupRepository, NodeRepository, SiteRepository, StorageProviderRepository,
};
use fleet_backup_domain::services::object_store::ObjectStore;
use fleet_backup_engine::object_store::{LocalObjectStore, S3ObjectStore};

use fleet_backup_master::auth::TokenIssuer;
use fleet_backup_master::enrollment::{EnrollmentService, JoinRateLimiter};
use fleet_backup_master::http::{self, AppState};
use fleet_backup_master::quota::QuotaLedger;
use fleet_backup_master::reconcile::Reconciler;
use fleet_backup_master::repositories::{
    SqliteActivityLogRepository, SqliteBackupRepository, SqliteNodeRepository, SqliteProgressRepository,
    SqliteSiteRepository, SqliteStorageProviderRepository, SqliteUserRepository,
};
use fleet_backup_master::retention::RetentionSweeper;
use fleet_backup_master::schema::initialize_database;
use fleet_backup_master::seal::RotatingSealer;
use fleet_backup_master::settings::MasterSettings;

#[derive(Debug, Parser)]
#[command(name = "fleet-backup-master", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            return std::process::ExitCode::from(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "master daemon exiting with error");
            error_to_exit_code(&err).into()
        }
    }
}

async fn run(cli: Cli) -> Result<(), BackupError> {
    let _logger_guard = logger::init(cli.global.log_dir.as_deref(), cli.global.json, cli.global.default_filter())?;

    let config_path = cli
        .global
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("/etc/fleet-backup/master.yaml"));
    let settings: MasterSettings = config::load_layered(&[config_path.as_path()])?;

    if settings.master_secret.is_empty() {
        return Err(BackupError::config("master_secret must be set"));
    }

    let pool = initialize_database(&settings.database_path).await.map_err(|err| BackupError::database(err.to_string()))?;

    let nodes: Arc<dyn NodeRepository> = Arc::new(SqliteNodeRepository::new(pool.clone()));
    let sites: Arc<dyn SiteRepository> = Arc::new(SqliteSiteRepository::new(pool.clone()));
    let backups: Arc<dyn BackupRepository> = Arc::new(SqliteBackupRepository::new(pool.clone()));
    let storage_providers: Arc<dyn StorageProviderRepository> = Arc::new(SqliteStorageProviderRepository::new(pool.clone()));
    let activity_log: Arc<dyn ActivityLogRepository> = Arc::new(SqliteActivityLogRepository::new(pool.clone()));
    let progress = SqliteProgressRepository::new(pool.clone());
    let users = Arc::new(SqliteUserRepository::new(pool.clone()));

    let sealer = Arc::new(RotatingSealer::from_secret(settings.master_secret.as_bytes(), settings.seal_key_generation)?);
    let object_store = build_object_store(storage_providers.as_ref(), sealer.as_ref()).await?;

    let quota = Arc::new(QuotaLedger::new(backups.clone(), sites.clone(), nodes.clone(), ChronoDuration::days(settings.retention_grace_days)));
    let retention = Arc::new(RetentionSweeper::new(backups.clone(), object_store.clone()));
    let reconciler = Arc::new(Reconciler::new(backups.clone(), sites.clone(), nodes.clone(), object_store.clone(), settings.drift_threshold));
    let enrollment = Arc::new(EnrollmentService::new(nodes.clone()));
    let join_rate_limiter = Arc::new(JoinRateLimiter::new(settings.join_rate_limit_per_minute));
    let tokens = Arc::new(TokenIssuer::new(settings.master_secret.as_bytes(), ChronoDuration::minutes(settings.token_ttl_minutes)));

    let sites_for_background = sites.clone();

    let state = AppState {
        pool: pool.clone(),
        nodes,
        sites,
        backups,
        storage_providers,
        activity_log,
        progress,
        users,
        object_store,
        sealer,
        quota,
        retention: retention.clone(),
        reconciler: reconciler.clone(),
        enrollment,
        join_rate_limiter,
        tokens,
        settings: Arc::new(settings.clone()),
    };

    let app = http::router(state);

    let bind_address: SocketAddr = settings
        .bind_address
        .parse()
        .map_err(|err| BackupError::config(format!("invalid bind_address '{}': {err}", settings.bind_address)))?;
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    tracing::info!(address = %bind_address, "master listening");

    let shutdown = ShutdownCoordinator::default();
    let token = shutdown.token();

    let retention_task = tokio::spawn({
        let retention = retention.clone();
        let interval = Duration::from_secs(settings.retention_sweep_interval_secs);
        let token = token.clone();
        async move { retention.run(interval, token).await }
    });

    let reconciliation_task = tokio::spawn(run_reconciliation_loop(
        reconciler.clone(),
        sites_for_background,
        Duration::from_secs(settings.reconciliation_interval_secs),
        token.clone(),
    ));

    let serve_token = token.clone();
    let server_task = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { serve_token.cancelled().await })
            .await
    });

    signals::wait_for_shutdown_signal().await;
    shutdown.initiate_shutdown();
    let _ = shutdown.wait_for_shutdown().await;
    shutdown.complete_shutdown();

    retention_task.abort();
    reconciliation_task.abort();
    if let Ok(Err(err)) = server_task.await {
        tracing::warn!(error = %err, "http server exited with an error");
    }

    Ok(())
}

/// Runs drift reconciliation (§4.5 step 5) across every site on a fixed
/// interval, logging rather than failing the whole loop on a single site's
/// error so one bad site can't stop reconciliation for the rest of the fleet.
async fn run_reconciliation_loop(
    reconciler: Arc<Reconciler>,
    sites: Arc<dyn SiteRepository>,
    interval: Duration,
    cancel: fleet_backup_bootstrap::CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => {
                tracing::info!("reconciliation loop stopping");
                return;
            }
        }

        let due_sites = match sites.list_all().await {
            Ok(sites) => sites,
            Err(err) => {
                tracing::warn!(error = %err, "reconciliation loop: failed to list sites");
                continue;
            }
        };

        for site in &due_sites {
            if let Err(err) = reconciler.reconcile_site(site, false).await {
                tracing::warn!(site_id = %site.id, error = %err, "scheduled reconciliation failed for site");
            }
        }
    }
}

/// Builds the one long-lived `ObjectStore` the retention sweeper and
/// reconciler share, from whichever provider is currently the default
/// (§4.6). Credentials are unsealed once at startup and held only inside the
/// constructed client, matching the adapter's own "unsealed only per call
/// site" contract for the duration of this process's lifetime.
async fn build_object_store(providers: &dyn StorageProviderRepository, sealer: &dyn fleet_backup_domain::services::seal::SecretSealer) -> Result<Arc<dyn ObjectStore>, BackupError> {
    let provider = providers
        .find_default()
        .await?
        .ok_or_else(|| BackupError::config("no default storage provider configured; add one via the admin CLI"))?;

    match provider.provider_type {
        fleet_backup_domain::entities::ProviderType::Local => Ok(Arc::new(LocalObjectStore::new(provider.endpoint.clone()))),
        fleet_backup_domain::entities::ProviderType::S3Compatible => {
            let access_key = String::from_utf8(sealer.unseal(&provider.sealed_access_key).await?)
                .map_err(|err| BackupError::integrity(format!("sealed access key is not valid utf-8: {err}")))?;
            let secret_key = String::from_utf8(sealer.unseal(&provider.sealed_secret_key).await?)
                .map_err(|err| BackupError::integrity(format!("sealed secret key is not valid utf-8: {err}")))?;
            Ok(Arc::new(S3ObjectStore::new(&provider.endpoint, &provider.region, &provider.bucket, &access_key, &secret_key)))
        }
    }
}
