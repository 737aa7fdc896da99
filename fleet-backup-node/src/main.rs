// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! The Node daemon binary: loads settings, enrolls with Master if it has no
//! API key yet, then runs the scheduler, the job worker, and the command
//! poll loop until a shutdown signal arrives.

mod master_client;
mod progress_client;
mod recovery;
mod scheduler;
mod settings;
mod stages;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use fleet_backup_bootstrap::{config, error_to_exit_code, logger, signals, GlobalArgs, ShutdownCoordinator};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::value_objects::NodeId;
use fleet_backup_engine::{ResourceConfig, ResourceGovernor, StageRegistry};

use master_client::{CommandAction, HttpMasterClient, MasterApiClient};
use progress_client::HttpProgressRepository;
use settings::NodeSettings;
use worker::{PipelineWorker, WorkerHandle};

#[derive(Debug, Parser)]
#[command(name = "fleet-backup-node", version)]
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
            tracing::error!(error = %err, "node daemon exiting with error");
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
        .unwrap_or_else(|| PathBuf::from("/etc/fleet-backup/node.yaml"));
    let mut settings: NodeSettings = config::load_layered(&[config_path.as_path()])?;

    let master = Arc::new(HttpMasterClient::new(settings.master_url.clone(), settings.api_key.clone()));

    if settings.api_key.is_none() {
        let (key, node_id) = enroll(master.as_ref(), &settings).await?;
        master.set_api_key(key.clone());
        settings.api_key = Some(key);
        settings.node_id = Some(node_id.to_string());
        tracing::info!(node_id = %node_id, "enrollment complete, proceeding with startup");
    }

    let node_id = settings
        .node_id
        .as_deref()
        .map(NodeId::parse)
        .transpose()?
        .ok_or_else(|| BackupError::config("node is missing its assigned node_id; re-run enrollment"))?;

    tokio::fs::create_dir_all(&settings.temp_root).await?;
    recovery::sweep_temp_root(&settings.temp_root).await;

    let progress: Arc<dyn fleet_backup_domain::repositories::ProgressRepository> = Arc::new(HttpProgressRepository::new(
        settings.master_url.clone(),
        settings.api_key.clone().expect("api key set above"),
    ));

    for site in &settings.sites {
        if let Ok(site_id) = fleet_backup_domain::value_objects::SiteId::parse(&site.site_id) {
            recovery::reconcile_site(progress.as_ref(), site_id, Duration::from_secs(settings.crash_recovery_grace_secs)).await;
        }
    }

    let governor = Arc::new(ResourceGovernor::new(ResourceConfig {
        io_permits: settings.resource.io_permits,
        network_permits: settings.resource.network_permits,
        cpu_workers: settings
            .resource
            .cpu_workers
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)),
        upload_bandwidth_bytes_per_sec: settings.resource.upload_bandwidth_bytes_per_sec,
    }));

    let mut registry = StageRegistry::new();
    registry
        .register(Arc::new(stages::DumpDbStage::new(Duration::from_secs(settings.dump_timeout_secs))))
        .register(Arc::new(stages::CopyFilesStage))
        .register(Arc::new(stages::BundleStage))
        .register(Arc::new(stages::UploadStage::new(master.clone(), node_id)))
        .register(Arc::new(stages::CleanupStage));
    let registry = Arc::new(registry);

    let (worker, queue) = PipelineWorker::new(settings.temp_root.clone(), governor, registry, progress, master.clone());
    let worker_handle = worker.handle();

    let shutdown = ShutdownCoordinator::default();
    let token = shutdown.token();

    let scheduler = scheduler::Scheduler::new(settings.sites.clone(), queue);
    let scheduler_task = tokio::spawn(scheduler.run(token.clone()));

    let drain_task = tokio::spawn(worker.drain());

    let command_poll_task = tokio::spawn(poll_commands(
        master.clone(),
        worker_handle,
        node_id,
        Duration::from_secs(settings.command_poll_interval_secs),
        token.clone(),
    ));

    signals::wait_for_shutdown_signal().await;
    shutdown.initiate_shutdown();
    let _ = shutdown.wait_for_shutdown().await;
    shutdown.complete_shutdown();

    scheduler_task.abort();
    drain_task.abort();
    command_poll_task.abort();

    Ok(())
}

/// Generates a registration code, displays it for an operator to approve in
/// Master's admin UI, and polls until Master reports the node ACTIVE (§4.4).
/// Returns the issued API key and the node id Master assigned.
async fn enroll(master: &dyn MasterApiClient, settings: &NodeSettings) -> Result<(String, NodeId), BackupError> {
    let join = master.join(&settings.hostname, &settings.advertised_address).await?;
    tracing::info!(code = %join.registration_code, "node awaiting approval - enter this code in the Master admin UI");

    loop {
        tokio::time::sleep(Duration::from_secs(5)).await;
        let status = master.poll_join_status(&join.registration_code).await?;
        match status.status {
            master_client::JoinStatus::Active => {
                let key = status
                    .api_key
                    .ok_or_else(|| BackupError::integrity("master reported active enrollment without an api key"))?;
                let node_id = status
                    .node_id
                    .ok_or_else(|| BackupError::integrity("master reported active enrollment without a node id"))?;
                return Ok((key, node_id));
            }
            master_client::JoinStatus::Blocked => {
                return Err(BackupError::config("node enrollment was blocked by an operator"));
            }
            master_client::JoinStatus::Pending => continue,
        }
    }
}

/// Polls Master for start/stop instructions this Node has not yet acted on
/// (§9: Nodes may sit behind NAT, so Master cannot call back directly).
async fn poll_commands(
    master: Arc<HttpMasterClient>,
    worker: WorkerHandle,
    node_id: NodeId,
    interval: Duration,
    shutdown: fleet_backup_bootstrap::CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => {
                tracing::info!("command poll loop stopping");
                return;
            }
        }

        let commands = match master.poll_commands(node_id).await {
            Ok(commands) => commands,
            Err(err) => {
                tracing::warn!(error = %err, "failed to poll pending commands");
                continue;
            }
        };

        for command in commands {
            match command.action {
                CommandAction::Stop => {
                    if !worker.request_stop(command.site_id).await {
                        tracing::info!(site_id = %command.site_id, "stop command for a site with no running job");
                    }
                }
                CommandAction::Start => {
                    // On-demand runs outside the scheduler are out of scope
                    // for this Node: the operator forces a run by clearing
                    // this site's `next_run_at` bookkeeping via Master.
                    tracing::info!(site_id = %command.site_id, "on-demand start command acknowledged");
                }
            }
        }
    }
}
