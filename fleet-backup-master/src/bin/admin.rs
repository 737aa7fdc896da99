// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! The operator admin CLI (§6.6): user management, node approval, storage
//! provider provisioning, and quota administration, run against the same
//! SQLite store the daemon serves from. Every mutating subcommand writes an
//! activity log entry under a synthetic "admin-cli" actor, so the audit
//! trail records operator actions taken from the CLI the same way it
//! records ones taken through the REST API.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use fleet_backup_bootstrap::{config, error_to_exit_code, logger, GlobalArgs};
use fleet_backup_domain::entities::{ActivityLogEntry, ProviderType, SealedSecret, StorageProvider};
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::value_objects::{ByteSize, NodeId, SiteId, StorageProviderId, UserId};

use fleet_backup_master::auth::password::hash_password;
use fleet_backup_master::enrollment::EnrollmentService;
use fleet_backup_master::repositories::{
    SqliteActivityLogRepository, SqliteNodeRepository, SqliteSiteRepository, SqliteStorageProviderRepository,
    SqliteUserRepository,
};
use fleet_backup_master::schema::initialize_database;
use fleet_backup_master::seal::RotatingSealer;
use fleet_backup_master::settings::MasterSettings;

/// The synthetic actor id every CLI-driven activity log entry is attributed
/// to, since the CLI runs outside any operator's authenticated session.
fn admin_cli_actor() -> UserId {
    UserId::parse("00000000-0000-0000-0000-000000000000").expect("nil uuid is a valid UserId")
}

#[derive(Debug, Parser)]
#[command(name = "fleet-backup-master-admin", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Lists every operator account.
    ListUsers,
    /// Sets a new password for an existing operator account.
    ResetPassword {
        email: String,
        #[arg(long)]
        password: String,
    },
    /// Turns off MFA for an account that has locked itself out.
    DisableMfa { email: String },
    /// Approves a pending node, printing the API key it should be given.
    ApproveNode { node_id: String },
    /// Registers a new storage provider.
    AddStorageProvider {
        #[arg(long, value_enum)]
        provider_type: CliProviderType,
        #[arg(long)]
        endpoint: String,
        #[arg(long, default_value = "")]
        region: String,
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        access_key: String,
        #[arg(long)]
        secret_key: String,
        #[arg(long)]
        storage_limit_gb: u64,
        #[arg(long)]
        make_default: bool,
    },
    /// Sets a node's or a site's storage quota, in bytes.
    SetQuota {
        #[arg(value_enum)]
        target: QuotaTarget,
        id: String,
        bytes: u64,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliProviderType {
    S3Compatible,
    Local,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum QuotaTarget {
    Node,
    Site,
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
            eprintln!("error: {err}");
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

    let pool = initialize_database(&settings.database_path).await.map_err(|err| BackupError::database(err.to_string()))?;
    let activity_log = SqliteActivityLogRepository::new(pool.clone());

    match cli.command {
        Command::ListUsers => {
            let users = SqliteUserRepository::new(pool.clone());
            for user in users.list_all().await? {
                println!("{}\t{}\t{:?}\tmfa={}", user.id, user.email, user.role, user.mfa_enabled);
            }
        }

        Command::ResetPassword { email, password } => {
            let users = SqliteUserRepository::new(pool.clone());
            let mut user = users
                .find_by_email(&email)
                .await?
                .ok_or_else(|| BackupError::not_found(format!("no user with email '{email}'")))?;
            user.password_hash = hash_password(&password)?;
            users.update(&user).await?;
            activity_log
                .append(ActivityLogEntry::new(admin_cli_actor(), "reset_password", email.clone(), ""))
                .await?;
            println!("password reset for {email}");
        }

        Command::DisableMfa { email } => {
            let users = SqliteUserRepository::new(pool.clone());
            let mut user = users
                .find_by_email(&email)
                .await?
                .ok_or_else(|| BackupError::not_found(format!("no user with email '{email}'")))?;
            user.mfa_enabled = false;
            user.mfa_secret = None;
            users.update(&user).await?;
            activity_log
                .append(ActivityLogEntry::new(admin_cli_actor(), "disable_mfa", email.clone(), ""))
                .await?;
            println!("mfa disabled for {email}");
        }

        Command::ApproveNode { node_id } => {
            let node_id = NodeId::parse(&node_id)?;
            let nodes = std::sync::Arc::new(SqliteNodeRepository::new(pool.clone()));
            let enrollment = EnrollmentService::new(nodes);
            let approval = enrollment.approve(node_id).await?;
            activity_log
                .append(ActivityLogEntry::new(admin_cli_actor(), "approve_node", node_id.to_string(), ""))
                .await?;
            println!("node {node_id} approved, api key: {}", approval.api_key);
        }

        Command::AddStorageProvider {
            provider_type,
            endpoint,
            region,
            bucket,
            access_key,
            secret_key,
            storage_limit_gb,
            make_default,
        } => {
            let sealer = RotatingSealer::from_secret(settings.master_secret.as_bytes(), settings.seal_key_generation)?;
            let sealed_access_key = seal_string(&sealer, &access_key).await?;
            let sealed_secret_key = seal_string(&sealer, &secret_key).await?;

            let providers = SqliteStorageProviderRepository::new(pool.clone());
            let provider = StorageProvider {
                id: StorageProviderId::new(),
                provider_type: match provider_type {
                    CliProviderType::S3Compatible => ProviderType::S3Compatible,
                    CliProviderType::Local => ProviderType::Local,
                },
                endpoint,
                region,
                bucket,
                sealed_access_key,
                sealed_secret_key,
                storage_limit_bytes: ByteSize::gib(storage_limit_gb),
                storage_used_bytes: ByteSize::ZERO,
                is_default: make_default,
                is_active: true,
            };
            providers.insert(&provider).await?;
            activity_log
                .append(ActivityLogEntry::new(admin_cli_actor(), "add_storage_provider", provider.id.to_string(), ""))
                .await?;
            println!("storage provider {} registered", provider.id);
        }

        Command::SetQuota { target, id, bytes } => match target {
            QuotaTarget::Node => {
                let nodes = SqliteNodeRepository::new(pool.clone());
                let node_id = NodeId::parse(&id)?;
                let mut node = nodes
                    .find_by_id(node_id)
                    .await?
                    .ok_or_else(|| BackupError::not_found(format!("node {node_id} not found")))?;
                node.storage_quota_bytes = ByteSize::from_bytes(bytes);
                nodes.update(&node).await?;
                activity_log
                    .append(ActivityLogEntry::new(admin_cli_actor(), "set_node_quota", node_id.to_string(), ""))
                    .await?;
                println!("node {node_id} quota set to {bytes} bytes");
            }
            QuotaTarget::Site => {
                let sites = SqliteSiteRepository::new(pool.clone());
                let site_id = SiteId::parse(&id)?;
                let mut site = sites
                    .find_by_id(site_id)
                    .await?
                    .ok_or_else(|| BackupError::not_found(format!("site {site_id} not found")))?;
                site.storage_quota_bytes = ByteSize::from_bytes(bytes);
                sites.update(&site).await?;
                activity_log
                    .append(ActivityLogEntry::new(admin_cli_actor(), "set_site_quota", site_id.to_string(), ""))
                    .await?;
                println!("site {site_id} quota set to {bytes} bytes");
            }
        },
    }

    Ok(())
}

async fn seal_string(sealer: &RotatingSealer, plain: &str) -> Result<SealedSecret, BackupError> {
    use fleet_backup_domain::services::seal::SecretSealer;
    sealer.seal(plain.as_bytes()).await
}
