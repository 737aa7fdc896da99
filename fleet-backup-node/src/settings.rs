// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Node daemon settings, loaded through the tiered global>node>site layering
//! (§9 open question resolution #3) via
//! `fleet_backup_bootstrap::config::load_layered`. WordPress install paths
//! are host-local facts no central store can know, so they live here
//! alongside the schedule and (optionally) explicit DB credentials, keyed
//! by the site's opaque id as assigned by Master when the site was
//! registered through its (out of scope) CRUD surface.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use fleet_backup_domain::entities::DbCredentials;
use fleet_backup_domain::value_objects::Schedule;

fn default_temp_root() -> PathBuf {
    PathBuf::from("/var/tmp/wp-backup-work")
}

fn default_crash_recovery_grace_secs() -> u64 {
    3600
}

fn default_command_poll_interval_secs() -> u64 {
    15
}

fn default_dump_timeout_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteConfig {
    pub site_id: String,
    pub name: String,
    pub wp_config_path: PathBuf,
    pub wp_content_path: PathBuf,
    pub db_credentials: Option<DbCredentials>,
    #[serde(default)]
    pub schedule: Schedule,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceSettings {
    #[serde(default = "default_io_permits")]
    pub io_permits: usize,
    #[serde(default = "default_network_permits")]
    pub network_permits: usize,
    #[serde(default)]
    pub cpu_workers: Option<usize>,
    #[serde(default)]
    pub upload_bandwidth_bytes_per_sec: u64,
}

fn default_io_permits() -> usize {
    2
}

fn default_network_permits() -> usize {
    1
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            io_permits: default_io_permits(),
            network_permits: default_network_permits(),
            cpu_workers: None,
            upload_bandwidth_bytes_per_sec: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeSettings {
    pub master_url: String,
    pub hostname: String,
    pub advertised_address: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Assigned by Master on enrollment and persisted back into this file;
    /// identifies this Node in object-store paths and command polling.
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default = "default_temp_root")]
    pub temp_root: PathBuf,
    #[serde(default = "default_crash_recovery_grace_secs")]
    pub crash_recovery_grace_secs: u64,
    #[serde(default = "default_command_poll_interval_secs")]
    pub command_poll_interval_secs: u64,
    /// How long `dump_db` waits for `mysqldump` before killing it and
    /// failing the stage (§4.1 per-stage subprocess timeout).
    #[serde(default = "default_dump_timeout_secs")]
    pub dump_timeout_secs: u64,
    #[serde(default)]
    pub resource: ResourceSettings,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}
