// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Master settings, loaded through the same tiered
//! `fleet_backup_bootstrap::config::load_layered` layering the Node uses
//! (§9 open question resolution #3). `retention_grace` and `drift_threshold`
//! are the two settings resolution #2 calls out explicitly; every other
//! field has its own hardcoded default so a bare, mostly-empty config file
//! is enough to start the daemon.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_bind_address() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_database_path() -> String {
    "/var/lib/fleet-backup-master/master.sqlite3".to_string()
}

fn default_retention_grace_days() -> i64 {
    7
}

fn default_drift_threshold() -> f64 {
    0.01
}

fn default_reconciliation_interval_secs() -> u64 {
    3600
}

fn default_retention_sweep_interval_secs() -> u64 {
    900
}

fn default_token_ttl_minutes() -> i64 {
    60
}

fn default_join_rate_limit_per_minute() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MasterSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Base64-or-plain secret the whole process derives both its JWT
    /// signing key and its credential-seal keys from. Rotation is driven by
    /// bumping `seal_key_generation`, not by changing this value.
    pub master_secret: String,
    #[serde(default)]
    pub seal_key_generation: u32,
    #[serde(default = "default_token_ttl_minutes")]
    pub token_ttl_minutes: i64,
    #[serde(default = "default_retention_grace_days")]
    pub retention_grace_days: i64,
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: f64,
    #[serde(default = "default_reconciliation_interval_secs")]
    pub reconciliation_interval_secs: u64,
    #[serde(default = "default_retention_sweep_interval_secs")]
    pub retention_sweep_interval_secs: u64,
    #[serde(default = "default_join_rate_limit_per_minute")]
    pub join_rate_limit_per_minute: u32,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for MasterSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            database_path: default_database_path(),
            master_secret: String::new(),
            seal_key_generation: 0,
            token_ttl_minutes: default_token_ttl_minutes(),
            retention_grace_days: default_retention_grace_days(),
            drift_threshold: default_drift_threshold(),
            reconciliation_interval_secs: default_reconciliation_interval_secs(),
            retention_sweep_interval_secs: default_retention_sweep_interval_secs(),
            join_rate_limit_per_minute: default_join_rate_limit_per_minute(),
            log_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_settings_resolution_values() {
        let settings = MasterSettings::default();
        assert_eq!(settings.retention_grace_days, 7);
        assert_eq!(settings.drift_threshold, 0.01);
    }
}
