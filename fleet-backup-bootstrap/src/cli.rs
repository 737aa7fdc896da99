// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Command-line flags shared by both binaries. Each binary's own `main.rs`
//! flattens this into a larger `clap::Parser` struct with its own
//! subcommands (the Master's admin CLI, §6.6) or node-specific overrides.

use std::path::PathBuf;

use clap::Args;

#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Path to the process's settings file (YAML). Falls back to the
    /// platform default config directory when omitted.
    #[arg(long, env = "FLEET_BACKUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory log files are written to; `none` disables file logging.
    #[arg(long, env = "FLEET_BACKUP_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Emit structured JSON logs instead of human-readable ones.
    #[arg(long, env = "FLEET_BACKUP_LOG_JSON")]
    pub json: bool,

    /// Increase log verbosity; repeatable (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl GlobalArgs {
    /// `RUST_LOG`-style filter directive derived from `-v` count, used when
    /// the environment does not already set one.
    pub fn default_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
