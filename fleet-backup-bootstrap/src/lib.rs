// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

// Production code safety enforced via CI and `make lint-strict`
// (lib/bins checked separately from tests - tests may use unwrap/expect)

//! # Bootstrap Module
//!
//! Sits outside the domain/engine layers and is shared by both the
//! `fleet-backup-node` and `fleet-backup-master` binaries:
//!
//! - **CLI** - common flags (config path, log format, log directory)
//! - **Logging** - tracing setup with human and JSON layers, plus a
//!   duplicated error-only log file (§6.4)
//! - **Configuration** - the tiered global > node > site settings loader
//!   (§9 open question resolution 3)
//! - **Signals** - SIGINT/SIGTERM handling
//! - **Shutdown** - cancellation token propagation with a grace period
//! - **Exit codes** - mapping `BackupError` kinds to process exit status
//!
//! Neither binary's domain logic depends on this crate; only `main.rs` does.

pub mod cli;
pub mod config;
pub mod exit_code;
pub mod logger;
pub mod shutdown;
pub mod signals;

pub use cli::GlobalArgs;
pub use exit_code::{error_to_exit_code, ExitCode};
pub use shutdown::{CancellationToken, ShutdownCoordinator};
