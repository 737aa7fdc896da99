// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging Setup
//!
//! Initializes the global `tracing` subscriber for both binaries:
//!
//! - a human-readable (or, with `--json`, JSON) layer on stdout filtered by
//!   `RUST_LOG` (falling back to `GlobalArgs::default_filter`);
//! - a second, error-only layer duplicated to `errors.log` in the log
//!   directory (§6.4) so operators can tail failures without wading through
//!   info-level noise.
//!
//! File appenders are daily-rolling (`tracing_appender::rolling::daily`);
//! the returned `WorkerGuard`s must be held for the process lifetime or
//! buffered log lines are dropped on exit.

use std::path::Path;

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use fleet_backup_domain::error::BackupError;

/// Holds the non-blocking file appender workers; drop it only at process
/// exit.
pub struct LoggerGuard {
    _main: Option<tracing_appender::non_blocking::WorkerGuard>,
    _errors: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub fn init(log_dir: Option<&Path>, json: bool, default_filter: &str) -> Result<LoggerGuard, BackupError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stdout_layer = if json {
        fmt::layer().json().with_filter(env_filter).boxed()
    } else {
        fmt::layer().with_filter(env_filter).boxed()
    };

    let (file_layer, main_guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "fleet-backup.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = if json {
                fmt::layer().json().with_writer(writer).boxed()
            } else {
                fmt::layer().with_writer(writer).boxed()
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let (error_layer, error_guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "errors.log");
            let (writer, guard) = tracing_appender::non_blocking(appender.with_max_level(tracing::Level::WARN));
            let layer = fmt::layer().with_writer(writer).with_filter(EnvFilter::new("warn")).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(error_layer)
        .try_init()
        .map_err(|err| BackupError::internal(format!("failed to install tracing subscriber: {err}")))?;

    Ok(LoggerGuard {
        _main: main_guard,
        _errors: error_guard,
    })
}
