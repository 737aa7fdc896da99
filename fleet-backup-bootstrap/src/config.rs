// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Layered Settings Loader
//!
//! Both binaries resolve settings the same way (§9 open question
//! resolution 3): a global settings file, optionally overridden by a
//! node-local file, optionally overridden by per-site overrides the caller
//! supplies as an in-memory layer. The most specific layer wins per field;
//! any field absent from every layer falls back to the `Default` the
//! binary's own settings struct provides.
//!
//! This module only assembles the layered `config::Config`; each binary
//! defines and deserializes its own settings struct (`NodeSettings`,
//! `MasterSettings`) from the result, since the two processes' shapes
//! differ.

use std::path::Path;

use config::{Config, File, FileFormat};
use serde::de::DeserializeOwned;

use fleet_backup_domain::error::BackupError;

/// Layers, most general first. Missing files are skipped rather than
/// treated as an error - only a present-but-unparsable file is fatal.
pub fn load_layered<T: DeserializeOwned>(layers: &[&Path]) -> Result<T, BackupError> {
    let mut builder = Config::builder();
    for path in layers {
        if path.exists() {
            builder = builder.add_source(File::from(*path).format(FileFormat::Yaml).required(false));
        }
    }
    let config = builder
        .build()
        .map_err(|err| BackupError::config(format!("failed to assemble layered settings: {err}")))?;

    config
        .try_deserialize()
        .map_err(|err| BackupError::config(format!("failed to parse settings: {err}")))
}
