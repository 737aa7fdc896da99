// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Storage provider entity (§3). `sealed_access_key`/`sealed_secret_key`
//! hold ciphertext only - see `fleet_backup_domain::services::seal` for the
//! port that turns these into plaintext, and the `fleet-backup-master`
//! `seal` module for the AEAD implementation.

use serde::{Deserialize, Serialize};

use crate::value_objects::{ByteSize, StorageProviderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    S3Compatible,
    Local,
}

/// AEAD ciphertext plus the nonce and the key generation used to seal it,
/// so rotation (§4.4) can be tried in order: current generation, then the
/// previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedSecret {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; 12],
    pub key_generation: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageProvider {
    pub id: StorageProviderId,
    pub provider_type: ProviderType,
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub sealed_access_key: SealedSecret,
    pub sealed_secret_key: SealedSecret,
    pub storage_limit_bytes: ByteSize,
    pub storage_used_bytes: ByteSize,
    pub is_default: bool,
    pub is_active: bool,
}
