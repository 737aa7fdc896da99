// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Port for sealing/unsealing storage-provider credentials (§4.4 step 4,
//! §4.6). Implementations own the AEAD key material; the domain only knows
//! that `seal` and `unseal` round-trip and that `key_generation` lets a
//! caller retry a previous key after rotation.

use async_trait::async_trait;

use crate::entities::SealedSecret;
use crate::error::BackupError;

#[async_trait]
pub trait SecretSealer: Send + Sync {
    /// Seals `plaintext` under the current key generation.
    async fn seal(&self, plaintext: &[u8]) -> Result<SealedSecret, BackupError>;

    /// Unseals using the generation recorded on the secret itself. Callers
    /// that need rotation fallback (try current, then previous) do so by
    /// calling this twice with a secret whose `key_generation` they adjust -
    /// the sealer itself does not guess.
    async fn unseal(&self, secret: &SealedSecret) -> Result<Vec<u8>, BackupError>;

    /// The generation new seals are written with.
    fn current_generation(&self) -> u32;
}
