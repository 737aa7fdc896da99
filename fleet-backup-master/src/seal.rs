// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! `SecretSealer` implementation (§4.4 "Credential seal"): AES-256-GCM with a
//! per-record random nonce, keyed by generations derived from a single
//! process secret via Argon2. Rotation keeps the current generation's key
//! plus exactly one previous generation in memory; records made obsolete by
//! a rotation re-seal lazily the next time they are written, never eagerly.

use std::collections::HashMap;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::Argon2;
use async_trait::async_trait;
use rand::RngCore;

use fleet_backup_domain::entities::SealedSecret;
use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::services::seal::SecretSealer;

pub struct RotatingSealer {
    keys: HashMap<u32, Aes256Gcm>,
    current_generation: u32,
}

impl RotatingSealer {
    /// Derives the current generation's key, plus the previous generation's
    /// when `current_generation > 0`, from `master_secret`. The same secret
    /// and generation always derive the same key, so restarting the process
    /// with an unchanged secret can still unseal existing rows.
    pub fn from_secret(master_secret: &[u8], current_generation: u32) -> Result<Self, BackupError> {
        let mut keys = HashMap::new();
        let oldest = current_generation.saturating_sub(1);
        for generation in oldest..=current_generation {
            keys.insert(generation, derive_cipher(master_secret, generation)?);
            if current_generation == 0 {
                break;
            }
        }
        Ok(Self { keys, current_generation })
    }
}

fn derive_cipher(master_secret: &[u8], generation: u32) -> Result<Aes256Gcm, BackupError> {
    let salt = format!("fleet-backup-control-plane-key-generation-{generation}");
    let mut raw_key = [0u8; 32];
    Argon2::default()
        .hash_password_into(master_secret, salt.as_bytes(), &mut raw_key)
        .map_err(|err| BackupError::fatal(format!("failed to derive seal key for generation {generation}: {err}")))?;
    Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&raw_key)))
}

#[async_trait]
impl SecretSealer for RotatingSealer {
    async fn seal(&self, plaintext: &[u8]) -> Result<SealedSecret, BackupError> {
        let cipher = self
            .keys
            .get(&self.current_generation)
            .ok_or_else(|| BackupError::fatal("current key generation has no derived cipher"))?;

        let mut nonce_bytes = [0u8; 12];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|err| BackupError::fatal(format!("seal failed: {err}")))?;

        Ok(SealedSecret {
            ciphertext,
            nonce: nonce_bytes,
            key_generation: self.current_generation,
        })
    }

    async fn unseal(&self, secret: &SealedSecret) -> Result<Vec<u8>, BackupError> {
        let cipher = self.keys.get(&secret.key_generation).ok_or_else(|| {
            BackupError::integrity(format!(
                "no key available for generation {} (have {:?})",
                secret.key_generation,
                self.keys.keys().collect::<Vec<_>>()
            ))
        })?;

        let nonce = Nonce::from_slice(&secret.nonce);
        cipher
            .decrypt(nonce, secret.ciphertext.as_ref())
            .map_err(|_| BackupError::integrity("unseal failed: ciphertext does not match the recorded key generation"))
    }

    fn current_generation(&self) -> u32 {
        self.current_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unseal_reverses_seal_under_the_same_key() {
        let sealer = RotatingSealer::from_secret(b"a sufficiently long process secret", 0).unwrap();
        let sealed = sealer.seal(b"super-secret-access-key").await.unwrap();
        let opened = sealer.unseal(&sealed).await.unwrap();
        assert_eq!(opened, b"super-secret-access-key");
    }

    #[tokio::test]
    async fn unseal_under_wrong_generation_fails_closed() {
        let sealer = RotatingSealer::from_secret(b"a sufficiently long process secret", 1).unwrap();
        let mut sealed = sealer.seal(b"plaintext").await.unwrap();
        sealed.key_generation = 99;
        assert!(matches!(sealer.unseal(&sealed).await, Err(BackupError::Integrity(_))));
    }

    #[tokio::test]
    async fn rotation_keeps_the_previous_generation_readable() {
        let gen0 = RotatingSealer::from_secret(b"shared master secret value", 0).unwrap();
        let sealed_under_gen0 = gen0.seal(b"old-key-material").await.unwrap();

        let gen1 = RotatingSealer::from_secret(b"shared master secret value", 1).unwrap();
        let opened = gen1.unseal(&sealed_under_gen0).await.unwrap();
        assert_eq!(opened, b"old-key-material");
    }
}
