// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Node API key hashing and verification (§4.4, §6.1). Keys are hashed with
//! Argon2 under a random per-key salt, stored as `"{salt_hex}:{hash_hex}"`,
//! and compared in constant time so a timing side-channel can't leak which
//! prefix of a guessed key is correct.

use argon2::Argon2;
use rand::RngCore;
use subtle::ConstantTimeEq;

use fleet_backup_domain::error::BackupError;

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
/// 256 bits of entropy per §4.4's API key requirement.
const API_KEY_BYTES: usize = 32;

pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    encode_hex(&bytes)
}

pub fn hash_api_key(plain: &str) -> Result<String, BackupError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    let mut hash = [0u8; HASH_LEN];
    Argon2::default()
        .hash_password_into(plain.as_bytes(), &salt, &mut hash)
        .map_err(|err| BackupError::fatal(format!("failed to hash api key: {err}")))?;
    Ok(format!("{}:{}", encode_hex(&salt), encode_hex(&hash)))
}

/// Recomputes the hash under the stored salt and compares in constant time.
/// A malformed stored hash is treated as a non-match rather than an error -
/// there's no action an attacker-facing endpoint should take differently.
pub fn verify_api_key(plain: &str, stored: &str) -> bool {
    let Some((salt_hex, hash_hex)) = stored.split_once(':') else {
        return false;
    };
    let Some(salt) = decode_hex(salt_hex) else {
        return false;
    };
    let Some(expected_hash) = decode_hex(hash_hex) else {
        return false;
    };

    let mut computed = vec![0u8; expected_hash.len()];
    if Argon2::default().hash_password_into(plain.as_bytes(), &salt, &mut computed).is_err() {
        return false;
    }

    computed.ct_eq(&expected_hash).into()
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex(value: &str) -> Option<Vec<u8>> {
    if value.len() % 2 != 0 {
        return None;
    }
    (0..value.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&value[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_the_key_it_was_hashed_from() {
        let key = generate_api_key();
        let hashed = hash_api_key(&key).unwrap();
        assert!(verify_api_key(&key, &hashed));
    }

    #[test]
    fn verify_rejects_a_wrong_key() {
        let hashed = hash_api_key(&generate_api_key()).unwrap();
        assert!(!verify_api_key("not-the-right-key", &hashed));
    }

    #[test]
    fn verify_rejects_a_malformed_stored_hash() {
        assert!(!verify_api_key("anything", "not-valid-hex:either"));
    }

    #[test]
    fn generated_keys_have_the_expected_length_and_are_unique() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_eq!(a.len(), API_KEY_BYTES * 2);
        assert_ne!(a, b);
    }
}
