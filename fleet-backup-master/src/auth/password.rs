// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Operator password hashing (§6.2), the same Argon2 raw-hash-plus-salt
//! scheme `api_key` uses for node keys - same crate, same technique, kept as
//! a separate module since passwords and node keys are never compared
//! against each other.

use argon2::Argon2;
use rand::RngCore;
use subtle::ConstantTimeEq;

use fleet_backup_domain::error::BackupError;

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

pub fn hash_password(plain: &str) -> Result<String, BackupError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    let mut hash = [0u8; HASH_LEN];
    Argon2::default()
        .hash_password_into(plain.as_bytes(), &salt, &mut hash)
        .map_err(|err| BackupError::fatal(format!("failed to hash password: {err}")))?;
    Ok(format!("{}:{}", encode_hex(&salt), encode_hex(&hash)))
}

pub fn verify_password(plain: &str, stored: &str) -> bool {
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
    fn verify_accepts_the_matching_password_and_rejects_others() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }
}
