// /////////////////////////////////////////////////////////////////////////////
// Fleet Backup Control Plane
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Bearer token issuance and verification (§6.1, §6.2). Claims carry the
//! user id, role, issued-at/expiry, and a `scope` that distinguishes a
//! fully-authenticated session from one still pending its second MFA factor
//! - a token with `scope: mfa-pending` authenticates the holder but must be
//! rejected by every handler except the one that completes MFA.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use fleet_backup_domain::error::BackupError;
use fleet_backup_domain::value_objects::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    NodeAdmin,
    SiteAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Full,
    MfaPending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
    pub scope: Scope,
}

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], token_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            token_ttl,
        }
    }

    pub fn issue(&self, user_id: UserId, role: Role, scope: Scope) -> Result<String, BackupError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: (now + self.token_ttl).timestamp(),
            scope,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| BackupError::fatal(format!("failed to issue bearer token: {err}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, BackupError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| BackupError::validation(format!("invalid bearer token: {err}")))
    }

    /// Rejects tokens whose scope is anything but `Full` - handlers that are
    /// reachable mid-MFA should call `verify` directly instead.
    pub fn verify_fully_authenticated(&self, token: &str) -> Result<Claims, BackupError> {
        let claims = self.verify(token)?;
        if claims.scope != Scope::Full {
            return Err(BackupError::validation("token has not completed multi-factor authentication"));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_verify_back_to_the_same_claims() {
        let issuer = TokenIssuer::new(b"test-secret-at-least-this-long", Duration::minutes(15));
        let user_id = UserId::new();
        let token = issuer.issue(user_id, Role::SiteAdmin, Scope::Full).unwrap();

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.role, Role::SiteAdmin);
    }

    #[test]
    fn mfa_pending_tokens_are_rejected_by_verify_fully_authenticated() {
        let issuer = TokenIssuer::new(b"test-secret-at-least-this-long", Duration::minutes(15));
        let token = issuer.issue(UserId::new(), Role::SuperAdmin, Scope::MfaPending).unwrap();

        assert!(issuer.verify(&token).is_ok());
        assert!(issuer.verify_fully_authenticated(&token).is_err());
    }

    #[test]
    fn a_token_signed_under_a_different_secret_is_rejected() {
        let issuer_a = TokenIssuer::new(b"secret-a-is-long-enough", Duration::minutes(15));
        let issuer_b = TokenIssuer::new(b"secret-b-is-also-long-enough", Duration::minutes(15));
        let token = issuer_a.issue(UserId::new(), Role::NodeAdmin, Scope::Full).unwrap();

        assert!(issuer_b.verify(&token).is_err());
    }
}
