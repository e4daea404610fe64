//! Opaque bearer credentials.
//!
//! # Purpose
//! Defines the credential record, how tokens are generated, and the checks a
//! credential must pass to authenticate a request or to be redeemed.
//!
//! # Key invariants
//! - Only SHA-256 hex digests are ever stored; plaintext tokens are returned
//!   once at issue time.
//! - Unverified credentials are one-time codes and never authenticate.
//! - A one-time code is consumed by redemption; a second redemption fails
//!   closed because the digest no longer exists or the credential is verified.
//!
//! # Important configuration
//! - [`CredentialPolicy`] carries the one-time code and session lifetimes.
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{AuthzError, AuthzResult};
use crate::types::UserUid;

pub const ONE_TIME_CODE_DIGITS: usize = 8;
const SESSION_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub digest: String,
    pub user_uid: UserUid,
    pub verified: bool,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Checks that this credential may authenticate a request at `now`.
    pub fn check_session(&self, now: DateTime<Utc>) -> AuthzResult<()> {
        if !self.verified {
            return Err(AuthzError::unauthenticated("credential is not verified"));
        }
        if !self.is_live(now) {
            return Err(AuthzError::unauthenticated("credential expired"));
        }
        Ok(())
    }

    /// Checks that this one-time code may be exchanged by `user_uid` at `now`.
    pub fn check_redeemable(&self, user_uid: &UserUid, now: DateTime<Utc>) -> AuthzResult<()> {
        if self.verified {
            return Err(AuthzError::unauthenticated("one-time code already used"));
        }
        if &self.user_uid != user_uid {
            return Err(AuthzError::unauthenticated("one-time code does not match user"));
        }
        if !self.is_live(now) {
            return Err(AuthzError::unauthenticated("one-time code expired"));
        }
        Ok(())
    }
}

/// A freshly issued credential plus the plaintext token the caller receives.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub credential: Credential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialPolicy {
    pub one_time_code_ttl: Duration,
    pub session_ttl: Duration,
}

impl Default for CredentialPolicy {
    fn default() -> Self {
        Self {
            one_time_code_ttl: Duration::hours(24),
            session_ttl: Duration::days(30),
        }
    }
}

impl CredentialPolicy {
    pub fn issue_one_time_code(&self, user_uid: UserUid, now: DateTime<Utc>) -> IssuedToken {
        issue(generate_one_time_code(), user_uid, false, now, self.one_time_code_ttl)
    }

    pub fn issue_session(&self, user_uid: UserUid, now: DateTime<Utc>) -> IssuedToken {
        issue(generate_session_token(), user_uid, true, now, self.session_ttl)
    }
}

fn issue(
    token: String,
    user_uid: UserUid,
    verified: bool,
    now: DateTime<Utc>,
    ttl: Duration,
) -> IssuedToken {
    IssuedToken {
        credential: Credential {
            digest: digest(&token),
            user_uid,
            verified,
            issued_at: now,
            expires_at: now + ttl,
        },
        token,
    }
}

/// Hex-encoded SHA-256 of a plaintext token.
pub fn digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn generate_one_time_code() -> String {
    let mut rng = rand::thread_rng();
    (0..ONE_TIME_CODE_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
