//! Unguessable read-only links to a single quote.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::errors::DomainError;

pub const TOKEN_BYTES: usize = 32;
pub const DEFAULT_TOKEN_EXPIRY_DAYS: u32 = 30;
const ENCODED_LEN: usize = 43;
const LOG_PREFIX_LEN: usize = 8;

/// Opaque credential. `Debug` shows only a short prefix so tokens never
/// reach logs in full.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ShareToken(String);

impl ShareToken {
    /// 32 bytes from the OS RNG, base64url without padding.
    pub fn generate() -> Self {
        let mut bytes = [0_u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Accepts only strings shaped like a minted token, so malformed input
    /// is rejected before reaching the store.
    pub fn parse(raw: &str) -> Option<Self> {
        let well_formed = raw.len() == ENCODED_LEN
            && raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        well_formed.then(|| Self(raw.to_owned()))
    }

    /// Wraps a value read back from storage.
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn log_prefix(&self) -> &str {
        self.0.get(..LOG_PREFIX_LEN).unwrap_or(&self.0)
    }
}

impl fmt::Debug for ShareToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShareToken({}…)", self.log_prefix())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShareGrant {
    pub token: ShareToken,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ShareGrant {
    pub fn issue(now: DateTime<Utc>, expiry_days: u32) -> Self {
        Self {
            token: ShareToken::generate(),
            expires_at: Some(now + Duration::days(i64::from(expiry_days))),
        }
    }

    /// A grant without a stored expiry never lapses; otherwise it stays valid
    /// up to and including the expiry instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now <= expires_at,
            None => true,
        }
    }
}

pub fn validate_expiry_days(days: u32) -> Result<u32, DomainError> {
    if !(1..=365).contains(&days) {
        return Err(DomainError::validation("token_expiry_days", "must be between 1 and 365"));
    }
    Ok(days)
}

/// `<base_url>/view?token=<token>`.
pub fn share_link(base_url: &str, token: &ShareToken) -> String {
    format!("{}/view?token={}", base_url.trim().trim_end_matches('/'), token.as_str())
}
