use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use constant_time_eq::constant_time_eq;
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};

use crate::error::{CatalogError, Result};

/// Opaque bearer token handed to a client once, at login.
///
/// 256 bits from the OS RNG, URL-safe base64 without padding. Only
/// [`hash_token`] of the value is ever persisted.
#[derive(Clone)]
pub struct SessionToken {
    value: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn generate(lifetime: Duration) -> Result<Self> {
        let mut bytes = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CatalogError::internal(format!("token generation failed: {e}")))?;

        let created_at = Utc::now();
        Ok(Self {
            value: URL_SAFE_NO_PAD.encode(bytes),
            created_at,
            expires_at: created_at + lifetime,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn hash(&self) -> String {
        hash_token(&self.value)
    }

    pub fn secure_compare(&self, other: &str) -> bool {
        let ours = self.value.as_bytes();
        let theirs = other.as_bytes();
        ours.len() == theirs.len() && constant_time_eq(ours, theirs)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("value", &format_args!("{self}"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview = self.value.get(..8).unwrap_or(&self.value);
        write!(f, "{preview}...")
    }
}

/// Lookup key for a raw token: lowercase hex SHA-256.
pub fn hash_token(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}
