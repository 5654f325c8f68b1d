//! Keyed pseudonyms for hashed fields.
//!
//! A hashed field is replaced by `[HASH:<key_id>:<hex>]`, the truncated
//! HMAC-SHA256 of its text form. The same input under the same key always
//! yields the same pseudonym, so masked identifiers stay correlatable across
//! records without being reversible.

use crate::error::{RedactError, Result};
use crate::value::Value;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

/// Bytes of HMAC output kept in a pseudonym (16 hex chars).
pub const DEFAULT_TRUNCATION_BYTES: usize = 8;

/// Key identifier used when the engine generates its own key.
pub const EPHEMERAL_KEY_ID: &str = "ephemeral";

/// HMAC-SHA256 key.
#[derive(Clone)]
pub struct KeyMaterial {
    key: [u8; 32],
    /// Identifier embedded in every pseudonym.
    pub key_id: String,
}

impl KeyMaterial {
    /// Random key, valid for the lifetime of the engine that holds it.
    pub fn generate(key_id: &str) -> Result<Self> {
        let mut key = [0u8; 32];
        getrandom::getrandom(&mut key)
            .map_err(|e| RedactError::Key(format!("failed to generate random key: {}", e)))?;
        Ok(Self::from_bytes(key, key_id))
    }

    pub fn from_bytes(key: [u8; 32], key_id: &str) -> Self {
        Self {
            key,
            key_id: key_id.to_string(),
        }
    }

    /// Decode a base64 key; it must be exactly 32 bytes.
    pub fn from_base64(encoded: &str, key_id: &str) -> Result<Self> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| RedactError::Key(format!("invalid base64: {}", e)))?;

        let key: [u8; 32] = decoded.as_slice().try_into().map_err(|_| {
            RedactError::Key(format!("key must be 32 bytes, got {}", decoded.len()))
        })?;
        Ok(Self::from_bytes(key, key_id))
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.key)
    }

    /// Pseudonym for a piece of text.
    pub fn hash(&self, input: &str, truncation_bytes: usize) -> String {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(input.as_bytes());
        let digest = mac.finalize().into_bytes();

        let trunc = truncation_bytes.clamp(4, 32);
        format!("[HASH:{}:{}]", self.key_id, hex::encode(&digest[..trunc]))
    }

    /// Pseudonym for a value's text form.
    pub fn hash_value(&self, value: &Value) -> Value {
        Value::String(self.hash(&value.to_text(), DEFAULT_TRUNCATION_BYTES))
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("key_id", &self.key_id)
            .field("key", &"<redacted>")
            .finish()
    }
}
