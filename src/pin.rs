//! Employee PIN hashing and verification
//!
//! - 4-digit PIN format check
//! - Salted SHA-256 hashes, hex encoded
//! - Legacy plaintext PINs are accepted once and upgraded to a hash

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

/// Length of a hex encoded SHA-256 digest
pub const HASH_HEX_LEN: usize = 64;

pub const PIN_LENGTH: usize = 4;

/// Check that a PIN is exactly four ASCII digits
pub fn is_valid_pin(pin: &str) -> bool {
    pin.len() == PIN_LENGTH && pin.bytes().all(|b| b.is_ascii_digit())
}

pub fn hash_pin(pin: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pin.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PinCheck {
    Valid {
        /// Hash to store when the stored value was a legacy plaintext PIN
        upgraded_hash: Option<String>,
    },
    Invalid,
}

impl PinCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, PinCheck::Valid { .. })
    }
}

/// Compare a submitted PIN with the stored value
pub fn check_pin(stored: &str, pin: &str, salt: &str) -> PinCheck {
    if !is_valid_pin(pin) {
        return PinCheck::Invalid;
    }

    let provided = hash_pin(pin, salt);

    if stored.len() == HASH_HEX_LEN {
        if bool::from(stored.as_bytes().ct_eq(provided.as_bytes())) {
            return PinCheck::Valid {
                upgraded_hash: None,
            };
        }
        return PinCheck::Invalid;
    }

    if bool::from(stored.as_bytes().ct_eq(pin.as_bytes())) {
        debug!("Legacy plaintext PIN matched, upgrading to hash");
        return PinCheck::Valid {
            upgraded_hash: Some(provided),
        };
    }

    PinCheck::Invalid
}
