#![forbid(unsafe_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use deepcheck_kernel_contracts::account::{Password, StoredCredential};
use deepcheck_kernel_contracts::ContractViolation;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

const SALT_LEN: usize = 16;

/// Seals a password as `sha256(salt || password)` with a fresh random salt.
pub fn seal_password(password: &Password) -> Result<StoredCredential, ContractViolation> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    StoredCredential::salted_sha256(
        BASE64.encode(salt),
        salted_digest_hex(&salt, password.expose()),
    )
}

pub fn verify_password(stored: &StoredCredential, candidate: &str) -> bool {
    match stored {
        StoredCredential::SaltedSha256 {
            salt_b64,
            digest_hex,
        } => {
            let Ok(salt) = BASE64.decode(salt_b64.as_bytes()) else {
                return false;
            };
            constant_time_eq(
                salted_digest_hex(&salt, candidate).as_bytes(),
                digest_hex.to_ascii_lowercase().as_bytes(),
            )
        }
        StoredCredential::Legacy(raw) => constant_time_eq(raw.as_bytes(), candidate.as_bytes()),
    }
}

fn salted_digest_hex(salt: &[u8], password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
