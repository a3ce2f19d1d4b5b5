//! Cryptographic hashing utilities
//!
//! Provides the SHA-256 based hashing used for payload digests and
//! address derivation.

use sha2::{Digest, Sha256};

/// Length in bytes of a payload digest
pub const DIGEST_LENGTH: usize = 32;

/// A 32-byte content digest
pub type Digest32 = [u8; DIGEST_LENGTH];

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes the fixed-size content digest of a payload
pub fn hash(data: &[u8]) -> Digest32 {
    Sha256::digest(data).into()
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Base58Check encoding: version byte, payload, then the first
/// 4 bytes of the double SHA-256 of both as checksum
pub fn base58check(version: u8, payload: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(payload.len() + 5);
    bytes.push(version);
    bytes.extend_from_slice(payload);

    let checksum = double_sha256(&bytes);
    bytes.extend_from_slice(&checksum[..4]);

    bs58::encode(bytes).into_string()
}
