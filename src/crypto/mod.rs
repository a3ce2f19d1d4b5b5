//! Cryptographic utilities for the multisig engine
//!
//! This module provides:
//! - SHA-256 content hashing for digest-only transactions
//! - ECDSA key management (secp256k1) for owner identities
//! - Signed-message verification used when migrating key-controlled accounts
//! - Base58Check address encoding

pub mod hash;
pub mod keys;

pub use hash::{base58check, double_sha256, hash, sha256, sha256_hex, Digest32, DIGEST_LENGTH};
pub use keys::{
    public_key_from_hex, public_key_to_address, sign_message, verify_signature,
    verify_signed_message, KeyError, KeyPair, SignatureScheme,
};
