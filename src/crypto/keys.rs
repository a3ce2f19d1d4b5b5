//! ECDSA key management for owner identities
//!
//! Provides key pair generation, signing, and verification using
//! the secp256k1 elliptic curve, plus the signed-message check that
//! proves control of a key-based account during migration.

use rand::rngs::OsRng;
use ripemd::Ripemd160;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::Digest;
use thiserror::Error;

use super::hash::{base58check, sha256};

/// Version byte for key-controlled account addresses
const KEY_ADDRESS_VERSION: u8 = 0x00;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// Signature schemes accepted for signed-message verification
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    /// Compact ECDSA signature over secp256k1, compressed public key
    Secp256k1Ecdsa,
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Get the public key as a hex string (compressed format)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Compressed public key bytes
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.serialize().to_vec()
    }

    /// The identity controlled by this key
    pub fn address(&self) -> String {
        public_key_to_address(&self.public_key)
    }

    /// Sign a message (hashed to 32 bytes if needed)
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        sign_message(&self.secret_key, message)
    }

    /// Verify a signature against this key pair's public key
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<bool, KeyError> {
        verify_signature(&self.public_key, message, signature)
    }
}

/// Convert a public key to an account address
///
/// Base58Check(0x00 || RIPEMD160(SHA256(pubkey)))
pub fn public_key_to_address(public_key: &PublicKey) -> String {
    let sha256_hash = sha256(&public_key.serialize());

    let mut ripemd = Ripemd160::new();
    ripemd.update(&sha256_hash);
    let ripemd_hash = ripemd.finalize();

    base58check(KEY_ADDRESS_VERSION, &ripemd_hash)
}

/// Parse a public key from hex string
pub fn public_key_from_hex(hex_key: &str) -> Result<PublicKey, KeyError> {
    let bytes = hex::decode(hex_key).map_err(|_| KeyError::InvalidPublicKey)?;
    PublicKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPublicKey)
}

fn message_digest(message: &[u8]) -> Result<Message, KeyError> {
    let hash = if message.len() == 32 {
        message.to_vec()
    } else {
        sha256(message)
    };
    Ok(Message::from_digest_slice(&hash)?)
}

/// Sign a message with a secret key
pub fn sign_message(secret_key: &SecretKey, message: &[u8]) -> Result<Vec<u8>, KeyError> {
    let secp = Secp256k1::new();
    let message = message_digest(message)?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    Ok(signature.serialize_compact().to_vec())
}

/// Verify a signature against a public key
pub fn verify_signature(
    public_key: &PublicKey,
    message: &[u8],
    signature: &[u8],
) -> Result<bool, KeyError> {
    let secp = Secp256k1::new();
    let message = message_digest(message)?;
    let sig = secp256k1::ecdsa::Signature::from_compact(signature)
        .map_err(|_| KeyError::InvalidSignature)?;

    Ok(secp.verify_ecdsa(&message, &sig, public_key).is_ok())
}

/// Verify that `signature` over `message` was produced by the key that
/// controls `identity`.
///
/// Malformed keys or signatures verify as `false`.
pub fn verify_signed_message(
    identity: &str,
    scheme: SignatureScheme,
    public_key: &[u8],
    signature: &[u8],
    message: &[u8],
) -> bool {
    match scheme {
        SignatureScheme::Secp256k1Ecdsa => {
            let Ok(public_key) = PublicKey::from_slice(public_key) else {
                return false;
            };
            if public_key_to_address(&public_key) != identity {
                return false;
            }
            verify_signature(&public_key, message, signature).unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_pair_generation() {
        let kp = KeyPair::generate();
        assert!(!kp.private_key_hex().is_empty());
        assert_eq!(kp.public_key_bytes().len(), 33);
        assert!(!kp.address().is_empty());
    }

    #[test]
    fn test_sign_and_verify() {
        let kp = KeyPair::generate();
        let message = b"Hello, multisig!";

        let signature = kp.sign(message).unwrap();
        assert!(kp.verify(message, &signature).unwrap());
        assert!(!kp.verify(b"other message", &signature).unwrap());
    }

    #[test]
    fn test_key_pair_from_hex() {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::from_private_key_hex(&kp1.private_key_hex()).unwrap();
        assert_eq!(kp1.public_key_hex(), kp2.public_key_hex());
        assert_eq!(kp1.address(), kp2.address());
        assert!(KeyPair::from_private_key_hex("zz").is_err());
    }

    #[test]
    fn test_address_format() {
        let kp = KeyPair::generate();
        assert!(kp.address().starts_with('1'));
    }

    #[test]
    fn test_verify_signed_message() {
        let kp = KeyPair::generate();
        let message = b"create multisig";
        let signature = kp.sign(message).unwrap();
        let scheme = SignatureScheme::Secp256k1Ecdsa;

        assert!(verify_signed_message(
            &kp.address(),
            scheme,
            &kp.public_key_bytes(),
            &signature,
            message
        ));

        // Wrong identity for the key
        let other = KeyPair::generate();
        assert!(!verify_signed_message(
            &other.address(),
            scheme,
            &kp.public_key_bytes(),
            &signature,
            message
        ));

        // Garbage key and signature
        assert!(!verify_signed_message(
            &kp.address(),
            scheme,
            &[1, 2, 3],
            &signature,
            message
        ));
        assert!(!verify_signed_message(
            &kp.address(),
            scheme,
            &kp.public_key_bytes(),
            &[0u8; 10],
            message
        ));
    }
}
