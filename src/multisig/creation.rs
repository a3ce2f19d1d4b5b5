//! Converting an existing key-controlled account into a multisig account

use crate::crypto::SignatureScheme;
use serde::{Deserialize, Serialize};

/// Domain tag prefixed to every creation message
const CREATION_MESSAGE_DOMAIN: &[u8] = b"multisig_account::creation";

/// Message the current key holder signs to authorize a conversion.
///
/// Binding the account's sequence number makes a signature single-use.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreationMessage<'a> {
    pub account: &'a str,
    pub sequence_number: u64,
    pub owners: &'a [String],
    pub threshold: usize,
}

impl<'a> CreationMessage<'a> {
    /// Canonical bytes: domain, then each field length-prefixed big-endian
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = CREATION_MESSAGE_DOMAIN.to_vec();
        push_str(&mut bytes, self.account);
        bytes.extend_from_slice(&self.sequence_number.to_be_bytes());
        bytes.extend_from_slice(&(self.owners.len() as u64).to_be_bytes());
        for owner in self.owners {
            push_str(&mut bytes, owner);
        }
        bytes.extend_from_slice(&(self.threshold as u64).to_be_bytes());
        bytes
    }
}

fn push_str(bytes: &mut Vec<u8>, value: &str) {
    bytes.extend_from_slice(&(value.len() as u64).to_be_bytes());
    bytes.extend_from_slice(value.as_bytes());
}

/// Everything needed to convert `account` into a multisig account
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub account: String,
    pub owners: Vec<String>,
    pub threshold: usize,
    pub scheme: SignatureScheme,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    /// Signature over [`CreationMessage::to_bytes`]
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    #[serde(default)]
    pub metadata_keys: Vec<String>,
    #[serde(default)]
    pub metadata_values: Vec<Vec<u8>>,
    /// Disable the original key once the account is converted
    #[serde(default)]
    pub revoke_key: bool,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
