//! In-memory ledger substrate
//!
//! Tracks account nonces and which accounts are still controlled by a key.

use crate::crypto::{base58check, public_key_to_address, sha256, SignatureScheme};
use crate::ledger::{AuthorityToken, EngineSeal, Ledger, LedgerError};
use chrono::{DateTime, Utc};
use ripemd::Ripemd160;
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::collections::HashMap;

/// Domain separator mixed into every derived multisig identity
const MULTISIG_DOMAIN_SEPARATOR: &[u8] = b"multisig_account";

/// Version byte for derived (script-style) addresses, encodes to a leading '3'
const DERIVED_ADDRESS_VERSION: u8 = 0x05;

/// Input to deterministic account derivation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSeed {
    pub creator: String,
    pub nonce: u64,
}

/// Derive an account identity from creator and nonce
///
/// Address = Base58Check(0x05 || RIPEMD160(SHA256(domain || creator || nonce)))
pub fn derive_account_address(creator: &str, nonce: u64) -> String {
    let mut data = MULTISIG_DOMAIN_SEPARATOR.to_vec();
    data.extend_from_slice(creator.as_bytes());
    data.extend_from_slice(&nonce.to_be_bytes());

    let mut ripemd = Ripemd160::new();
    ripemd.update(sha256(&data));
    let ripemd_hash = ripemd.finalize();

    base58check(DERIVED_ADDRESS_VERSION, &ripemd_hash)
}

/// A single ledger account
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerAccount {
    /// Identity of the key that controls this account, `None` when the
    /// account has no key control (derived or revoked)
    pub authentication_key: Option<String>,
    /// Nonce, advanced for every account this one creates
    pub sequence_number: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl LedgerAccount {
    fn new(authentication_key: Option<String>) -> Self {
        Self {
            authentication_key,
            sequence_number: 0,
            created_at: Utc::now(),
        }
    }
}

/// Ledger keeping every account in a map
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InMemoryLedger {
    accounts: HashMap<String, LedgerAccount>,
}

impl InMemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
        }
    }

    /// Register an account controlled by `public_key`, returning its identity.
    /// Registering the same key twice is a no-op.
    pub fn register_key_account(&mut self, public_key: &PublicKey) -> String {
        let address = public_key_to_address(public_key);
        self.accounts
            .entry(address.clone())
            .or_insert_with(|| LedgerAccount::new(Some(address.clone())));
        address
    }

    /// Look up an account
    pub fn get(&self, identity: &str) -> Option<&LedgerAccount> {
        self.accounts.get(identity)
    }

    /// Whether a key still controls the account
    pub fn is_key_controlled(&self, identity: &str) -> bool {
        self.accounts
            .get(identity)
            .map(|a| a.authentication_key.is_some())
            .unwrap_or(false)
    }

    /// Number of accounts known to the ledger
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

impl Ledger for InMemoryLedger {
    fn create_account(
        &mut self,
        seed: &AccountSeed,
    ) -> Result<(String, AuthorityToken), LedgerError> {
        let address = derive_account_address(&seed.creator, seed.nonce);
        if self.accounts.contains_key(&address) {
            return Err(LedgerError::AccountExists(address));
        }

        self.accounts
            .insert(address.clone(), LedgerAccount::new(None));

        let creator = self
            .accounts
            .entry(seed.creator.clone())
            .or_insert_with(|| LedgerAccount::new(None));
        creator.sequence_number = creator.sequence_number.max(seed.nonce) + 1;

        log::debug!("Ledger account {} derived from {}", address, seed.creator);

        let token = AuthorityToken::issue(address.clone());
        Ok((address, token))
    }

    fn next_account_address(&self, creator: &str) -> String {
        derive_account_address(creator, self.sequence_number(creator))
    }

    fn sequence_number(&self, identity: &str) -> u64 {
        self.accounts
            .get(identity)
            .map(|a| a.sequence_number)
            .unwrap_or(0)
    }

    fn verify_signed_message(
        &self,
        identity: &str,
        scheme: SignatureScheme,
        public_key: &[u8],
        signature: &[u8],
        message: &[u8],
    ) -> bool {
        let controlled_by_identity = self
            .accounts
            .get(identity)
            .and_then(|a| a.authentication_key.as_deref())
            .map(|key| key == identity)
            .unwrap_or(false);

        controlled_by_identity
            && crate::crypto::verify_signed_message(
                identity, scheme, public_key, signature, message,
            )
    }

    fn assume_authority(
        &mut self,
        identity: &str,
        _seal: EngineSeal,
    ) -> Result<AuthorityToken, LedgerError> {
        let account = self
            .accounts
            .get(identity)
            .ok_or_else(|| LedgerError::AccountNotFound(identity.to_string()))?;

        if account.authentication_key.is_none() {
            return Err(LedgerError::KeyRevoked(identity.to_string()));
        }

        Ok(AuthorityToken::issue(identity))
    }

    fn revoke(&mut self, token: &AuthorityToken) -> Result<(), LedgerError> {
        let account = self
            .accounts
            .get_mut(token.account())
            .ok_or_else(|| LedgerError::AccountNotFound(token.account().to_string()))?;

        account.authentication_key = None;
        log::info!("Key control of {} revoked", token.account());
        Ok(())
    }

    fn current_identity_of(&self, token: &AuthorityToken) -> String {
        token.account().to_string()
    }
}
