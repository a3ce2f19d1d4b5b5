//! Ledger substrate collaborators
//!
//! The engine never derives identities, verifies signatures or revokes key
//! control itself; it asks a [`Ledger`]. [`InMemoryLedger`] is the
//! implementation used by the CLI, the API and the tests.

pub mod authority;
pub mod memory;

pub use authority::{AuthorityToken, EngineSeal};
pub use memory::{derive_account_address, AccountSeed, InMemoryLedger, LedgerAccount};

use crate::crypto::SignatureScheme;
use thiserror::Error;

/// Ledger errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger account not found: {0}")]
    AccountNotFound(String),
    #[error("Ledger account already exists: {0}")]
    AccountExists(String),
    #[error("Key control of {0} has been revoked")]
    KeyRevoked(String),
}

/// Operations the engine consumes from the ledger substrate
pub trait Ledger {
    /// Derive and create a fresh account from `seed`, returning its identity
    /// and the authority to act as it
    fn create_account(
        &mut self,
        seed: &AccountSeed,
    ) -> Result<(String, AuthorityToken), LedgerError>;

    /// Identity the next account created by `creator` will receive
    fn next_account_address(&self, creator: &str) -> String;

    /// Current nonce (sequence number) of an account
    fn sequence_number(&self, identity: &str) -> u64;

    /// Verify a message signed by the key currently controlling `identity`
    fn verify_signed_message(
        &self,
        identity: &str,
        scheme: SignatureScheme,
        public_key: &[u8],
        signature: &[u8],
        message: &[u8],
    ) -> bool;

    /// Obtain the authority to act as an existing key-controlled account.
    /// Only the engine holds an [`EngineSeal`], after verifying the owner's
    /// signature.
    fn assume_authority(
        &mut self,
        identity: &str,
        seal: EngineSeal,
    ) -> Result<AuthorityToken, LedgerError>;

    /// Permanently disable key-based control of the token's account
    fn revoke(&mut self, token: &AuthorityToken) -> Result<(), LedgerError>;

    /// Identity the token acts as
    fn current_identity_of(&self, token: &AuthorityToken) -> String;
}
