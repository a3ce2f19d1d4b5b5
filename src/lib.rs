//! Multisig engine: K-of-N shared accounts over a ledger substrate
//!
//! This crate provides:
//! - Multisig accounts with an ordered owner set and approval threshold
//! - A strictly FIFO queue of proposed transactions with per-owner votes
//! - Execution and rejection once K owners agree, with implicit votes
//! - Deterministic account derivation and migration of key-controlled accounts
//! - JSON persistence, a CLI and a REST/WebSocket API
//!
//! # Example
//!
//! ```rust
//! use multisig_engine::ledger::InMemoryLedger;
//! use multisig_engine::multisig::{AccountAction, AccountActionExecutor, MultisigManager};
//!
//! let mut ledger = InMemoryLedger::new();
//! let mut manager = MultisigManager::default();
//!
//! // 2-of-3 account
//! let account = manager
//!     .create_with_owners(
//!         &mut ledger,
//!         "alice",
//!         vec!["bob".into(), "carol".into()],
//!         2,
//!         vec![],
//!         vec![],
//!     )
//!     .unwrap();
//!
//! let payload = AccountAction::Noop.encode().unwrap();
//! let seq = manager.propose(&account, "alice", payload).unwrap();
//!
//! // Bob's execution counts as the second approval
//! let report = manager
//!     .execute_next(&account, "bob", &[], &mut AccountActionExecutor)
//!     .unwrap();
//! assert_eq!(report.sequence_number, seq);
//! ```

pub mod api;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod ledger;
pub mod multisig;
pub mod storage;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use config::{EngineConfig, EngineFeatures};
pub use crypto::KeyPair;
pub use ledger::{InMemoryLedger, Ledger};
pub use multisig::{MultisigAccount, MultisigError, MultisigManager};
pub use storage::{EngineState, Storage};
