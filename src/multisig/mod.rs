//! K-of-N shared accounts
//!
//! A multisig account is controlled by a set of owners. Any owner may
//! propose a transaction; once K owners approve, an owner executes it, and
//! once K owners reject, an owner removes it. Transactions resolve strictly
//! in proposal order.
//!
//! # Example
//!
//! ```ignore
//! use multisig_engine::ledger::InMemoryLedger;
//! use multisig_engine::multisig::{AccountActionExecutor, MultisigManager};
//!
//! let mut ledger = InMemoryLedger::new();
//! let mut manager = MultisigManager::default();
//!
//! // 2-of-3 account created by alice
//! let account =
//!     manager.create_with_owners(&mut ledger, &alice, vec![bob, carol], 2, vec![], vec![])?;
//!
//! let seq = manager.propose(&account, &alice, payload)?;
//! manager.approve(&account, &bob, seq)?;
//! manager.execute_next(&account, &bob, &[], &mut AccountActionExecutor)?;
//! ```

pub mod account;
pub mod action;
pub mod creation;
pub mod error;
pub mod events;
pub mod manager;
pub mod resolution;
pub mod transaction;

pub use account::{MultisigAccount, SchemaChange};
pub use action::{AccountAction, AccountActionExecutor, PayloadExecutor};
pub use creation::{CreationMessage, MigrationRequest};
pub use error::{ErrorKind, MultisigError, MultisigResult};
pub use events::{EventKind, MultisigEvent};
pub use manager::{ExecutionOutcome, ExecutionReport, MultisigManager};
pub use resolution::ExecutionError;
pub use transaction::{MultisigTransaction, TransactionPayload, VoteTally};
