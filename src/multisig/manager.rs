//! Multisig account manager
//!
//! Owns every multisig account, creates new ones through the ledger and
//! drives execution. Events produced by successful calls are also queued in
//! an outbox for broadcasting.

use crate::config::{EngineConfig, EngineFeatures};
use crate::ledger::{AccountSeed, EngineSeal, Ledger, LedgerError};
use crate::multisig::account::{MultisigAccount, SchemaChange};
use crate::multisig::action::PayloadExecutor;
use crate::multisig::creation::{CreationMessage, MigrationRequest};
use crate::multisig::error::{MultisigError, MultisigResult};
use crate::multisig::events::MultisigEvent;
use crate::multisig::resolution::ExecutionError;
use crate::multisig::transaction::{MultisigTransaction, TransactionPayload, VoteTally};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How an executed payload ended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded,
    Failed(ExecutionError),
}

/// Result of [`MultisigManager::execute_next`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub sequence_number: u64,
    pub payload: Vec<u8>,
    pub outcome: ExecutionOutcome,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == ExecutionOutcome::Succeeded
    }
}

/// Manager for multisig accounts
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MultisigManager {
    /// Accounts by address
    accounts: HashMap<String, MultisigAccount>,
    #[serde(skip)]
    config: EngineConfig,
    /// Events not yet taken by a subscriber
    #[serde(skip)]
    outbox: Vec<MultisigEvent>,
}

impl MultisigManager {
    /// Create an empty manager
    pub fn new(config: EngineConfig) -> Self {
        Self {
            accounts: HashMap::new(),
            config,
            outbox: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the configuration, e.g. after loading persisted accounts
    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = config;
    }

    /// Drain events produced since the last call
    pub fn take_events(&mut self) -> Vec<MultisigEvent> {
        std::mem::take(&mut self.outbox)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    pub fn get(&self, address: &str) -> Option<&MultisigAccount> {
        self.accounts.get(address)
    }

    /// Look up an account, failing with `AccountNotFound`
    pub fn account(&self, address: &str) -> MultisigResult<&MultisigAccount> {
        self.accounts
            .get(address)
            .ok_or_else(|| MultisigError::AccountNotFound(address.to_string()))
    }

    /// All accounts, ordered by address
    pub fn list_accounts(&self) -> Vec<&MultisigAccount> {
        let mut accounts: Vec<_> = self.accounts.values().collect();
        accounts.sort_by(|a, b| a.address().cmp(b.address()));
        accounts
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_multisig_account(&self, address: &str) -> bool {
        self.accounts.contains_key(address)
    }

    /// Run `op` on an account, queueing the events it emitted on success
    fn apply<T>(
        &mut self,
        address: &str,
        op: impl FnOnce(&mut MultisigAccount, &EngineConfig) -> MultisigResult<T>,
    ) -> MultisigResult<T> {
        let account = self
            .accounts
            .get_mut(address)
            .ok_or_else(|| MultisigError::AccountNotFound(address.to_string()))?;

        let before = account.events().len();
        let result = op(account, &self.config)?;
        self.outbox.extend_from_slice(&account.events()[before..]);

        debug_assert!(account.invariants_hold());
        Ok(result)
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Identity the next account created by `creator` will receive
    pub fn next_account_address<L: Ledger>(&self, ledger: &L, creator: &str) -> String {
        ledger.next_account_address(creator)
    }

    /// Create a 1-of-1 account owned by `creator`
    pub fn create<L: Ledger>(
        &mut self,
        ledger: &mut L,
        creator: &str,
        metadata_keys: Vec<String>,
        metadata_values: Vec<Vec<u8>>,
    ) -> MultisigResult<String> {
        self.create_with_owners(ledger, creator, Vec::new(), 1, metadata_keys, metadata_values)
    }

    /// Create an account owned by `creator` plus `additional_owners`
    pub fn create_with_owners<L: Ledger>(
        &mut self,
        ledger: &mut L,
        creator: &str,
        additional_owners: Vec<String>,
        threshold: usize,
        metadata_keys: Vec<String>,
        metadata_values: Vec<Vec<u8>>,
    ) -> MultisigResult<String> {
        let mut owners = vec![creator.to_string()];
        owners.extend(additional_owners);

        let account = MultisigAccount::new(
            ledger.next_account_address(creator),
            owners,
            threshold,
            metadata_keys,
            metadata_values,
            false,
        )?;
        self.register(ledger, creator, account)
    }

    /// Create an account where `bootstrapper` only pays for creation and is
    /// removed from the owners straight away
    pub fn create_with_owners_then_remove_bootstrapper<L: Ledger>(
        &mut self,
        ledger: &mut L,
        bootstrapper: &str,
        owners: Vec<String>,
        threshold: usize,
        metadata_keys: Vec<String>,
        metadata_values: Vec<Vec<u8>>,
    ) -> MultisigResult<String> {
        let address = ledger.next_account_address(bootstrapper);
        let mut all_owners = vec![bootstrapper.to_string()];
        all_owners.extend(owners);

        let mut account = MultisigAccount::new(
            address.clone(),
            all_owners,
            threshold,
            metadata_keys,
            metadata_values,
            false,
        )?;
        account.update_schema(&address, SchemaChange::remove(vec![bootstrapper.to_string()]))?;

        self.register(ledger, bootstrapper, account)
    }

    /// Convert an existing key-controlled account, authorized by a signature
    /// over its [`CreationMessage`]
    pub fn create_with_existing_account<L: Ledger>(
        &mut self,
        ledger: &mut L,
        request: MigrationRequest,
    ) -> MultisigResult<String> {
        if !self.config.enabled(EngineFeatures::ACCOUNT_MIGRATION) {
            return Err(MultisigError::FeatureDisabled(
                EngineFeatures::ACCOUNT_MIGRATION.name(),
            ));
        }
        if self.accounts.contains_key(&request.account) {
            return Err(MultisigError::AccountAlreadyExists(request.account));
        }

        let message = CreationMessage {
            account: &request.account,
            sequence_number: ledger.sequence_number(&request.account),
            owners: &request.owners,
            threshold: request.threshold,
        }
        .to_bytes();

        if !ledger.verify_signed_message(
            &request.account,
            request.scheme,
            &request.public_key,
            &request.signature,
            &message,
        ) {
            log::warn!("Rejected migration of {}: bad signature", request.account);
            return Err(MultisigError::InvalidSignature);
        }

        let mut account = MultisigAccount::new(
            request.account.clone(),
            request.owners,
            request.threshold,
            request.metadata_keys,
            request.metadata_values,
            true,
        )?;

        let token = ledger.assume_authority(&request.account, EngineSeal::new())?;
        if ledger.current_identity_of(&token) != request.account {
            return Err(LedgerError::AccountNotFound(request.account).into());
        }
        if request.revoke_key {
            ledger.revoke(&token)?;
        }
        account.install_authority(token);

        Ok(self.insert(account))
    }

    /// Derive the ledger account for a validated `account` and store it
    fn register<L: Ledger>(
        &mut self,
        ledger: &mut L,
        creator: &str,
        mut account: MultisigAccount,
    ) -> MultisigResult<String> {
        if self.accounts.contains_key(account.address()) {
            return Err(MultisigError::AccountAlreadyExists(
                account.address().to_string(),
            ));
        }

        let seed = AccountSeed {
            creator: creator.to_string(),
            nonce: ledger.sequence_number(creator),
        };
        let (address, token) = ledger.create_account(&seed)?;
        debug_assert_eq!(address, account.address());
        account.install_authority(token);

        Ok(self.insert(account))
    }

    fn insert(&mut self, account: MultisigAccount) -> String {
        let address = account.address().to_string();
        log::info!(
            "Multisig account {} created ({})",
            address,
            account.description()
        );

        self.outbox.extend_from_slice(account.events());
        self.accounts.insert(address.clone(), account);
        address
    }

    // =========================================================================
    // Owner registry and metadata
    // =========================================================================

    /// Apply a schema change; `caller` must be the account itself
    pub fn update_schema(
        &mut self,
        address: &str,
        caller: &str,
        change: SchemaChange,
    ) -> MultisigResult<()> {
        self.apply(address, |account, _| account.update_schema(caller, change))?;
        log::info!("Schema of {} updated", address);
        Ok(())
    }

    pub fn add_owners(
        &mut self,
        address: &str,
        caller: &str,
        owners: Vec<String>,
    ) -> MultisigResult<()> {
        self.update_schema(address, caller, SchemaChange::add(owners))
    }

    pub fn remove_owners(
        &mut self,
        address: &str,
        caller: &str,
        owners: Vec<String>,
    ) -> MultisigResult<()> {
        self.update_schema(address, caller, SchemaChange::remove(owners))
    }

    pub fn swap_owners(
        &mut self,
        address: &str,
        caller: &str,
        add: Vec<String>,
        remove: Vec<String>,
    ) -> MultisigResult<()> {
        self.update_schema(address, caller, SchemaChange::swap(add, remove))
    }

    pub fn update_threshold(
        &mut self,
        address: &str,
        caller: &str,
        threshold: usize,
    ) -> MultisigResult<()> {
        self.update_schema(address, caller, SchemaChange::threshold(threshold))
    }

    pub fn add_owners_and_update_threshold(
        &mut self,
        address: &str,
        caller: &str,
        owners: Vec<String>,
        threshold: usize,
    ) -> MultisigResult<()> {
        self.update_schema(address, caller, SchemaChange::add(owners).with_threshold(threshold))
    }

    pub fn swap_owners_and_update_threshold(
        &mut self,
        address: &str,
        caller: &str,
        add: Vec<String>,
        remove: Vec<String>,
        threshold: usize,
    ) -> MultisigResult<()> {
        self.update_schema(
            address,
            caller,
            SchemaChange::swap(add, remove).with_threshold(threshold),
        )
    }

    /// Replace the metadata map; `caller` must be the account itself
    pub fn update_metadata(
        &mut self,
        address: &str,
        caller: &str,
        keys: Vec<String>,
        values: Vec<Vec<u8>>,
    ) -> MultisigResult<()> {
        self.apply(address, |account, _| {
            account.update_metadata(caller, keys, values)
        })
    }

    // =========================================================================
    // Proposals and votes
    // =========================================================================

    /// Propose a transaction carrying its full payload
    pub fn propose(
        &mut self,
        address: &str,
        proposer: &str,
        payload: Vec<u8>,
    ) -> MultisigResult<u64> {
        let payload = TransactionPayload::full(payload)?;
        self.propose_payload(address, proposer, payload)
    }

    /// Propose a transaction carrying only the payload's digest
    pub fn propose_digest(
        &mut self,
        address: &str,
        proposer: &str,
        digest: &[u8],
    ) -> MultisigResult<u64> {
        let payload = TransactionPayload::digest(digest)?;
        self.propose_payload(address, proposer, payload)
    }

    fn propose_payload(
        &mut self,
        address: &str,
        proposer: &str,
        payload: TransactionPayload,
    ) -> MultisigResult<u64> {
        let sequence_number = self.apply(address, |account, config| {
            account.propose(proposer, payload, config)
        })?;
        log::info!(
            "Transaction {} proposed on {} by {}",
            sequence_number,
            address,
            proposer
        );
        Ok(sequence_number)
    }

    pub fn vote(
        &mut self,
        address: &str,
        owner: &str,
        sequence_number: u64,
        approved: bool,
    ) -> MultisigResult<()> {
        self.apply(address, |account, _| account.vote(owner, sequence_number, approved))?;
        log::debug!(
            "{} voted {} on {}#{}",
            owner,
            if approved { "approve" } else { "reject" },
            address,
            sequence_number
        );
        Ok(())
    }

    pub fn approve(
        &mut self,
        address: &str,
        owner: &str,
        sequence_number: u64,
    ) -> MultisigResult<()> {
        self.vote(address, owner, sequence_number, true)
    }

    pub fn reject(
        &mut self,
        address: &str,
        owner: &str,
        sequence_number: u64,
    ) -> MultisigResult<()> {
        self.vote(address, owner, sequence_number, false)
    }

    /// Cast the same vote on `from..=to`
    pub fn vote_range(
        &mut self,
        address: &str,
        owner: &str,
        from: u64,
        to: u64,
        approved: bool,
    ) -> MultisigResult<()> {
        self.apply(address, |account, config| {
            account.vote_range(owner, from, to, approved, config)
        })
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Gatekeeper check for the head transaction, returning the payload to run
    pub fn validate_execution(
        &self,
        address: &str,
        executor: &str,
        provided: &[u8],
    ) -> MultisigResult<Vec<u8>> {
        self.account(address)?
            .validate_execution(executor, provided, &self.config)
    }

    pub fn cleanup_success(
        &mut self,
        address: &str,
        executor: &str,
        payload: Vec<u8>,
    ) -> MultisigResult<u64> {
        self.apply(address, |account, _| account.cleanup_success(executor, payload))
    }

    pub fn cleanup_failure(
        &mut self,
        address: &str,
        executor: &str,
        payload: Vec<u8>,
        error: ExecutionError,
    ) -> MultisigResult<u64> {
        self.apply(address, |account, _| {
            account.cleanup_failure(executor, payload, error)
        })
    }

    /// Validate, run and clean up the head transaction.
    ///
    /// An aborted payload still consumes the transaction; only a failed
    /// validation leaves it pending.
    pub fn execute_next<E: PayloadExecutor + ?Sized>(
        &mut self,
        address: &str,
        executor: &str,
        provided: &[u8],
        runner: &mut E,
    ) -> MultisigResult<ExecutionReport> {
        let report = self.apply(address, |account, config| {
            let payload = account.validate_execution(executor, provided, config)?;

            let (sequence_number, outcome) = match runner.execute(account, &payload) {
                Ok(()) => (
                    account.cleanup_success(executor, payload.clone())?,
                    ExecutionOutcome::Succeeded,
                ),
                Err(error) => (
                    account.cleanup_failure(executor, payload.clone(), error.clone())?,
                    ExecutionOutcome::Failed(error),
                ),
            };

            Ok(ExecutionReport {
                sequence_number,
                payload,
                outcome,
            })
        })?;

        match &report.outcome {
            ExecutionOutcome::Succeeded => log::info!(
                "Transaction {} on {} executed by {}",
                report.sequence_number,
                address,
                executor
            ),
            ExecutionOutcome::Failed(error) => log::warn!(
                "Transaction {} on {} failed: {}",
                report.sequence_number,
                address,
                error
            ),
        }
        Ok(report)
    }

    /// Remove the head transaction once rejected by a quorum
    pub fn finalize_rejected(&mut self, address: &str, owner: &str) -> MultisigResult<u64> {
        let sequence_number = self.apply(address, |account, config| {
            account.finalize_rejected(owner, config)
        })?;
        log::info!("Transaction {} on {} rejected", sequence_number, address);
        Ok(sequence_number)
    }

    /// Remove every transaction through `target`, all of which must be
    /// rejected by a quorum
    pub fn finalize_rejected_up_to(
        &mut self,
        address: &str,
        owner: &str,
        target: u64,
    ) -> MultisigResult<Vec<u64>> {
        let rejected = self.apply(address, |account, config| {
            account.finalize_rejected_up_to(owner, target, config)
        })?;
        log::info!("{} transactions on {} rejected", rejected.len(), address);
        Ok(rejected)
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn owners(&self, address: &str) -> MultisigResult<&[String]> {
        Ok(self.account(address)?.owners())
    }

    pub fn threshold(&self, address: &str) -> MultisigResult<usize> {
        Ok(self.account(address)?.threshold())
    }

    pub fn is_owner(&self, address: &str, identity: &str) -> MultisigResult<bool> {
        Ok(self.account(address)?.is_owner(identity))
    }

    pub fn get_transaction(
        &self,
        address: &str,
        sequence_number: u64,
    ) -> MultisigResult<&MultisigTransaction> {
        self.account(address)?.transaction(sequence_number)
    }

    pub fn pending_transactions(
        &self,
        address: &str,
    ) -> MultisigResult<Vec<(u64, &MultisigTransaction)>> {
        Ok(self.account(address)?.pending_transactions().collect())
    }

    pub fn next_transaction_payload(
        &self,
        address: &str,
        provided: &[u8],
    ) -> MultisigResult<Vec<u8>> {
        self.account(address)?.next_transaction_payload(provided)
    }

    pub fn can_be_executed(&self, address: &str, sequence_number: u64) -> MultisigResult<bool> {
        self.account(address)?.can_be_executed(sequence_number)
    }

    pub fn can_execute(
        &self,
        address: &str,
        owner: &str,
        sequence_number: u64,
    ) -> MultisigResult<bool> {
        self.account(address)?.can_execute(owner, sequence_number)
    }

    pub fn can_be_rejected(&self, address: &str, sequence_number: u64) -> MultisigResult<bool> {
        self.account(address)?.can_be_rejected(sequence_number)
    }

    pub fn can_reject(
        &self,
        address: &str,
        owner: &str,
        sequence_number: u64,
    ) -> MultisigResult<bool> {
        self.account(address)?
            .can_reject(owner, sequence_number, &self.config)
    }

    pub fn last_resolved_sequence_number(&self, address: &str) -> MultisigResult<u64> {
        Ok(self.account(address)?.last_resolved_sequence_number())
    }

    pub fn next_sequence_number(&self, address: &str) -> MultisigResult<u64> {
        Ok(self.account(address)?.next_sequence_number())
    }

    pub fn vote_status(
        &self,
        address: &str,
        sequence_number: u64,
        owner: &str,
    ) -> MultisigResult<(bool, bool)> {
        self.account(address)?.vote_status(sequence_number, owner)
    }

    pub fn vote_tally(&self, address: &str, sequence_number: u64) -> MultisigResult<VoteTally> {
        self.account(address)?.vote_tally(sequence_number)
    }

    pub fn available_capacity(&self, address: &str) -> MultisigResult<u64> {
        Ok(self.account(address)?.available_capacity(&self.config))
    }

    /// Events of an account starting at index `since`
    pub fn events(&self, address: &str, since: u64) -> MultisigResult<&[MultisigEvent]> {
        let events = self.account(address)?.events();
        let start = usize::try_from(since).unwrap_or(usize::MAX).min(events.len());
        Ok(&events[start..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{hash, KeyPair, SignatureScheme};
    use crate::ledger::InMemoryLedger;
    use crate::multisig::action::{AccountAction, AccountActionExecutor};
    use crate::multisig::events::EventKind;

    const ALICE: &str = "1Alice";
    const BOB: &str = "1Bob";
    const CAROL: &str = "1Carol";
    const DAVE: &str = "1Dave";

    fn owners(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn setup(threshold: usize) -> (MultisigManager, InMemoryLedger, String) {
        let mut ledger = InMemoryLedger::new();
        let mut manager = MultisigManager::new(EngineConfig::default());
        let address = manager
            .create_with_owners(
                &mut ledger,
                ALICE,
                owners(&[BOB, CAROL]),
                threshold,
                vec![],
                vec![],
            )
            .unwrap();
        (manager, ledger, address)
    }

    fn action(action: AccountAction) -> Vec<u8> {
        action.encode().unwrap()
    }

    #[test]
    fn test_create_accounts() {
        let mut ledger = InMemoryLedger::new();
        let mut manager = MultisigManager::default();

        let predicted = manager.next_account_address(&ledger, ALICE);
        let solo = manager
            .create(&mut ledger, ALICE, owners(&["team"]), vec![b"core".to_vec()])
            .unwrap();
        assert_eq!(solo, predicted);
        assert_eq!(manager.threshold(&solo).unwrap(), 1);
        assert_eq!(manager.owners(&solo).unwrap(), owners(&[ALICE]).as_slice());
        assert!(manager.account(&solo).unwrap().authority().is_some());

        // The creator's nonce advanced, so the next account differs
        let shared = manager
            .create_with_owners(&mut ledger, ALICE, owners(&[BOB]), 2, vec![], vec![])
            .unwrap();
        assert_ne!(solo, shared);
        assert_eq!(manager.account_count(), 2);

        let events = manager.take_events();
        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e.kind, EventKind::AccountCreated { .. })));
        assert!(manager.take_events().is_empty());
    }

    #[test]
    fn test_failed_creation_leaves_ledger_untouched() {
        let mut ledger = InMemoryLedger::new();
        let mut manager = MultisigManager::default();

        assert!(matches!(
            manager.create_with_owners(&mut ledger, ALICE, owners(&[BOB]), 3, vec![], vec![]),
            Err(MultisigError::InvalidThreshold { .. })
        ));
        assert!(matches!(
            manager.create_with_owners(&mut ledger, ALICE, owners(&[ALICE]), 1, vec![], vec![]),
            Err(MultisigError::DuplicateOwner(_))
        ));
        assert!(matches!(
            manager.create(&mut ledger, ALICE, owners(&["k"]), vec![]),
            Err(MultisigError::MetadataLengthMismatch { .. })
        ));
        assert_eq!(ledger.sequence_number(ALICE), 0);
        assert_eq!(manager.account_count(), 0);
    }

    #[test]
    fn test_create_then_remove_bootstrapper() {
        let mut ledger = InMemoryLedger::new();
        let mut manager = MultisigManager::default();

        let address = manager
            .create_with_owners_then_remove_bootstrapper(
                &mut ledger,
                DAVE,
                owners(&[ALICE, BOB]),
                2,
                vec![],
                vec![],
            )
            .unwrap();
        assert_eq!(manager.owners(&address).unwrap(), owners(&[ALICE, BOB]).as_slice());

        // Removing the bootstrapper would leave too few owners
        assert!(matches!(
            manager.create_with_owners_then_remove_bootstrapper(
                &mut ledger,
                DAVE,
                owners(&[ALICE]),
                2,
                vec![],
                vec![],
            ),
            Err(MultisigError::NotEnoughOwners { .. })
        ));
        assert_eq!(manager.account_count(), 1);
    }

    #[test]
    fn test_execute_two_of_three() {
        let (mut manager, _ledger, address) = setup(2);

        let seq = manager.propose(&address, ALICE, action(AccountAction::Noop)).unwrap();
        assert_eq!(seq, 1);
        assert!(!manager.can_be_executed(&address, 1).unwrap());
        assert!(manager.can_execute(&address, BOB, 1).unwrap());

        manager.approve(&address, BOB, 1).unwrap();
        assert!(manager.can_be_executed(&address, 1).unwrap());

        let report = manager
            .execute_next(&address, CAROL, &[], &mut AccountActionExecutor)
            .unwrap();
        assert!(report.succeeded());
        assert_eq!(report.sequence_number, 1);
        assert_eq!(manager.last_resolved_sequence_number(&address).unwrap(), 1);
        assert_eq!(manager.next_sequence_number(&address).unwrap(), 2);
        assert!(manager.pending_transactions(&address).unwrap().is_empty());
    }

    #[test]
    fn test_execute_without_quorum_changes_nothing() {
        let (mut manager, _ledger, address) = setup(3);
        manager.propose(&address, ALICE, action(AccountAction::Noop)).unwrap();
        manager.take_events();

        let result = manager.execute_next(&address, BOB, &[], &mut AccountActionExecutor);
        assert_eq!(
            result,
            Err(MultisigError::NotEnoughApprovals {
                approvals: 2,
                threshold: 3
            })
        );
        assert_eq!(manager.last_resolved_sequence_number(&address).unwrap(), 0);
        assert_eq!(manager.vote_status(&address, 1, BOB).unwrap(), (false, false));
        assert!(manager.take_events().is_empty());
    }

    #[test]
    fn test_payload_changes_owners() {
        let (mut manager, _ledger, address) = setup(2);
        let change = SchemaChange::swap(owners(&[DAVE]), owners(&[CAROL])).with_threshold(3);

        manager
            .propose(&address, ALICE, action(AccountAction::UpdateSchema(change)))
            .unwrap();
        manager.approve(&address, BOB, 1).unwrap();
        let report = manager
            .execute_next(&address, BOB, &[], &mut AccountActionExecutor)
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(manager.owners(&address).unwrap(), owners(&[ALICE, BOB, DAVE]).as_slice());
        assert_eq!(manager.threshold(&address).unwrap(), 3);
    }

    #[test]
    fn test_aborted_payload_consumes_transaction() {
        let (mut manager, _ledger, address) = setup(1);
        let too_strict = SchemaChange::threshold(4);

        manager
            .propose(&address, ALICE, action(AccountAction::UpdateSchema(too_strict)))
            .unwrap();
        let report = manager
            .execute_next(&address, ALICE, &[], &mut AccountActionExecutor)
            .unwrap();

        match &report.outcome {
            ExecutionOutcome::Failed(error) => {
                assert_eq!(error.error_type, "invalid_argument");
                assert_eq!(error.error_code, 11);
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(manager.threshold(&address).unwrap(), 1);
        assert_eq!(manager.last_resolved_sequence_number(&address).unwrap(), 1);

        let last = manager.events(&address, 0).unwrap().last().unwrap();
        assert!(matches!(
            last.kind,
            EventKind::TransactionExecutionFailed { .. }
        ));
    }

    #[test]
    fn test_fifo_reject_then_execute() {
        let (mut manager, _ledger, address) = setup(2);
        manager.propose(&address, ALICE, b"first".to_vec()).unwrap();
        manager.propose(&address, ALICE, action(AccountAction::Noop)).unwrap();
        manager.approve(&address, BOB, 2).unwrap();

        // 2 has quorum but 1 blocks it
        assert!(!manager.can_be_executed(&address, 2).unwrap());

        manager.reject(&address, CAROL, 1).unwrap();
        assert!(manager.can_reject(&address, BOB, 1).unwrap());
        assert_eq!(manager.finalize_rejected(&address, BOB).unwrap(), 1);

        let report = manager
            .execute_next(&address, CAROL, &[], &mut AccountActionExecutor)
            .unwrap();
        assert_eq!(report.sequence_number, 2);
        assert_eq!(manager.last_resolved_sequence_number(&address).unwrap(), 2);
    }

    #[test]
    fn test_digest_round_trip() {
        let (mut manager, _ledger, address) = setup(1);
        let payload = action(AccountAction::UpdateMetadata {
            keys: owners(&["name"]),
            values: vec![b"treasury".to_vec()],
        });

        manager
            .propose_digest(&address, ALICE, &hash(&payload))
            .unwrap();
        assert!(matches!(
            manager.propose_digest(&address, ALICE, &[0u8; 16]),
            Err(MultisigError::InvalidDigestLength(16))
        ));

        assert_eq!(
            manager.execute_next(&address, ALICE, b"{}", &mut AccountActionExecutor),
            Err(MultisigError::PayloadMismatch)
        );
        let report = manager
            .execute_next(&address, ALICE, &payload, &mut AccountActionExecutor)
            .unwrap();
        assert!(report.succeeded());
        assert_eq!(
            manager.account(&address).unwrap().metadata().get("name"),
            Some(&b"treasury".to_vec())
        );
    }

    #[test]
    fn test_queue_full_then_capacity_returns() {
        let mut ledger = InMemoryLedger::new();
        let config = EngineConfig {
            max_pending_transactions: 3,
            ..Default::default()
        };
        let mut manager = MultisigManager::new(config);
        let address = manager.create(&mut ledger, ALICE, vec![], vec![]).unwrap();

        for _ in 0..3 {
            manager.propose(&address, ALICE, b"x".to_vec()).unwrap();
        }
        assert_eq!(manager.available_capacity(&address).unwrap(), 0);
        assert!(matches!(
            manager.propose(&address, ALICE, b"x".to_vec()),
            Err(MultisigError::QueueFull { .. })
        ));

        manager.reject(&address, ALICE, 1).unwrap();
        manager.finalize_rejected(&address, ALICE).unwrap();
        assert_eq!(manager.available_capacity(&address).unwrap(), 1);
        assert_eq!(manager.propose(&address, ALICE, b"x".to_vec()).unwrap(), 4);
    }

    #[test]
    fn test_default_queue_bound() {
        let mut ledger = InMemoryLedger::new();
        let mut manager = MultisigManager::new(EngineConfig::default());
        let address = manager.create(&mut ledger, ALICE, vec![], vec![]).unwrap();
        let noop = action(AccountAction::Noop);

        for _ in 0..20 {
            manager.propose(&address, ALICE, noop.clone()).unwrap();
        }
        assert_eq!(manager.available_capacity(&address).unwrap(), 0);
        assert!(matches!(
            manager.propose(&address, ALICE, noop.clone()),
            Err(MultisigError::QueueFull { .. })
        ));
        assert_eq!(manager.next_sequence_number(&address).unwrap(), 21);

        let report = manager
            .execute_next(&address, ALICE, &[], &mut AccountActionExecutor)
            .unwrap();
        assert_eq!(report.sequence_number, 1);
        assert_eq!(manager.propose(&address, ALICE, noop).unwrap(), 21);
        assert_eq!(manager.available_capacity(&address).unwrap(), 0);
    }

    #[test]
    fn test_update_schema_direct_call_requires_account() {
        let (mut manager, _ledger, address) = setup(2);

        assert!(matches!(
            manager.add_owners(&address, ALICE, owners(&[DAVE])),
            Err(MultisigError::NotAccountItself { .. })
        ));
        let caller = address.clone();
        manager.add_owners(&address, &caller, owners(&[DAVE])).unwrap();
        manager.update_threshold(&address, &caller, 4).unwrap();
        manager.remove_owners(&address, &caller, owners(&["1Nobody"])).unwrap();
        assert!(matches!(
            manager.swap_owners(&address, &caller, owners(&[BOB]), owners(&[BOB])),
            Err(MultisigError::OwnersOverlap(_))
        ));
        assert_eq!(manager.threshold(&address).unwrap(), 4);
    }

    #[test]
    fn test_combined_schema_forms() {
        let (mut manager, _ledger, address) = setup(2);
        let caller = address.clone();

        manager
            .add_owners_and_update_threshold(&address, &caller, owners(&[DAVE]), 3)
            .unwrap();
        assert_eq!(manager.owners(&address).unwrap().len(), 4);
        assert_eq!(manager.threshold(&address).unwrap(), 3);

        // Too few owners left for the new threshold: nothing changes
        assert!(matches!(
            manager.swap_owners_and_update_threshold(
                &address,
                &caller,
                owners(&["1Erin"]),
                owners(&[ALICE, BOB]),
                4,
            ),
            Err(MultisigError::InvalidThreshold { .. })
        ));
        assert_eq!(
            manager.owners(&address).unwrap(),
            owners(&[ALICE, BOB, CAROL, DAVE]).as_slice()
        );

        manager
            .swap_owners_and_update_threshold(
                &address,
                &caller,
                owners(&["1Erin"]),
                owners(&[ALICE]),
                2,
            )
            .unwrap();
        assert_eq!(
            manager.owners(&address).unwrap(),
            owners(&[BOB, CAROL, DAVE, "1Erin"]).as_slice()
        );
        assert_eq!(manager.threshold(&address).unwrap(), 2);
    }

    #[test]
    fn test_unknown_account() {
        let mut manager = MultisigManager::default();
        assert!(matches!(
            manager.propose("3Missing", ALICE, b"x".to_vec()),
            Err(MultisigError::AccountNotFound(_))
        ));
        assert!(matches!(
            manager.threshold("3Missing"),
            Err(MultisigError::AccountNotFound(_))
        ));
    }

    fn migration_request(
        kp: &KeyPair,
        ledger: &InMemoryLedger,
        revoke_key: bool,
    ) -> MigrationRequest {
        let account = kp.address();
        let new_owners = owners(&[ALICE, BOB]);
        let message = CreationMessage {
            account: &account,
            sequence_number: ledger.sequence_number(&account),
            owners: &new_owners,
            threshold: 2,
        }
        .to_bytes();

        MigrationRequest {
            account: account.clone(),
            owners: new_owners,
            threshold: 2,
            scheme: SignatureScheme::Secp256k1Ecdsa,
            public_key: kp.public_key_bytes(),
            signature: kp.sign(&message).unwrap(),
            metadata_keys: vec![],
            metadata_values: vec![],
            revoke_key,
        }
    }

    #[test]
    fn test_migrate_existing_account() {
        let mut ledger = InMemoryLedger::new();
        let mut manager = MultisigManager::default();
        let kp = KeyPair::generate();
        ledger.register_key_account(&kp.public_key);

        let request = migration_request(&kp, &ledger, true);
        let address = manager
            .create_with_existing_account(&mut ledger, request.clone())
            .unwrap();

        assert_eq!(address, kp.address());
        assert!(!ledger.is_key_controlled(&address));
        assert_eq!(
            manager.account(&address).unwrap().authority().map(|t| t.account()),
            Some(address.as_str())
        );
        assert!(matches!(
            manager.account(&address).unwrap().events()[0].kind,
            EventKind::AccountCreated { migrated: true, .. }
        ));

        // Replaying the same request is refused
        assert!(matches!(
            manager.create_with_existing_account(&mut ledger, request),
            Err(MultisigError::AccountAlreadyExists(_))
        ));
    }

    #[test]
    fn test_migration_rejects_bad_signature() {
        let mut ledger = InMemoryLedger::new();
        let mut manager = MultisigManager::default();
        let kp = KeyPair::generate();
        ledger.register_key_account(&kp.public_key);

        let mut request = migration_request(&kp, &ledger, false);
        request.threshold = 1;
        assert_eq!(
            manager.create_with_existing_account(&mut ledger, request),
            Err(MultisigError::InvalidSignature)
        );
        assert!(ledger.is_key_controlled(&kp.address()));
        assert_eq!(manager.account_count(), 0);
    }

    #[test]
    fn test_migration_feature_switch() {
        let mut ledger = InMemoryLedger::new();
        let config = EngineConfig {
            features: EngineFeatures::empty(),
            ..Default::default()
        };
        let mut manager = MultisigManager::new(config);
        let kp = KeyPair::generate();
        ledger.register_key_account(&kp.public_key);

        let request = migration_request(&kp, &ledger, false);
        assert!(matches!(
            manager.create_with_existing_account(&mut ledger, request),
            Err(MultisigError::FeatureDisabled(_))
        ));
    }

    #[test]
    fn test_events_since() {
        let (mut manager, _ledger, address) = setup(2);
        manager.propose(&address, ALICE, b"x".to_vec()).unwrap();
        manager.approve(&address, BOB, 1).unwrap();

        let all = manager.events(&address, 0).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(manager.events(&address, 2).unwrap().len(), 1);
        assert!(manager.events(&address, 99).unwrap().is_empty());
        assert!(all.iter().enumerate().all(|(i, e)| e.index == i as u64));
    }

    #[test]
    fn test_state_serialization() {
        let (mut manager, _ledger, address) = setup(2);
        manager.propose(&address, ALICE, b"x".to_vec()).unwrap();

        let json = serde_json::to_string(&manager).unwrap();
        let restored: MultisigManager = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.next_sequence_number(&address).unwrap(), 2);
        assert!(restored.account(&address).unwrap().invariants_hold());
    }
}
