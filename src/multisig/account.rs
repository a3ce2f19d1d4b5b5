//! Shared multisig account
//!
//! A `MultisigAccount` owns its owner set, threshold, sequence counters,
//! metadata and every unresolved transaction. All operations validate fully
//! before touching any field, so a failed call leaves the account unchanged.

use crate::config::{EngineConfig, EngineFeatures};
use crate::ledger::AuthorityToken;
use crate::multisig::error::{MultisigError, MultisigResult};
use crate::multisig::events::{EventKind, MultisigEvent};
use crate::multisig::transaction::{MultisigTransaction, TransactionPayload, VoteTally};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Requested change to the owner set and threshold
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaChange {
    #[serde(default)]
    pub add_owners: Vec<String>,
    #[serde(default)]
    pub remove_owners: Vec<String>,
    #[serde(default)]
    pub threshold: Option<usize>,
}

impl SchemaChange {
    pub fn add(owners: Vec<String>) -> Self {
        Self {
            add_owners: owners,
            ..Default::default()
        }
    }

    pub fn remove(owners: Vec<String>) -> Self {
        Self {
            remove_owners: owners,
            ..Default::default()
        }
    }

    /// Replace `remove` with `add` in one step
    pub fn swap(add: Vec<String>, remove: Vec<String>) -> Self {
        Self {
            add_owners: add,
            remove_owners: remove,
            threshold: None,
        }
    }

    pub fn threshold(threshold: usize) -> Self {
        Self {
            threshold: Some(threshold),
            ..Default::default()
        }
    }

    /// Combine with a threshold update
    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// Owners must be unique and must not include the account itself
pub fn validate_owners(owners: &[String], account: &str) -> MultisigResult<()> {
    let mut seen = HashSet::with_capacity(owners.len());
    for owner in owners {
        if owner == account {
            return Err(MultisigError::AccountCannotOwnItself(account.to_string()));
        }
        if !seen.insert(owner.as_str()) {
            return Err(MultisigError::DuplicateOwner(owner.clone()));
        }
    }
    Ok(())
}

/// Build a metadata map from parallel key/value lists
pub fn build_metadata(
    keys: Vec<String>,
    values: Vec<Vec<u8>>,
) -> MultisigResult<BTreeMap<String, Vec<u8>>> {
    if keys.len() != values.len() {
        return Err(MultisigError::MetadataLengthMismatch {
            keys: keys.len(),
            values: values.len(),
        });
    }

    let mut metadata = BTreeMap::new();
    for (key, value) in keys.into_iter().zip(values) {
        if metadata.contains_key(&key) {
            return Err(MultisigError::DuplicateMetadataKey(key));
        }
        metadata.insert(key, value);
    }
    Ok(metadata)
}

/// A K-of-N shared account
#[derive(Debug, Serialize, Deserialize)]
pub struct MultisigAccount {
    pub(super) address: String,
    pub(super) owners: Vec<String>,
    pub(super) threshold: usize,
    pub(super) last_resolved_sequence_number: u64,
    pub(super) next_sequence_number: u64,
    pub(super) metadata: BTreeMap<String, Vec<u8>>,
    /// Unresolved transactions, exactly `last_resolved + 1 .. next`
    pub(super) transactions: BTreeMap<u64, MultisigTransaction>,
    #[serde(with = "crate::ledger::authority::persisted")]
    authority: Option<AuthorityToken>,
    pub(super) events: Vec<MultisigEvent>,
    created_at: DateTime<Utc>,
}

impl MultisigAccount {
    /// Create an account with validated owners, threshold and metadata
    pub fn new(
        address: String,
        owners: Vec<String>,
        threshold: usize,
        metadata_keys: Vec<String>,
        metadata_values: Vec<Vec<u8>>,
        migrated: bool,
    ) -> MultisigResult<Self> {
        if threshold == 0 || threshold > owners.len() {
            return Err(MultisigError::InvalidThreshold {
                threshold,
                owners: owners.len(),
            });
        }
        validate_owners(&owners, &address)?;
        let metadata = build_metadata(metadata_keys, metadata_values)?;

        let mut account = Self {
            address,
            owners,
            threshold,
            last_resolved_sequence_number: 0,
            next_sequence_number: 1,
            metadata,
            transactions: BTreeMap::new(),
            authority: None,
            events: Vec::new(),
            created_at: Utc::now(),
        };

        account.emit(EventKind::AccountCreated {
            owners: account.owners.clone(),
            threshold,
            migrated,
        });

        Ok(account)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn owners(&self) -> &[String] {
        &self.owners
    }

    /// Required number of same-direction votes (K)
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn is_owner(&self, identity: &str) -> bool {
        self.owners.iter().any(|o| o == identity)
    }

    pub fn metadata(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.metadata
    }

    pub fn last_resolved_sequence_number(&self) -> u64 {
        self.last_resolved_sequence_number
    }

    pub fn next_sequence_number(&self) -> u64 {
        self.next_sequence_number
    }

    /// Number of unresolved transactions
    pub fn pending_count(&self) -> u64 {
        self.next_sequence_number
            .saturating_sub(self.last_resolved_sequence_number)
            .saturating_sub(1)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Borrow the delegated authority, if this account holds one
    pub fn authority(&self) -> Option<&AuthorityToken> {
        self.authority.as_ref()
    }

    pub(super) fn install_authority(&mut self, token: AuthorityToken) {
        self.authority = Some(token);
    }

    /// The account's event stream
    pub fn events(&self) -> &[MultisigEvent] {
        &self.events
    }

    /// Description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.threshold, self.owners.len())
    }

    pub(super) fn emit(&mut self, kind: EventKind) {
        log::debug!("{} emitted {}", self.address, kind.name());
        self.events.push(MultisigEvent {
            account: self.address.clone(),
            index: self.events.len() as u64,
            timestamp: Utc::now(),
            kind,
        });
    }

    /// Structural invariants that hold in every reachable state
    pub fn invariants_hold(&self) -> bool {
        if self.last_resolved_sequence_number >= self.next_sequence_number {
            return false;
        }
        let threshold = self.threshold >= 1 && self.threshold <= self.owners.len();
        let owners = validate_owners(&self.owners, &self.address).is_ok();
        let contiguous = self.transactions.len() as u64 == self.pending_count()
            && self
                .transactions
                .keys()
                .copied()
                .eq(self.last_resolved_sequence_number + 1..self.next_sequence_number);

        let authority = self
            .authority
            .as_ref()
            .map_or(true, |token| token.account() == self.address);

        threshold && owners && contiguous && authority
    }

    pub fn assert_owner(&self, identity: &str) -> MultisigResult<()> {
        if self.is_owner(identity) {
            Ok(())
        } else {
            Err(MultisigError::NotOwner {
                owner: identity.to_string(),
                account: self.address.clone(),
            })
        }
    }

    fn assert_self(&self, caller: &str) -> MultisigResult<()> {
        if caller == self.address {
            Ok(())
        } else {
            Err(MultisigError::NotAccountItself {
                caller: caller.to_string(),
                account: self.address.clone(),
            })
        }
    }

    // =========================================================================
    // Owner registry
    // =========================================================================

    /// Add and remove owners and optionally set a new threshold, atomically.
    ///
    /// Only the account itself may call this, normally through an approved
    /// transaction payload.
    ///
    /// Votes are only tallied over current owners, so removing owners who
    /// already voted can leave the head transaction short of K approvals and
    /// K rejections alike. Nothing times it out: the queue stays stuck until
    /// enough remaining owners vote on it.
    pub fn update_schema(&mut self, caller: &str, change: SchemaChange) -> MultisigResult<()> {
        self.assert_self(caller)?;

        if let Some(owner) = change
            .add_owners
            .iter()
            .find(|owner| change.remove_owners.contains(owner))
        {
            return Err(MultisigError::OwnersOverlap(owner.clone()));
        }

        if change.threshold == Some(0) {
            return Err(MultisigError::InvalidThreshold {
                threshold: 0,
                owners: self.owners.len(),
            });
        }

        let mut owners = self.owners.clone();
        owners.extend(change.add_owners.iter().cloned());
        validate_owners(&owners, &self.address)?;

        let mut removed = Vec::new();
        for owner in &change.remove_owners {
            if let Some(index) = owners.iter().position(|o| o == owner) {
                removed.push(owners.remove(index));
            }
        }

        if let Some(threshold) = change.threshold.filter(|&t| t > owners.len()) {
            return Err(MultisigError::InvalidThreshold {
                threshold,
                owners: owners.len(),
            });
        }
        let threshold = change.threshold.unwrap_or(self.threshold);
        if owners.len() < threshold {
            return Err(MultisigError::NotEnoughOwners {
                owners: owners.len(),
                threshold,
            });
        }

        let old_threshold = self.threshold;
        self.owners = owners;
        self.threshold = threshold;

        if !change.add_owners.is_empty() {
            self.emit(EventKind::OwnersAdded {
                owners: change.add_owners,
            });
        }
        if !removed.is_empty() {
            self.emit(EventKind::OwnersRemoved { owners: removed });
        }
        if threshold != old_threshold {
            self.emit(EventKind::ThresholdUpdated {
                old_threshold,
                new_threshold: threshold,
            });
        }

        Ok(())
    }

    /// Replace the whole metadata map
    pub fn update_metadata(
        &mut self,
        caller: &str,
        keys: Vec<String>,
        values: Vec<Vec<u8>>,
    ) -> MultisigResult<()> {
        self.assert_self(caller)?;
        let new_metadata = build_metadata(keys, values)?;
        let old_metadata = std::mem::replace(&mut self.metadata, new_metadata.clone());

        self.emit(EventKind::MetadataUpdated {
            old_metadata,
            new_metadata,
        });
        Ok(())
    }

    // =========================================================================
    // Transaction store and queue
    // =========================================================================

    /// Free queue slots
    pub fn available_capacity(&self, config: &EngineConfig) -> u64 {
        config
            .max_pending_transactions
            .saturating_sub(self.pending_count())
    }

    /// Store a new transaction at the next sequence number with the
    /// proposer's approval recorded
    pub fn propose(
        &mut self,
        proposer: &str,
        payload: TransactionPayload,
        config: &EngineConfig,
    ) -> MultisigResult<u64> {
        self.assert_owner(proposer)?;

        if config.enabled(EngineFeatures::QUEUE_LIMIT) && self.available_capacity(config) == 0 {
            return Err(MultisigError::QueueFull {
                pending: self.pending_count(),
                capacity: config.max_pending_transactions,
            });
        }

        let sequence_number = self.next_sequence_number;
        let transaction = MultisigTransaction::new(proposer.to_string(), payload);
        self.transactions
            .insert(sequence_number, transaction.clone());
        self.next_sequence_number += 1;

        self.emit(EventKind::TransactionCreated {
            creator: proposer.to_string(),
            sequence_number,
            transaction,
        });

        Ok(sequence_number)
    }

    /// Record (or overwrite) an owner's vote. No quorum check happens here.
    pub fn vote(
        &mut self,
        owner: &str,
        sequence_number: u64,
        approved: bool,
    ) -> MultisigResult<()> {
        self.assert_owner(owner)?;

        let transaction = self
            .transactions
            .get_mut(&sequence_number)
            .ok_or(MultisigError::TransactionNotFound(sequence_number))?;
        transaction.record_vote(owner, approved);

        self.emit(EventKind::Vote {
            owner: owner.to_string(),
            sequence_number,
            approved,
            implicit: false,
        });
        Ok(())
    }

    /// Cast the same vote on every transaction in `from..=to`.
    ///
    /// Every target must exist, otherwise nothing is recorded.
    pub fn vote_range(
        &mut self,
        owner: &str,
        from: u64,
        to: u64,
        approved: bool,
        config: &EngineConfig,
    ) -> MultisigResult<()> {
        if !config.enabled(EngineFeatures::RANGED_OPERATIONS) {
            return Err(MultisigError::FeatureDisabled(
                EngineFeatures::RANGED_OPERATIONS.name(),
            ));
        }
        if from > to {
            return Err(MultisigError::InvalidRange { from, to });
        }
        self.assert_owner(owner)?;

        // Pending sequence numbers are contiguous
        if from <= self.last_resolved_sequence_number {
            return Err(MultisigError::TransactionNotFound(from));
        }
        if to >= self.next_sequence_number {
            return Err(MultisigError::TransactionNotFound(self.next_sequence_number));
        }

        for sequence_number in from..=to {
            self.vote(owner, sequence_number, approved)?;
        }
        Ok(())
    }

    // =========================================================================
    // Views
    // =========================================================================

    fn assert_pending(&self, sequence_number: u64) -> MultisigResult<()> {
        if sequence_number > self.last_resolved_sequence_number
            && sequence_number < self.next_sequence_number
        {
            Ok(())
        } else {
            Err(MultisigError::SequenceOutOfRange {
                sequence_number,
                last_resolved: self.last_resolved_sequence_number,
                next: self.next_sequence_number,
            })
        }
    }

    /// Transaction at `sequence_number`, which must be pending
    pub fn transaction(&self, sequence_number: u64) -> MultisigResult<&MultisigTransaction> {
        self.assert_pending(sequence_number)?;
        self.transactions
            .get(&sequence_number)
            .ok_or(MultisigError::TransactionNotFound(sequence_number))
    }

    /// All pending transactions in resolution order
    pub fn pending_transactions(&self) -> impl Iterator<Item = (u64, &MultisigTransaction)> {
        self.transactions.iter().map(|(seq, tx)| (*seq, tx))
    }

    /// Votes counted over the current owners
    pub fn vote_tally(&self, sequence_number: u64) -> MultisigResult<VoteTally> {
        Ok(self.transaction(sequence_number)?.tally(&self.owners))
    }

    /// `(has_voted, approved)` for an owner; `approved` is false if not voted
    pub fn vote_status(&self, sequence_number: u64, owner: &str) -> MultisigResult<(bool, bool)> {
        let transaction = self.transaction(sequence_number)?;
        Ok(match transaction.vote_of(owner) {
            Some(approved) => (true, approved),
            None => (false, false),
        })
    }

    /// Whether the transaction can be executed by anyone right now
    pub fn can_be_executed(&self, sequence_number: u64) -> MultisigResult<bool> {
        let tally = self.vote_tally(sequence_number)?;
        Ok(sequence_number == self.last_resolved_sequence_number + 1
            && tally.approvals >= self.threshold)
    }

    /// Whether `owner` could execute it now, counting their implicit approval
    pub fn can_execute(&self, owner: &str, sequence_number: u64) -> MultisigResult<bool> {
        let transaction = self.transaction(sequence_number)?;
        let mut approvals = transaction.tally(&self.owners).approvals;
        if !transaction.has_voted(owner) {
            approvals += 1;
        }
        Ok(self.is_owner(owner)
            && sequence_number == self.last_resolved_sequence_number + 1
            && approvals >= self.threshold)
    }

    /// Whether the transaction can be rejection-finalized by anyone right now
    pub fn can_be_rejected(&self, sequence_number: u64) -> MultisigResult<bool> {
        let tally = self.vote_tally(sequence_number)?;
        Ok(sequence_number == self.last_resolved_sequence_number + 1
            && tally.rejections >= self.threshold)
    }

    /// Whether `owner` could finalize the rejection now
    pub fn can_reject(
        &self,
        owner: &str,
        sequence_number: u64,
        config: &EngineConfig,
    ) -> MultisigResult<bool> {
        let transaction = self.transaction(sequence_number)?;
        let mut rejections = transaction.tally(&self.owners).rejections;
        if config.enabled(EngineFeatures::IMPLICIT_REJECT_VOTE) && !transaction.has_voted(owner) {
            rejections += 1;
        }
        Ok(self.is_owner(owner)
            && sequence_number == self.last_resolved_sequence_number + 1
            && rejections >= self.threshold)
    }
}
