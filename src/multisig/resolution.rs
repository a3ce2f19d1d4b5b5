//! Resolving the head of the queue: execution and rejection
//!
//! Only `last_resolved + 1` can ever be resolved. Execution is split into a
//! validation step before the payload runs and a cleanup step after it,
//! because the payload may itself change the owner set.

use crate::config::{EngineConfig, EngineFeatures};
use crate::multisig::account::MultisigAccount;
use crate::multisig::error::{MultisigError, MultisigResult};
use crate::multisig::events::EventKind;
use crate::multisig::transaction::MultisigTransaction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured description of a payload that aborted
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub abort_location: String,
    pub error_type: String,
    pub error_code: u64,
}

impl ExecutionError {
    pub fn new(
        abort_location: impl Into<String>,
        error_type: impl Into<String>,
        error_code: u64,
    ) -> Self {
        Self {
            abort_location: abort_location.into(),
            error_type: error_type.into(),
            error_code,
        }
    }

    /// Describe an engine error raised while a payload ran
    pub fn from_engine(abort_location: impl Into<String>, error: &MultisigError) -> Self {
        Self::new(abort_location, error.kind().as_str(), error.code())
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} aborted with {} ({})",
            self.abort_location, self.error_type, self.error_code
        )
    }
}

impl std::error::Error for ExecutionError {}

impl MultisigAccount {
    fn head(&self) -> MultisigResult<(u64, &MultisigTransaction)> {
        let sequence_number = self.last_resolved_sequence_number + 1;
        self.transactions
            .get(&sequence_number)
            .map(|tx| (sequence_number, tx))
            .ok_or(MultisigError::TransactionNotFound(sequence_number))
    }

    /// Payload the head transaction would run with `provided`
    pub fn next_transaction_payload(&self, provided: &[u8]) -> MultisigResult<Vec<u8>> {
        let (_, transaction) = self.head()?;
        Ok(transaction.payload.resolve(provided))
    }

    /// Check that `executor` may run the head transaction now, returning the
    /// payload to run. The executor counts as an approval if they have not
    /// voted yet.
    pub fn validate_execution(
        &self,
        executor: &str,
        provided: &[u8],
        config: &EngineConfig,
    ) -> MultisigResult<Vec<u8>> {
        self.assert_owner(executor)?;
        let (_, transaction) = self.head()?;

        let mut approvals = transaction.tally(&self.owners).approvals;
        if !transaction.has_voted(executor) {
            approvals += 1;
        }
        if approvals < self.threshold {
            return Err(MultisigError::NotEnoughApprovals {
                approvals,
                threshold: self.threshold,
            });
        }

        transaction.payload.verify_provided(
            provided,
            config.enabled(EngineFeatures::STRICT_PAYLOAD_MATCH),
        )?;

        Ok(transaction.payload.resolve(provided))
    }

    /// Record the executor's implicit approval, drop the head transaction and
    /// advance the resolved counter. Returns the sequence number and the
    /// approval count at removal.
    fn resolve_head(&mut self, executor: &str) -> MultisigResult<(u64, usize)> {
        let sequence_number = self.last_resolved_sequence_number + 1;
        let transaction = self
            .transactions
            .get_mut(&sequence_number)
            .ok_or(MultisigError::TransactionNotFound(sequence_number))?;

        let implicit = !transaction.has_voted(executor);
        if implicit {
            transaction.record_vote(executor, true);
        }
        let approvals = transaction.tally(&self.owners).approvals;

        if implicit {
            self.emit(EventKind::Vote {
                owner: executor.to_string(),
                sequence_number,
                approved: true,
                implicit: true,
            });
        }

        self.transactions.remove(&sequence_number);
        self.last_resolved_sequence_number = sequence_number;
        Ok((sequence_number, approvals))
    }

    /// Finish a successful execution
    pub fn cleanup_success(&mut self, executor: &str, payload: Vec<u8>) -> MultisigResult<u64> {
        let (sequence_number, approvals) = self.resolve_head(executor)?;
        self.emit(EventKind::TransactionExecuted {
            executor: executor.to_string(),
            sequence_number,
            payload,
            approvals,
        });
        Ok(sequence_number)
    }

    /// Finish an execution whose payload aborted. The transaction is still
    /// consumed.
    pub fn cleanup_failure(
        &mut self,
        executor: &str,
        payload: Vec<u8>,
        error: ExecutionError,
    ) -> MultisigResult<u64> {
        let (sequence_number, approvals) = self.resolve_head(executor)?;
        self.emit(EventKind::TransactionExecutionFailed {
            executor: executor.to_string(),
            sequence_number,
            payload,
            approvals,
            error,
        });
        Ok(sequence_number)
    }

    /// Rejections the head would have if `owner` finalized it now
    fn rejections_with(
        &self,
        owner: &str,
        transaction: &MultisigTransaction,
        config: &EngineConfig,
    ) -> (usize, bool) {
        let implicit = config.enabled(EngineFeatures::IMPLICIT_REJECT_VOTE)
            && !transaction.has_voted(owner);
        let rejections = transaction.tally(&self.owners).rejections + usize::from(implicit);
        (rejections, implicit)
    }

    /// Remove the head transaction once it has enough rejections.
    ///
    /// Rejections from removed owners no longer count. After an owner change
    /// the head may be unable to reach K either way, which blocks every later
    /// transaction until the remaining owners vote.
    pub fn finalize_rejected(&mut self, owner: &str, config: &EngineConfig) -> MultisigResult<u64> {
        self.assert_owner(owner)?;
        let (sequence_number, transaction) = self.head()?;

        let (rejections, implicit) = self.rejections_with(owner, transaction, config);
        if rejections < self.threshold {
            return Err(MultisigError::NotEnoughRejections {
                rejections,
                threshold: self.threshold,
            });
        }

        if implicit {
            if let Some(transaction) = self.transactions.get_mut(&sequence_number) {
                transaction.record_vote(owner, false);
            }
            self.emit(EventKind::Vote {
                owner: owner.to_string(),
                sequence_number,
                approved: false,
                implicit: true,
            });
        }

        self.transactions.remove(&sequence_number);
        self.last_resolved_sequence_number = sequence_number;
        self.emit(EventKind::TransactionRejected {
            executor: owner.to_string(),
            sequence_number,
            rejections,
        });

        Ok(sequence_number)
    }

    /// Reject every transaction from the head through `target`. All of them
    /// must qualify, otherwise none is removed.
    pub fn finalize_rejected_up_to(
        &mut self,
        owner: &str,
        target: u64,
        config: &EngineConfig,
    ) -> MultisigResult<Vec<u64>> {
        if !config.enabled(EngineFeatures::RANGED_OPERATIONS) {
            return Err(MultisigError::FeatureDisabled(
                EngineFeatures::RANGED_OPERATIONS.name(),
            ));
        }
        let from = self.last_resolved_sequence_number + 1;
        if target < from || target >= self.next_sequence_number {
            return Err(MultisigError::InvalidRange { from, to: target });
        }
        self.assert_owner(owner)?;

        for sequence_number in from..=target {
            let transaction = self
                .transactions
                .get(&sequence_number)
                .ok_or(MultisigError::TransactionNotFound(sequence_number))?;
            let (rejections, _) = self.rejections_with(owner, transaction, config);
            if rejections < self.threshold {
                return Err(MultisigError::NotEnoughRejections {
                    rejections,
                    threshold: self.threshold,
                });
            }
        }

        (from..=target)
            .map(|_| self.finalize_rejected(owner, config))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash;
    use crate::multisig::account::SchemaChange;
    use crate::multisig::transaction::TransactionPayload;

    const ACCOUNT: &str = "3SharedTreasury";

    fn account(owners: &[&str], threshold: usize) -> MultisigAccount {
        MultisigAccount::new(
            ACCOUNT.to_string(),
            owners.iter().map(|s| s.to_string()).collect(),
            threshold,
            vec![],
            vec![],
            false,
        )
        .unwrap()
    }

    fn propose(acct: &mut MultisigAccount, proposer: &str, bytes: &[u8]) -> u64 {
        acct.propose(
            proposer,
            TransactionPayload::full(bytes.to_vec()).unwrap(),
            &EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_execute_with_implicit_approval() {
        let config = EngineConfig::default();
        let mut acct = account(&["alice", "bob", "carol"], 2);
        propose(&mut acct, "alice", b"pay");

        // Bob has not voted but his execution supplies the second approval
        let payload = acct.validate_execution("bob", &[], &config).unwrap();
        assert_eq!(payload, b"pay".to_vec());

        let events_before = acct.events().len();
        assert_eq!(acct.cleanup_success("bob", payload).unwrap(), 1);
        assert_eq!(acct.last_resolved_sequence_number(), 1);
        assert_eq!(acct.pending_count(), 0);

        let new_events = &acct.events()[events_before..];
        assert!(matches!(
            new_events[0].kind,
            EventKind::Vote {
                approved: true,
                implicit: true,
                ..
            }
        ));
        assert!(matches!(
            new_events[1].kind,
            EventKind::TransactionExecuted { approvals: 2, .. }
        ));
        assert!(acct.invariants_hold());
    }

    #[test]
    fn test_execute_requires_quorum_and_head() {
        let config = EngineConfig::default();
        let mut acct = account(&["alice", "bob", "carol"], 3);
        propose(&mut acct, "alice", b"one");
        propose(&mut acct, "alice", b"two");

        assert_eq!(
            acct.validate_execution("bob", &[], &config),
            Err(MultisigError::NotEnoughApprovals {
                approvals: 2,
                threshold: 3
            })
        );
        assert!(matches!(
            acct.validate_execution("mallory", &[], &config),
            Err(MultisigError::NotOwner { .. })
        ));

        // Transaction 2 is fully approved but 1 still blocks the queue
        acct.vote("bob", 2, true).unwrap();
        acct.vote("carol", 2, true).unwrap();
        assert!(!acct.can_be_executed(2).unwrap());
        assert!(acct.validate_execution("carol", &[], &config).is_err());
    }

    #[test]
    fn test_digest_payload_execution() {
        let config = EngineConfig::default();
        let mut acct = account(&["alice"], 1);
        let payload = b"upgrade module".to_vec();
        acct.propose(
            "alice",
            TransactionPayload::digest(&hash(&payload)).unwrap(),
            &config,
        )
        .unwrap();

        assert_eq!(
            acct.validate_execution("alice", b"upgrade modulf", &config),
            Err(MultisigError::PayloadMismatch)
        );
        assert_eq!(acct.pending_count(), 1);

        let run = acct.validate_execution("alice", &payload, &config).unwrap();
        assert_eq!(run, payload);
        assert_eq!(acct.next_transaction_payload(&payload).unwrap(), payload);
    }

    #[test]
    fn test_failed_execution_still_consumes() {
        let mut acct = account(&["alice"], 1);
        propose(&mut acct, "alice", b"bad");

        let error = ExecutionError::new("payload", "invalid_state", 5);
        assert_eq!(
            acct.cleanup_failure("alice", b"bad".to_vec(), error.clone())
                .unwrap(),
            1
        );
        assert_eq!(acct.last_resolved_sequence_number(), 1);

        let last = acct.events().last().unwrap();
        match &last.kind {
            EventKind::TransactionExecutionFailed { error: e, .. } => assert_eq!(e, &error),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_cleanup_counts_only_current_owners() {
        let config = EngineConfig::default();
        let mut acct = account(&["alice", "bob", "carol"], 2);
        propose(&mut acct, "alice", b"remove bob");
        acct.vote("bob", 1, true).unwrap();
        acct.validate_execution("carol", &[], &config).unwrap();

        // Payload removes bob before cleanup runs
        acct.update_schema(ACCOUNT, SchemaChange::remove(vec!["bob".to_string()]))
            .unwrap();
        acct.cleanup_success("carol", b"remove bob".to_vec())
            .unwrap();

        match &acct.events().last().unwrap().kind {
            EventKind::TransactionExecuted { approvals, .. } => assert_eq!(*approvals, 2),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_reject_with_implicit_vote() {
        let config = EngineConfig::default();
        let mut acct = account(&["alice", "bob", "carol"], 2);
        propose(&mut acct, "alice", b"spend");
        acct.vote("bob", 1, false).unwrap();

        assert_eq!(acct.finalize_rejected("carol", &config).unwrap(), 1);
        assert_eq!(acct.last_resolved_sequence_number(), 1);
        assert!(matches!(
            acct.events().last().unwrap().kind,
            EventKind::TransactionRejected { rejections: 2, .. }
        ));
        assert!(acct.invariants_hold());
    }

    #[test]
    fn test_reject_without_implicit_vote() {
        let config = EngineConfig::legacy();
        let mut acct = account(&["alice", "bob", "carol"], 2);
        propose(&mut acct, "alice", b"spend");
        acct.vote("bob", 1, false).unwrap();

        assert_eq!(
            acct.finalize_rejected("carol", &config),
            Err(MultisigError::NotEnoughRejections {
                rejections: 1,
                threshold: 2
            })
        );
        assert_eq!(acct.pending_count(), 1);

        acct.vote("carol", 1, false).unwrap();
        assert_eq!(acct.finalize_rejected("alice", &config).unwrap(), 1);
    }

    #[test]
    fn test_reject_up_to() {
        let config = EngineConfig::default();
        let mut acct = account(&["alice", "bob"], 2);
        for payload in [b"a", b"b", b"c"] {
            propose(&mut acct, "alice", payload);
        }
        acct.vote_range("alice", 1, 2, false, &config).unwrap();

        // Bob's implicit rejection completes 1 and 2
        assert_eq!(
            acct.finalize_rejected_up_to("bob", 2, &config).unwrap(),
            vec![1, 2]
        );
        assert_eq!(acct.last_resolved_sequence_number(), 2);
        assert_eq!(acct.pending_count(), 1);
    }

    #[test]
    fn test_reject_up_to_is_all_or_nothing() {
        let config = EngineConfig::default();
        let mut acct = account(&["alice", "bob", "carol"], 2);
        propose(&mut acct, "alice", b"a");
        propose(&mut acct, "alice", b"b");
        acct.vote("bob", 1, false).unwrap();

        // Transaction 2 has alice's approval and only carol's implicit rejection
        assert!(matches!(
            acct.finalize_rejected_up_to("carol", 2, &config),
            Err(MultisigError::NotEnoughRejections { .. })
        ));
        assert_eq!(acct.last_resolved_sequence_number(), 0);
        assert_eq!(acct.vote_status(1, "carol").unwrap(), (false, false));

        assert_eq!(
            acct.finalize_rejected_up_to("carol", 3, &config),
            Err(MultisigError::InvalidRange { from: 1, to: 3 })
        );
        assert_eq!(
            acct.finalize_rejected_up_to("carol", 0, &config),
            Err(MultisigError::InvalidRange { from: 1, to: 0 })
        );
    }

    #[test]
    fn test_empty_queue() {
        let config = EngineConfig::default();
        let mut acct = account(&["alice"], 1);

        assert_eq!(
            acct.validate_execution("alice", &[], &config),
            Err(MultisigError::TransactionNotFound(1))
        );
        assert_eq!(
            acct.finalize_rejected("alice", &config),
            Err(MultisigError::TransactionNotFound(1))
        );
    }

    #[test]
    fn test_execution_error_display() {
        let error = ExecutionError::from_engine("update_schema", &MultisigError::NotEnoughOwners {
            owners: 1,
            threshold: 2,
        });
        assert_eq!(error.error_type, "invalid_state");
        assert_eq!(error.error_code, 5);
        assert_eq!(error.to_string(), "update_schema aborted with invalid_state (5)");
    }
}
