//! Account event stream
//!
//! Exactly one structured event is recorded per logical occurrence.

use crate::multisig::resolution::ExecutionError;
use crate::multisig::transaction::MultisigTransaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What happened
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventKind {
    /// Account initialized (or migrated from a key-controlled account)
    AccountCreated {
        owners: Vec<String>,
        threshold: usize,
        migrated: bool,
    },
    OwnersAdded {
        owners: Vec<String>,
    },
    OwnersRemoved {
        owners: Vec<String>,
    },
    ThresholdUpdated {
        old_threshold: usize,
        new_threshold: usize,
    },
    MetadataUpdated {
        old_metadata: BTreeMap<String, Vec<u8>>,
        new_metadata: BTreeMap<String, Vec<u8>>,
    },
    /// Snapshot of a newly proposed transaction
    TransactionCreated {
        creator: String,
        sequence_number: u64,
        transaction: MultisigTransaction,
    },
    /// `implicit` marks votes recorded on the caller's behalf at resolution
    Vote {
        owner: String,
        sequence_number: u64,
        approved: bool,
        implicit: bool,
    },
    TransactionExecuted {
        executor: String,
        sequence_number: u64,
        payload: Vec<u8>,
        approvals: usize,
    },
    TransactionExecutionFailed {
        executor: String,
        sequence_number: u64,
        payload: Vec<u8>,
        approvals: usize,
        error: ExecutionError,
    },
    TransactionRejected {
        executor: String,
        sequence_number: u64,
        rejections: usize,
    },
}

impl EventKind {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::AccountCreated { .. } => "AccountCreated",
            EventKind::OwnersAdded { .. } => "OwnersAdded",
            EventKind::OwnersRemoved { .. } => "OwnersRemoved",
            EventKind::ThresholdUpdated { .. } => "ThresholdUpdated",
            EventKind::MetadataUpdated { .. } => "MetadataUpdated",
            EventKind::TransactionCreated { .. } => "TransactionCreated",
            EventKind::Vote { .. } => "Vote",
            EventKind::TransactionExecuted { .. } => "TransactionExecuted",
            EventKind::TransactionExecutionFailed { .. } => "TransactionExecutionFailed",
            EventKind::TransactionRejected { .. } => "TransactionRejected",
        }
    }
}

/// An event recorded in an account's stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultisigEvent {
    /// Account that emitted the event
    pub account: String,
    /// Position in the account's stream, starting at 0
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = MultisigEvent {
            account: "3abc".to_string(),
            index: 0,
            timestamp: Utc::now(),
            kind: EventKind::Vote {
                owner: "1owner".to_string(),
                sequence_number: 4,
                approved: false,
                implicit: true,
            },
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Vote\""));
        assert!(json.contains("1owner"));

        let back: MultisigEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.kind.name(), "Vote");
    }
}
