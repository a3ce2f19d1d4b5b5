//! Proposed multisig transactions and their votes

use crate::crypto::{hash, Digest32};
use crate::multisig::error::{MultisigError, MultisigResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a transaction will run: the full payload, or only its digest with
/// the payload supplied at execution time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionPayload {
    Full(Vec<u8>),
    Digest(Digest32),
}

impl TransactionPayload {
    /// Full payload; must not be empty
    pub fn full(payload: Vec<u8>) -> MultisigResult<Self> {
        if payload.is_empty() {
            return Err(MultisigError::EmptyPayload);
        }
        Ok(Self::Full(payload))
    }

    /// Digest of a payload; must be exactly 32 bytes
    pub fn digest(digest: &[u8]) -> MultisigResult<Self> {
        let digest: Digest32 = digest
            .try_into()
            .map_err(|_| MultisigError::InvalidDigestLength(digest.len()))?;
        Ok(Self::Digest(digest))
    }

    /// Stored payload bytes, if the full payload was proposed
    pub fn stored_payload(&self) -> Option<&[u8]> {
        match self {
            TransactionPayload::Full(payload) => Some(payload),
            TransactionPayload::Digest(_) => None,
        }
    }

    /// Stored digest, if only the digest was proposed
    pub fn stored_digest(&self) -> Option<&Digest32> {
        match self {
            TransactionPayload::Full(_) => None,
            TransactionPayload::Digest(digest) => Some(digest),
        }
    }

    /// Check a payload supplied at execution time.
    ///
    /// Digests must always match. A stored full payload is only compared
    /// when `strict` is set and something was supplied.
    pub fn verify_provided(&self, provided: &[u8], strict: bool) -> MultisigResult<()> {
        let matches = match self {
            TransactionPayload::Digest(digest) => hash(provided) == *digest,
            TransactionPayload::Full(stored) => {
                !strict || provided.is_empty() || provided == stored.as_slice()
            }
        };

        if matches {
            Ok(())
        } else {
            Err(MultisigError::PayloadMismatch)
        }
    }

    /// Payload to run: the stored one, or the supplied one for digests
    pub fn resolve(&self, provided: &[u8]) -> Vec<u8> {
        match self {
            TransactionPayload::Full(stored) => stored.clone(),
            TransactionPayload::Digest(_) => provided.to_vec(),
        }
    }

    /// Hex rendering for display
    pub fn describe(&self) -> String {
        match self {
            TransactionPayload::Full(payload) => format!("payload {}", hex::encode(payload)),
            TransactionPayload::Digest(digest) => format!("digest {}", hex::encode(digest)),
        }
    }
}

/// Approvals and rejections counted over the current owner set
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub approvals: usize,
    pub rejections: usize,
}

/// A transaction awaiting resolution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultisigTransaction {
    pub payload: TransactionPayload,
    /// Owner -> approve (true) or reject (false)
    pub votes: BTreeMap<String, bool>,
    pub creator: String,
    pub created_at: DateTime<Utc>,
}

impl MultisigTransaction {
    /// Create a transaction with the creator's approval already recorded
    pub fn new(creator: String, payload: TransactionPayload) -> Self {
        let mut votes = BTreeMap::new();
        votes.insert(creator.clone(), true);

        Self {
            payload,
            votes,
            creator,
            created_at: Utc::now(),
        }
    }

    /// Record or overwrite an owner's vote, returning the previous one
    pub fn record_vote(&mut self, owner: &str, approved: bool) -> Option<bool> {
        self.votes.insert(owner.to_string(), approved)
    }

    /// The owner's current vote
    pub fn vote_of(&self, owner: &str) -> Option<bool> {
        self.votes.get(owner).copied()
    }

    pub fn has_voted(&self, owner: &str) -> bool {
        self.votes.contains_key(owner)
    }

    /// Count votes, ignoring anyone no longer in `owners`
    pub fn tally(&self, owners: &[String]) -> VoteTally {
        owners
            .iter()
            .filter_map(|owner| self.votes.get(owner))
            .fold(VoteTally::default(), |mut tally, approved| {
                if *approved {
                    tally.approvals += 1;
                } else {
                    tally.rejections += 1;
                }
                tally
            })
    }
}
