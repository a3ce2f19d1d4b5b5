//! Multisig engine errors

use crate::ledger::LedgerError;
use serde::Serialize;
use thiserror::Error;

/// Broad error category, used for HTTP status mapping and abort reports
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller is not allowed to perform the call
    Permission,
    /// Account or transaction does not exist
    NotFound,
    /// Malformed input
    InvalidArgument,
    /// Input is well-formed but the account state forbids the call
    InvalidState,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Permission => "permission",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::InvalidState => "invalid_state",
        }
    }
}

/// Errors related to multisig operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MultisigError {
    #[error("{owner} is not an owner of multisig account {account}")]
    NotOwner { owner: String, account: String },
    #[error("Only multisig account {account} itself may call this, not {caller}")]
    NotAccountItself { caller: String, account: String },

    #[error("Multisig account not found: {0}")]
    AccountNotFound(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(u64),
    #[error("Sequence number {sequence_number} outside pending range ({last_resolved}, {next})")]
    SequenceOutOfRange {
        sequence_number: u64,
        last_resolved: u64,
        next: u64,
    },

    #[error("Payload cannot be empty")]
    EmptyPayload,
    #[error("Payload digest must be 32 bytes, got {0}")]
    InvalidDigestLength(usize),
    #[error("Invalid threshold {threshold} for {owners} owners")]
    InvalidThreshold { threshold: usize, owners: usize },
    #[error("Metadata has {keys} keys but {values} values")]
    MetadataLengthMismatch { keys: usize, values: usize },
    #[error("Duplicate metadata key: {0}")]
    DuplicateMetadataKey(String),
    #[error("Owner {0} is both added and removed")]
    OwnersOverlap(String),
    #[error("Duplicate owner: {0}")]
    DuplicateOwner(String),
    #[error("Multisig account {0} cannot be its own owner")]
    AccountCannotOwnItself(String),
    #[error("Creation message signature is invalid")]
    InvalidSignature,
    #[error("Invalid sequence range: {from}..={to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("Not enough owners: {owners} owners for threshold {threshold}")]
    NotEnoughOwners { owners: usize, threshold: usize },
    #[error("Not enough approvals: have {approvals}, need {threshold}")]
    NotEnoughApprovals { approvals: usize, threshold: usize },
    #[error("Not enough rejections: have {rejections}, need {threshold}")]
    NotEnoughRejections { rejections: usize, threshold: usize },
    #[error("Transaction queue full: {pending} pending, capacity {capacity}")]
    QueueFull { pending: u64, capacity: u64 },
    #[error("Payload does not match the stored transaction")]
    PayloadMismatch,
    #[error("Feature disabled: {0}")]
    FeatureDisabled(&'static str),
    #[error("Multisig account already exists: {0}")]
    AccountAlreadyExists(String),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl MultisigError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        use MultisigError::*;
        match self {
            NotOwner { .. } | NotAccountItself { .. } => ErrorKind::Permission,
            AccountNotFound(_) | TransactionNotFound(_) | SequenceOutOfRange { .. } => {
                ErrorKind::NotFound
            }
            EmptyPayload
            | InvalidDigestLength(_)
            | InvalidThreshold { .. }
            | MetadataLengthMismatch { .. }
            | DuplicateMetadataKey(_)
            | OwnersOverlap(_)
            | DuplicateOwner(_)
            | AccountCannotOwnItself(_)
            | InvalidSignature
            | InvalidRange { .. } => ErrorKind::InvalidArgument,
            NotEnoughOwners { .. }
            | NotEnoughApprovals { .. }
            | NotEnoughRejections { .. }
            | QueueFull { .. }
            | PayloadMismatch
            | FeatureDisabled(_)
            | AccountAlreadyExists(_) => ErrorKind::InvalidState,
            Ledger(LedgerError::AccountNotFound(_)) => ErrorKind::NotFound,
            Ledger(_) => ErrorKind::InvalidState,
        }
    }

    /// Stable numeric code, reported in execution failure descriptions
    pub fn code(&self) -> u64 {
        use MultisigError::*;
        match self {
            DuplicateOwner(_) => 1,
            AccountNotFound(_) => 2,
            NotOwner { .. } => 3,
            EmptyPayload => 4,
            NotEnoughOwners { .. } => 5,
            TransactionNotFound(_) => 6,
            NotEnoughApprovals { .. } => 7,
            InvalidDigestLength(_) => 8,
            PayloadMismatch => 9,
            NotEnoughRejections { .. } => 10,
            InvalidThreshold { .. } => 11,
            MetadataLengthMismatch { .. } => 12,
            DuplicateMetadataKey(_) => 13,
            OwnersOverlap(_) => 14,
            AccountCannotOwnItself(_) => 15,
            FeatureDisabled(_) => 16,
            InvalidSignature => 17,
            SequenceOutOfRange { .. } => 18,
            InvalidRange { .. } => 19,
            QueueFull { .. } => 20,
            NotAccountItself { .. } => 21,
            AccountAlreadyExists(_) => 22,
            Ledger(_) => 23,
        }
    }
}

/// Result alias for engine operations
pub type MultisigResult<T> = Result<T, MultisigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_taxonomy() {
        let not_owner = MultisigError::NotOwner {
            owner: "x".to_string(),
            account: "a".to_string(),
        };
        assert_eq!(not_owner.kind(), ErrorKind::Permission);
        assert_eq!(
            MultisigError::TransactionNotFound(3).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(MultisigError::EmptyPayload.kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            MultisigError::QueueFull {
                pending: 20,
                capacity: 20
            }
            .kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(MultisigError::PayloadMismatch.kind(), ErrorKind::InvalidState);
        assert_eq!(
            MultisigError::Ledger(LedgerError::AccountNotFound("x".to_string())).kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_error_display() {
        let err = MultisigError::NotEnoughApprovals {
            approvals: 1,
            threshold: 2,
        };
        assert_eq!(err.to_string(), "Not enough approvals: have 1, need 2");
        assert_eq!(ErrorKind::InvalidState.as_str(), "invalid_state");
    }
}
