//! Payload execution
//!
//! The engine does not interpret payloads itself. A `PayloadExecutor` runs
//! them against the account; `AccountActionExecutor` understands the JSON
//! encoded account-management actions used by the CLI and API.

use crate::multisig::account::{MultisigAccount, SchemaChange};
use crate::multisig::resolution::ExecutionError;
use serde::{Deserialize, Serialize};

/// Runs an approved payload
pub trait PayloadExecutor {
    /// Apply `payload` to `account`. An `Err` must leave the account
    /// unchanged.
    fn execute(&mut self, account: &mut MultisigAccount, payload: &[u8])
        -> Result<(), ExecutionError>;
}

/// Account-management action carried as a payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AccountAction {
    UpdateSchema(SchemaChange),
    UpdateMetadata {
        keys: Vec<String>,
        values: Vec<Vec<u8>>,
    },
    /// Does nothing; useful to burn a sequence number
    Noop,
}

impl AccountAction {
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    fn location(&self) -> &'static str {
        match self {
            AccountAction::UpdateSchema(_) => "account_action::update_schema",
            AccountAction::UpdateMetadata { .. } => "account_action::update_metadata",
            AccountAction::Noop => "account_action::noop",
        }
    }
}

/// Executes `AccountAction` payloads with the account as caller
#[derive(Debug, Default)]
pub struct AccountActionExecutor;

impl PayloadExecutor for AccountActionExecutor {
    fn execute(
        &mut self,
        account: &mut MultisigAccount,
        payload: &[u8],
    ) -> Result<(), ExecutionError> {
        let action = AccountAction::decode(payload).map_err(|e| {
            log::warn!("Undecodable payload for {}: {}", account.address(), e);
            ExecutionError::new("account_action::decode", "deserialization", 0)
        })?;

        let location = action.location();
        let caller = account.address().to_string();
        let result = match action {
            AccountAction::UpdateSchema(change) => account.update_schema(&caller, change),
            AccountAction::UpdateMetadata { keys, values } => {
                account.update_metadata(&caller, keys, values)
            }
            AccountAction::Noop => Ok(()),
        };

        result.map_err(|e| ExecutionError::from_engine(location, &e))
    }
}
