//! Delegated authority over a ledger account

/// Capability to act as a ledger account.
///
/// Neither `Clone` nor `Copy`, and only this crate can mint one: exactly one
/// holder exists and others may only borrow it.
///
/// ```compile_fail
/// use multisig_engine::ledger::AuthorityToken;
///
/// let forged = AuthorityToken::issue("3Victim");
/// ```
///
/// ```compile_fail
/// use multisig_engine::ledger::AuthorityToken;
///
/// let forged: AuthorityToken = serde_json::from_str(r#"{"account":"3Victim"}"#).unwrap();
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct AuthorityToken {
    account: String,
}

impl AuthorityToken {
    pub(crate) fn issue(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    /// Account this token acts as
    pub fn account(&self) -> &str {
        &self.account
    }
}

/// Proof that a privileged ledger call comes from inside the engine.
///
/// Required by [`Ledger::assume_authority`](super::Ledger::assume_authority);
/// callers outside the crate cannot construct it.
///
/// ```compile_fail
/// use multisig_engine::ledger::{EngineSeal, InMemoryLedger, Ledger};
///
/// let mut ledger = InMemoryLedger::new();
/// let token = ledger.assume_authority("1Victim", EngineSeal::new());
/// ```
#[derive(Debug)]
pub struct EngineSeal(());

impl EngineSeal {
    pub(crate) fn new() -> Self {
        Self(())
    }
}

/// Persisted form of an account's token: just the identity it acts as.
///
/// Loaded tokens are checked against their account by
/// `MultisigAccount::invariants_hold`.
pub(crate) mod persisted {
    use super::AuthorityToken;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        token: &Option<AuthorityToken>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        token.as_ref().map(AuthorityToken::account).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<AuthorityToken>, D::Error> {
        Ok(Option::<String>::deserialize(deserializer)?.map(AuthorityToken::issue))
    }
}
