//! CLI commands for the multisig engine
//!
//! Implements all command handlers for the CLI interface.

use crate::config::{EngineConfig, EngineFeatures, CONFIG_FILE};
use crate::crypto::{hash, KeyPair, SignatureScheme};
use crate::ledger::Ledger;
use crate::multisig::{
    AccountAction, AccountActionExecutor, CreationMessage, EventKind, ExecutionOutcome,
    MigrationRequest, MultisigAccount, TransactionPayload,
};
use crate::storage::{EngineState, Storage, StorageConfig};
use std::path::{Path, PathBuf};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub engine: EngineState,
    pub storage: Storage,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Load configuration and persisted state from `data_dir`
    pub fn new(data_dir: PathBuf) -> CliResult<Self> {
        let config = EngineConfig::load_or_default(&data_dir)?;
        let storage = Storage::new(StorageConfig {
            data_dir: data_dir.clone(),
            ..Default::default()
        })?;

        let engine = if storage.exists() {
            log::debug!("Loading engine state from {:?}", data_dir);
            storage.load(config)?
        } else {
            println!("🆕 Starting with empty state...");
            EngineState::new(config)
        };

        Ok(Self {
            engine,
            storage,
            data_dir,
        })
    }

    /// Save the current state
    pub fn save(&self) -> CliResult<()> {
        self.storage.save(&self.engine)?;
        Ok(())
    }
}

/// Parse `key=value` metadata entries
pub fn parse_metadata(entries: &[String]) -> CliResult<(Vec<String>, Vec<Vec<u8>>)> {
    let mut keys = Vec::with_capacity(entries.len());
    let mut values = Vec::with_capacity(entries.len());

    for entry in entries {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| format!("Metadata entry '{}' must be key=value", entry))?;
        keys.push(key.to_string());
        values.push(value.as_bytes().to_vec());
    }

    Ok((keys, values))
}

/// Initialize a data directory
pub fn cmd_init(data_dir: &Path, max_pending: Option<u64>, legacy: bool) -> CliResult<()> {
    let storage = Storage::new(StorageConfig {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    })?;

    if storage.exists() {
        println!("⚠️  State already exists at {:?}", data_dir);
        return Ok(());
    }

    let mut config = if legacy {
        EngineConfig::legacy()
    } else {
        EngineConfig::default()
    };
    if let Some(max) = max_pending {
        config.max_pending_transactions = max;
    }
    config.validate()?;
    config.save(&data_dir.join(CONFIG_FILE))?;

    storage.save(&EngineState::new(config.clone()))?;

    println!("✅ Multisig engine initialized!");
    println!("   📁 Data directory: {:?}", data_dir);
    println!("   📬 Max pending transactions: {}", config.max_pending_transactions);
    println!("   🔧 Features: {:?}", config.features);

    Ok(())
}

/// Generate a key and register its account on the ledger
pub fn cmd_keygen(state: &mut AppState) -> CliResult<()> {
    let keypair = KeyPair::generate();
    let address = state.engine.ledger.register_key_account(&keypair.public_key);
    state.save()?;

    println!("🔐 New key account registered!");
    println!("   📍 Address: {}", address);
    println!("   🔑 Public Key: {}", keypair.public_key_hex());
    println!("   🗝️  Private Key: {}", keypair.private_key_hex());
    println!("\n   ⚠️  The private key is not stored. Keep it to migrate this account later.");

    Ok(())
}

/// Create a new multisig account
pub fn cmd_account_create(
    state: &mut AppState,
    creator: &str,
    owners: Vec<String>,
    threshold: usize,
    metadata: &[String],
    remove_creator: bool,
) -> CliResult<()> {
    let (keys, values) = parse_metadata(metadata)?;
    let EngineState { ledger, multisig } = &mut state.engine;

    let address = if remove_creator {
        multisig.create_with_owners_then_remove_bootstrapper(
            ledger, creator, owners, threshold, keys, values,
        )?
    } else {
        multisig.create_with_owners(ledger, creator, owners, threshold, keys, values)?
    };
    state.save()?;

    let account = state.engine.multisig.account(&address)?;
    println!("✅ Multisig account created!");
    println!("   📍 Address: {}", address);
    println!("   🔏 Policy: {}", account.description());
    println!("   👥 Owners: {}", account.owners().join(", "));

    Ok(())
}

/// Convert a key-controlled account into a multisig account
pub fn cmd_account_migrate(
    state: &mut AppState,
    private_key: &str,
    owners: Vec<String>,
    threshold: usize,
    metadata: &[String],
    revoke_key: bool,
) -> CliResult<()> {
    let keypair = KeyPair::from_private_key_hex(private_key)?;
    let account = keypair.address();
    let (metadata_keys, metadata_values) = parse_metadata(metadata)?;

    let message = CreationMessage {
        account: &account,
        sequence_number: state.engine.ledger.sequence_number(&account),
        owners: &owners,
        threshold,
    }
    .to_bytes();
    let signature = keypair.sign(&message)?;

    let request = MigrationRequest {
        account,
        owners,
        threshold,
        scheme: SignatureScheme::Secp256k1Ecdsa,
        public_key: keypair.public_key_bytes(),
        signature,
        metadata_keys,
        metadata_values,
        revoke_key,
    };

    let EngineState { ledger, multisig } = &mut state.engine;
    let address = multisig.create_with_existing_account(ledger, request)?;
    state.save()?;

    println!("✅ Account {} converted to multisig", address);
    if revoke_key {
        println!("   🔒 Original key revoked");
    } else {
        println!("   ⚠️  Original key still controls the account");
    }

    Ok(())
}

fn print_account(account: &MultisigAccount, config: &EngineConfig) {
    println!("🔏 Multisig account {}", account.address());
    println!("   ├─ Policy: {}", account.description());
    println!("   ├─ Owners: {}", account.owners().join(", "));
    println!(
        "   ├─ Sequence: last resolved {}, next {}",
        account.last_resolved_sequence_number(),
        account.next_sequence_number()
    );
    println!(
        "   ├─ Pending: {} (capacity left {})",
        account.pending_count(),
        account.available_capacity(config)
    );
    println!(
        "   ├─ Authority: {}",
        account.authority().map(|t| t.account()).unwrap_or("-")
    );
    println!("   └─ Created: {}", account.created_at().format("%Y-%m-%d %H:%M:%S"));

    if !account.metadata().is_empty() {
        println!("\n   Metadata:");
        for (key, value) in account.metadata() {
            println!("   └─ {} = {}", key, String::from_utf8_lossy(value));
        }
    }
}

/// Show a multisig account
pub fn cmd_account_show(state: &AppState, address: &str) -> CliResult<()> {
    let multisig = &state.engine.multisig;
    print_account(multisig.account(address)?, multisig.config());
    Ok(())
}

/// List all multisig accounts
pub fn cmd_account_list(state: &AppState) -> CliResult<()> {
    let accounts = state.engine.multisig.list_accounts();

    if accounts.is_empty() {
        println!("📭 No multisig accounts. Create one with: multisig account create");
        return Ok(());
    }

    println!("📋 Multisig accounts:");
    for account in accounts {
        println!(
            "   {} ({}) - {} pending",
            account.address(),
            account.description(),
            account.pending_count()
        );
    }

    Ok(())
}

/// Show the identity the next account created by `creator` will get
pub fn cmd_next_address(state: &AppState, creator: &str) -> CliResult<()> {
    let address = state
        .engine
        .multisig
        .next_account_address(&state.engine.ledger, creator);
    println!("📍 Next account for {}: {}", creator, address);
    Ok(())
}

/// Propose a transaction
pub fn cmd_propose(
    state: &mut AppState,
    account: &str,
    proposer: &str,
    payload: Vec<u8>,
    digest_only: bool,
) -> CliResult<()> {
    let multisig = &mut state.engine.multisig;
    let sequence_number = if digest_only {
        multisig.propose_digest(account, proposer, &hash(&payload))?
    } else {
        multisig.propose(account, proposer, payload.clone())?
    };
    state.save()?;

    println!("📤 Transaction {} proposed on {}", sequence_number, account);
    if digest_only {
        println!("   Only the digest is stored. Supply this payload to execute:");
        println!("   {}", hex::encode(&payload));
    }

    Ok(())
}

/// Build an account-action payload
pub fn action_payload(action: &AccountAction) -> CliResult<Vec<u8>> {
    Ok(action.encode()?)
}

/// Vote on one transaction or a range
pub fn cmd_vote(
    state: &mut AppState,
    account: &str,
    owner: &str,
    sequence_number: u64,
    to: Option<u64>,
    approve: bool,
) -> CliResult<()> {
    let multisig = &mut state.engine.multisig;
    match to {
        Some(to) => multisig.vote_range(account, owner, sequence_number, to, approve)?,
        None => multisig.vote(account, owner, sequence_number, approve)?,
    }
    state.save()?;

    let verb = if approve { "approved" } else { "rejected" };
    match to {
        Some(to) => println!(
            "🗳️  {} {} transactions {}..={}",
            owner, verb, sequence_number, to
        ),
        None => println!("🗳️  {} {} transaction {}", owner, verb, sequence_number),
    }

    Ok(())
}

/// Execute the next pending transaction
pub fn cmd_execute(
    state: &mut AppState,
    account: &str,
    executor: &str,
    payload: Option<&str>,
) -> CliResult<()> {
    let provided = match payload {
        Some(payload) => hex::decode(payload)?,
        None => Vec::new(),
    };

    let report = state.engine.multisig.execute_next(
        account,
        executor,
        &provided,
        &mut AccountActionExecutor,
    )?;
    state.save()?;

    match report.outcome {
        ExecutionOutcome::Succeeded => {
            println!("✅ Transaction {} executed", report.sequence_number)
        }
        ExecutionOutcome::Failed(error) => {
            println!("❌ Transaction {} aborted: {}", report.sequence_number, error);
            println!("   It has been consumed and will not run again.");
        }
    }

    Ok(())
}

/// Finalize rejection of the next transaction (or every one up to `up_to`)
pub fn cmd_reject(
    state: &mut AppState,
    account: &str,
    owner: &str,
    up_to: Option<u64>,
) -> CliResult<()> {
    let multisig = &mut state.engine.multisig;
    let rejected = match up_to {
        Some(target) => multisig.finalize_rejected_up_to(account, owner, target)?,
        None => vec![multisig.finalize_rejected(account, owner)?],
    };
    state.save()?;

    for sequence_number in rejected {
        println!("🚫 Transaction {} rejected", sequence_number);
    }

    Ok(())
}

/// List pending transactions with their votes
pub fn cmd_pending(state: &AppState, account: &str) -> CliResult<()> {
    let multisig = &state.engine.multisig;
    let pending = multisig.pending_transactions(account)?;

    if pending.is_empty() {
        println!("📭 No pending transactions");
        return Ok(());
    }

    println!("📬 Pending transactions ({}):", pending.len());
    for (sequence_number, tx) in pending {
        let tally = multisig.vote_tally(account, sequence_number)?;
        let payload = match &tx.payload {
            TransactionPayload::Full(bytes) => match AccountAction::decode(bytes) {
                Ok(action) => format!("{:?}", action),
                Err(_) => tx.payload.describe(),
            },
            TransactionPayload::Digest(_) => tx.payload.describe(),
        };

        println!(
            "   #{} by {} | ✔ {} ✘ {} | executable: {} | {}",
            sequence_number,
            tx.creator,
            tally.approvals,
            tally.rejections,
            multisig.can_be_executed(account, sequence_number)?,
            payload
        );
    }

    Ok(())
}

/// Show an account's events
pub fn cmd_events(state: &AppState, account: &str, since: u64) -> CliResult<()> {
    let events = state.engine.multisig.events(account, since)?;

    println!("📜 Events for {}:", account);
    for event in events {
        let detail = match &event.kind {
            EventKind::Vote {
                owner,
                sequence_number,
                approved,
                implicit,
            } => format!(
                "{} {} #{}{}",
                owner,
                if *approved { "approved" } else { "rejected" },
                sequence_number,
                if *implicit { " (implicit)" } else { "" }
            ),
            EventKind::TransactionExecutionFailed {
                sequence_number,
                error,
                ..
            } => format!("#{}: {}", sequence_number, error),
            other => serde_json::to_string(other)?,
        };
        println!(
            "   [{}] {} {} {}",
            event.index,
            event.timestamp.format("%H:%M:%S"),
            event.kind.name(),
            detail
        );
    }

    Ok(())
}

/// Show the configured features
pub fn cmd_config(state: &AppState) -> CliResult<()> {
    let config = state.engine.multisig.config();

    println!("🔧 Engine configuration ({:?})", state.data_dir.join(CONFIG_FILE));
    println!("   Max pending transactions: {}", config.max_pending_transactions);
    for feature in EngineFeatures::all().iter() {
        let status = if config.enabled(feature) { "on" } else { "off" };
        println!("   {:<22} {}", feature.name(), status);
    }

    Ok(())
}
