//! REST API handlers for multisig operations

use crate::api::websocket::{WsBroadcaster, WsEvent};
use crate::config::EngineFeatures;
use crate::crypto::{hash, KeyPair};
use crate::multisig::{
    AccountAction, AccountActionExecutor, ErrorKind, ExecutionOutcome, MigrationRequest,
    MultisigAccount, MultisigError, MultisigEvent, MultisigManager, MultisigTransaction,
};
use crate::storage::{EngineState, Storage};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<RwLock<EngineState>>,
    pub storage: Arc<Storage>,
    pub ws_broadcaster: Arc<WsBroadcaster>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u64>,
}

impl ApiError {
    fn bad_request(error: impl Into<String>) -> (StatusCode, Json<ApiError>) {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiError {
                error: error.into(),
                kind: None,
                code: None,
            }),
        )
    }
}

/// HTTP status for an engine error category
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Permission => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::InvalidState => StatusCode::CONFLICT,
    }
}

fn engine_error(e: MultisigError) -> (StatusCode, Json<ApiError>) {
    (
        status_for(e.kind()),
        Json(ApiError {
            error: e.to_string(),
            kind: Some(e.kind()),
            code: Some(e.code()),
        }),
    )
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, (StatusCode, Json<ApiError>)> {
    hex::decode(value)
        .map_err(|e| ApiError::bad_request(format!("Invalid hex in {}: {}", field, e)))
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub max_pending_transactions: u64,
    pub features: BTreeMap<&'static str, bool>,
}

#[derive(Debug, Serialize)]
pub struct KeyAccountResponse {
    pub address: String,
    pub public_key: String,
    pub private_key: String,
}

#[derive(Debug, Serialize)]
pub struct AccountInfo {
    pub address: String,
    pub owners: Vec<String>,
    pub threshold: usize,
    pub description: String,
    pub last_resolved_sequence_number: u64,
    pub next_sequence_number: u64,
    pub pending: u64,
    pub available_capacity: u64,
    pub metadata: BTreeMap<String, String>,
    pub authority: Option<String>,
    pub created_at: String,
}

impl AccountInfo {
    fn new(account: &MultisigAccount, manager: &MultisigManager) -> Self {
        Self {
            address: account.address().to_string(),
            owners: account.owners().to_vec(),
            threshold: account.threshold(),
            description: account.description(),
            last_resolved_sequence_number: account.last_resolved_sequence_number(),
            next_sequence_number: account.next_sequence_number(),
            pending: account.pending_count(),
            available_capacity: account.available_capacity(manager.config()),
            metadata: account
                .metadata()
                .iter()
                .map(|(k, v)| (k.clone(), String::from_utf8_lossy(v).into_owned()))
                .collect(),
            authority: account.authority().map(|t| t.account().to_string()),
            created_at: account.created_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionInfo {
    pub sequence_number: u64,
    pub creator: String,
    pub payload: Option<String>,
    pub digest: Option<String>,
    pub action: Option<AccountAction>,
    pub votes: BTreeMap<String, bool>,
    pub approvals: usize,
    pub rejections: usize,
    pub can_be_executed: bool,
    pub can_be_rejected: bool,
    pub created_at: String,
}

impl TransactionInfo {
    fn new(
        account: &MultisigAccount,
        sequence_number: u64,
        tx: &MultisigTransaction,
    ) -> Result<Self, MultisigError> {
        let tally = tx.tally(account.owners());
        Ok(Self {
            sequence_number,
            creator: tx.creator.clone(),
            payload: tx.payload.stored_payload().map(hex::encode),
            digest: tx.payload.stored_digest().map(hex::encode),
            action: tx
                .payload
                .stored_payload()
                .and_then(|p| AccountAction::decode(p).ok()),
            votes: tx.votes.clone(),
            approvals: tally.approvals,
            rejections: tally.rejections,
            can_be_executed: account.can_be_executed(sequence_number)?,
            can_be_rejected: account.can_be_rejected(sequence_number)?,
            created_at: tx.created_at.to_rfc3339(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct VoteStatusResponse {
    pub owner: String,
    pub sequence_number: u64,
    pub voted: bool,
    pub approved: bool,
    pub can_execute: bool,
    pub can_reject: bool,
}

#[derive(Debug, Serialize)]
pub struct ProposeResponse {
    pub sequence_number: u64,
    /// Payload to supply at execution when only the digest was stored
    pub payload: String,
}

#[derive(Debug, Serialize)]
pub struct ExecuteResponse {
    pub sequence_number: u64,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RejectResponse {
    pub rejected: Vec<u64>,
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct CreateAccountRequest {
    pub creator: String,
    #[serde(default)]
    pub owners: Vec<String>,
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    #[serde(default)]
    pub metadata_keys: Vec<String>,
    #[serde(default)]
    pub metadata_values: Vec<String>,
    /// Drop the creator from the owners after creation
    #[serde(default)]
    pub remove_creator: bool,
}

fn default_threshold() -> usize {
    1
}

/// Exactly one of `action`, `payload` (hex) must be set
#[derive(Deserialize)]
pub struct ProposeRequest {
    pub proposer: String,
    pub action: Option<AccountAction>,
    pub payload: Option<String>,
    /// Store only the payload's digest
    #[serde(default)]
    pub digest_only: bool,
}

#[derive(Deserialize)]
pub struct VoteRequest {
    pub owner: String,
    pub approve: bool,
    /// Vote on every transaction up to this one as well
    pub to: Option<u64>,
}

#[derive(Deserialize)]
pub struct ExecuteRequest {
    pub executor: String,
    /// Hex payload, required for digest-only transactions
    pub payload: Option<String>,
}

#[derive(Deserialize)]
pub struct RejectRequest {
    pub owner: String,
    pub up_to: Option<u64>,
}

#[derive(Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub since: u64,
}

/// Broadcast queued events and persist the state
fn commit(state: &ApiState, engine: &mut EngineState) {
    for event in engine.multisig.take_events() {
        state.ws_broadcaster.broadcast(WsEvent::Multisig { event });
    }

    if let Err(e) = state.storage.save(engine) {
        log::warn!("Failed to persist engine state: {}", e);
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Health check
pub async fn health_check() -> &'static str {
    "OK"
}

/// GET /api/config - Engine configuration
pub async fn get_config(State(state): State<ApiState>) -> Json<ConfigResponse> {
    let engine = state.engine.read().await;
    let config = engine.multisig.config();

    Json(ConfigResponse {
        max_pending_transactions: config.max_pending_transactions,
        features: EngineFeatures::all()
            .iter()
            .map(|f| (f.name(), config.enabled(f)))
            .collect(),
    })
}

/// POST /api/keys - Generate a key-controlled ledger account
pub async fn create_key_account(State(state): State<ApiState>) -> Json<KeyAccountResponse> {
    let keypair = KeyPair::generate();
    let mut engine = state.engine.write().await;
    let address = engine.ledger.register_key_account(&keypair.public_key);
    commit(&state, &mut engine);

    Json(KeyAccountResponse {
        address,
        public_key: keypair.public_key_hex(),
        private_key: keypair.private_key_hex(),
    })
}

/// GET /api/multisig - List all multisig accounts
pub async fn list_accounts(State(state): State<ApiState>) -> Json<Vec<AccountInfo>> {
    let engine = state.engine.read().await;
    let manager = &engine.multisig;

    Json(
        manager
            .list_accounts()
            .into_iter()
            .map(|a| AccountInfo::new(a, manager))
            .collect(),
    )
}

/// POST /api/multisig - Create a multisig account
pub async fn create_account(
    State(state): State<ApiState>,
    Json(req): Json<CreateAccountRequest>,
) -> ApiResult<AccountInfo> {
    let values = req
        .metadata_values
        .into_iter()
        .map(String::into_bytes)
        .collect();

    let mut engine = state.engine.write().await;
    let EngineState { ledger, multisig } = &mut *engine;
    let address = if req.remove_creator {
        multisig.create_with_owners_then_remove_bootstrapper(
            ledger,
            &req.creator,
            req.owners,
            req.threshold,
            req.metadata_keys,
            values,
        )
    } else {
        multisig.create_with_owners(
            ledger,
            &req.creator,
            req.owners,
            req.threshold,
            req.metadata_keys,
            values,
        )
    }
    .map_err(engine_error)?;

    commit(&state, &mut engine);
    let account = engine.multisig.account(&address).map_err(engine_error)?;
    Ok(Json(AccountInfo::new(account, &engine.multisig)))
}

/// POST /api/multisig/migrate - Convert a key-controlled account
pub async fn migrate_account(
    State(state): State<ApiState>,
    Json(req): Json<MigrationRequest>,
) -> ApiResult<AccountInfo> {
    let mut engine = state.engine.write().await;
    let EngineState { ledger, multisig } = &mut *engine;
    let address = multisig
        .create_with_existing_account(ledger, req)
        .map_err(engine_error)?;

    commit(&state, &mut engine);
    let account = engine.multisig.account(&address).map_err(engine_error)?;
    Ok(Json(AccountInfo::new(account, &engine.multisig)))
}

/// GET /api/multisig/next-address/{creator}
pub async fn next_account_address(
    State(state): State<ApiState>,
    Path(creator): Path<String>,
) -> Json<String> {
    let engine = state.engine.read().await;
    Json(engine.multisig.next_account_address(&engine.ledger, &creator))
}

/// GET /api/multisig/{address} - Get account details
pub async fn get_account(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<AccountInfo> {
    let engine = state.engine.read().await;
    let account = engine.multisig.account(&address).map_err(engine_error)?;
    Ok(Json(AccountInfo::new(account, &engine.multisig)))
}

/// GET /api/multisig/{address}/transactions - Pending transactions
pub async fn list_transactions(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<Vec<TransactionInfo>> {
    let engine = state.engine.read().await;
    let account = engine.multisig.account(&address).map_err(engine_error)?;

    let transactions = account
        .pending_transactions()
        .map(|(seq, tx)| TransactionInfo::new(account, seq, tx))
        .collect::<Result<Vec<_>, _>>()
        .map_err(engine_error)?;
    Ok(Json(transactions))
}

/// GET /api/multisig/{address}/transactions/{seq}
pub async fn get_transaction(
    State(state): State<ApiState>,
    Path((address, sequence_number)): Path<(String, u64)>,
) -> ApiResult<TransactionInfo> {
    let engine = state.engine.read().await;
    let account = engine.multisig.account(&address).map_err(engine_error)?;
    let tx = account.transaction(sequence_number).map_err(engine_error)?;

    TransactionInfo::new(account, sequence_number, tx)
        .map(Json)
        .map_err(engine_error)
}

/// POST /api/multisig/{address}/transactions - Propose a transaction
pub async fn propose_transaction(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<ProposeRequest>,
) -> ApiResult<ProposeResponse> {
    let payload = match (req.action, req.payload) {
        (Some(action), None) => action
            .encode()
            .map_err(|e| ApiError::bad_request(format!("Invalid action: {}", e)))?,
        (None, Some(payload)) => decode_hex("payload", &payload)?,
        _ => {
            return Err(ApiError::bad_request(
                "Exactly one of action or payload is required",
            ))
        }
    };

    let mut engine = state.engine.write().await;
    let sequence_number = if req.digest_only {
        engine
            .multisig
            .propose_digest(&address, &req.proposer, &hash(&payload))
    } else {
        engine
            .multisig
            .propose(&address, &req.proposer, payload.clone())
    }
    .map_err(engine_error)?;

    commit(&state, &mut engine);
    Ok(Json(ProposeResponse {
        sequence_number,
        payload: hex::encode(payload),
    }))
}

/// POST /api/multisig/{address}/transactions/{seq}/vote
pub async fn vote(
    State(state): State<ApiState>,
    Path((address, sequence_number)): Path<(String, u64)>,
    Json(req): Json<VoteRequest>,
) -> ApiResult<VoteStatusResponse> {
    let mut engine = state.engine.write().await;
    match req.to {
        Some(to) => engine
            .multisig
            .vote_range(&address, &req.owner, sequence_number, to, req.approve),
        None => engine
            .multisig
            .vote(&address, &req.owner, sequence_number, req.approve),
    }
    .map_err(engine_error)?;

    commit(&state, &mut engine);
    vote_status_of(&engine.multisig, &address, sequence_number, &req.owner)
}

/// GET /api/multisig/{address}/transactions/{seq}/votes/{owner}
pub async fn get_vote_status(
    State(state): State<ApiState>,
    Path((address, sequence_number, owner)): Path<(String, u64, String)>,
) -> ApiResult<VoteStatusResponse> {
    let engine = state.engine.read().await;
    vote_status_of(&engine.multisig, &address, sequence_number, &owner)
}

fn vote_status_of(
    manager: &MultisigManager,
    address: &str,
    sequence_number: u64,
    owner: &str,
) -> ApiResult<VoteStatusResponse> {
    let (voted, approved) = manager
        .vote_status(address, sequence_number, owner)
        .map_err(engine_error)?;

    Ok(Json(VoteStatusResponse {
        owner: owner.to_string(),
        sequence_number,
        voted,
        approved,
        can_execute: manager
            .can_execute(address, owner, sequence_number)
            .map_err(engine_error)?,
        can_reject: manager
            .can_reject(address, owner, sequence_number)
            .map_err(engine_error)?,
    }))
}

/// POST /api/multisig/{address}/execute - Execute the next transaction
pub async fn execute_next(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<ExecuteRequest>,
) -> ApiResult<ExecuteResponse> {
    let provided = match req.payload {
        Some(payload) => decode_hex("payload", &payload)?,
        None => Vec::new(),
    };

    let mut engine = state.engine.write().await;
    let report = engine
        .multisig
        .execute_next(&address, &req.executor, &provided, &mut AccountActionExecutor)
        .map_err(engine_error)?;
    commit(&state, &mut engine);

    let (success, error) = match report.outcome {
        ExecutionOutcome::Succeeded => (true, None),
        ExecutionOutcome::Failed(e) => (false, Some(e.to_string())),
    };
    Ok(Json(ExecuteResponse {
        sequence_number: report.sequence_number,
        success,
        error,
    }))
}

/// POST /api/multisig/{address}/reject - Finalize rejection
pub async fn reject(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<RejectResponse> {
    let mut engine = state.engine.write().await;
    let rejected = match req.up_to {
        Some(target) => engine
            .multisig
            .finalize_rejected_up_to(&address, &req.owner, target),
        None => engine
            .multisig
            .finalize_rejected(&address, &req.owner)
            .map(|seq| vec![seq]),
    }
    .map_err(engine_error)?;

    commit(&state, &mut engine);
    Ok(Json(RejectResponse { rejected }))
}

/// GET /api/multisig/{address}/events?since=N
pub async fn list_events(
    State(state): State<ApiState>,
    Path(address): Path<String>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Vec<MultisigEvent>> {
    let engine = state.engine.read().await;
    let events = engine
        .multisig
        .events(&address, query.since)
        .map_err(engine_error)?;
    Ok(Json(events.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::storage::StorageConfig;

    fn api_state(dir: &tempfile::TempDir) -> ApiState {
        let storage = Storage::new(StorageConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap();

        ApiState {
            engine: Arc::new(RwLock::new(EngineState::new(EngineConfig::default()))),
            storage: Arc::new(storage),
            ws_broadcaster: Arc::new(WsBroadcaster::new()),
        }
    }

    fn create_request(threshold: usize) -> CreateAccountRequest {
        CreateAccountRequest {
            creator: "1Alice".to_string(),
            owners: vec!["1Bob".to_string(), "1Carol".to_string()],
            threshold,
            metadata_keys: vec!["name".to_string()],
            metadata_values: vec!["ops".to_string()],
            remove_creator: false,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::Permission), StatusCode::FORBIDDEN);
        assert_eq!(status_for(ErrorKind::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::InvalidArgument), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::InvalidState), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_create_propose_execute() {
        let dir = tempfile::tempdir().unwrap();
        let state = api_state(&dir);
        let mut events = state.ws_broadcaster.subscribe();

        let Json(account) = create_account(State(state.clone()), Json(create_request(2)))
            .await
            .unwrap();
        assert_eq!(account.description, "2-of-3");
        assert_eq!(account.metadata.get("name").map(String::as_str), Some("ops"));
        assert!(state.storage.exists());

        let propose = ProposeRequest {
            proposer: "1Alice".to_string(),
            action: Some(AccountAction::Noop),
            payload: None,
            digest_only: false,
        };
        let Json(proposed) = propose_transaction(
            State(state.clone()),
            Path(account.address.clone()),
            Json(propose),
        )
        .await
        .unwrap();
        assert_eq!(proposed.sequence_number, 1);

        let Json(status) = get_vote_status(
            State(state.clone()),
            Path((account.address.clone(), 1, "1Bob".to_string())),
        )
        .await
        .unwrap();
        assert!(!status.voted);
        assert!(status.can_execute);

        let execute = ExecuteRequest {
            executor: "1Bob".to_string(),
            payload: None,
        };
        let Json(result) = execute_next(
            State(state.clone()),
            Path(account.address.clone()),
            Json(execute),
        )
        .await
        .unwrap();
        assert!(result.success);

        // AccountCreated is the first event pushed to subscribers
        match events.recv().await.unwrap() {
            WsEvent::Multisig { event } => assert_eq!(event.kind.name(), "AccountCreated"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let state = api_state(&dir);

        let (status, Json(error)) =
            create_account(State(state.clone()), Json(create_request(4)))
                .await
                .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error.kind, Some(ErrorKind::InvalidArgument));

        let (status, _) = get_account(State(state.clone()), Path("3Missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);

        let Json(account) = create_account(State(state.clone()), Json(create_request(2)))
            .await
            .unwrap();
        let propose = ProposeRequest {
            proposer: "1Mallory".to_string(),
            action: Some(AccountAction::Noop),
            payload: None,
            digest_only: false,
        };
        let (status, _) = propose_transaction(
            State(state.clone()),
            Path(account.address.clone()),
            Json(propose),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);

        let reject_req = RejectRequest {
            owner: "1Alice".to_string(),
            up_to: None,
        };
        let (status, _) = reject(State(state), Path(account.address), Json(reject_req))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
