//! REST API module
//!
//! Provides HTTP REST API for programmatic access to multisig accounts.
//!
//! # Endpoints
//!
//! ## Engine
//! - `GET /api/config` - Queue bound and feature switches
//! - `POST /api/keys` - Generate a key-controlled ledger account
//!
//! ## Accounts
//! - `GET /api/multisig` - List accounts
//! - `POST /api/multisig` - Create account
//! - `POST /api/multisig/migrate` - Convert a key-controlled account
//! - `GET /api/multisig/next-address/:creator` - Next derived identity
//! - `GET /api/multisig/:address` - Account details
//! - `GET /api/multisig/:address/events?since=N` - Event stream
//!
//! ## Transactions
//! - `GET /api/multisig/:address/transactions` - Pending transactions
//! - `POST /api/multisig/:address/transactions` - Propose
//! - `GET /api/multisig/:address/transactions/:seq` - Transaction details
//! - `POST /api/multisig/:address/transactions/:seq/vote` - Vote (optionally ranged)
//! - `GET /api/multisig/:address/transactions/:seq/votes/:owner` - Vote status
//! - `POST /api/multisig/:address/execute` - Execute the next transaction
//! - `POST /api/multisig/:address/reject` - Finalize rejection
//!
//! ## WebSocket
//! - `GET /ws` - Real-time account events

pub mod handlers;
pub mod routes;
pub mod websocket;

pub use handlers::ApiState;
pub use routes::create_router;
pub use websocket::{WsBroadcaster, WsEvent};
