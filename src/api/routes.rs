//! REST API routes configuration

use crate::api::handlers::{self, ApiState};
use crate::api::websocket::ws_handler;
use axum::{
    body::Body,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// JSON 404 for unknown routes
async fn fallback_handler(uri: axum::http::Uri) -> impl IntoResponse {
    log::debug!("No route for {}", uri.path());

    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "application/json")],
        Body::from(r#"{"error":"Not Found"}"#),
    )
        .into_response()
}

/// Create the API router with all routes
pub fn create_router(state: ApiState) -> Router {
    // Configure CORS for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // WebSocket for real-time updates
        .route("/ws", get(ws_handler))
        .route("/api/config", get(handlers::get_config))
        .route("/api/keys", post(handlers::create_key_account))
        // Accounts
        .route("/api/multisig", get(handlers::list_accounts))
        .route("/api/multisig", post(handlers::create_account))
        .route("/api/multisig/migrate", post(handlers::migrate_account))
        .route(
            "/api/multisig/next-address/{creator}",
            get(handlers::next_account_address),
        )
        .route("/api/multisig/{address}", get(handlers::get_account))
        .route("/api/multisig/{address}/events", get(handlers::list_events))
        // Transactions
        .route(
            "/api/multisig/{address}/transactions",
            get(handlers::list_transactions).post(handlers::propose_transaction),
        )
        .route(
            "/api/multisig/{address}/transactions/{seq}",
            get(handlers::get_transaction),
        )
        .route(
            "/api/multisig/{address}/transactions/{seq}/vote",
            post(handlers::vote),
        )
        .route(
            "/api/multisig/{address}/transactions/{seq}/votes/{owner}",
            get(handlers::get_vote_status),
        )
        .route("/api/multisig/{address}/execute", post(handlers::execute_next))
        .route("/api/multisig/{address}/reject", post(handlers::reject))
        .fallback(fallback_handler)
        // Add state and middleware
        .with_state(state)
        .layer(cors)
}

