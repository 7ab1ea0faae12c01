//! kerpass-server — HTTP session-carrier transport for the enrollment
//! protocol: one POST per protocol step, CBOR request/response bodies.
//!
//! # Module layout
//! - `config`  — [`ServerConfig::from_env`]
//! - `session` — the session table driving the server-side enrollment FSM
//!   one step per request
//! - `routes`  — the `/kerpass/v1/enroll` handler and the `/healthz` probe
//! - `error`   — [`ProtoError`] to HTTP status mapping

pub mod config;
pub mod error;
pub mod routes;
pub mod session;

use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use kerpass_store::{KeyStore, ServerCredStore};

pub use config::ServerConfig;
use session::SessionTable;

pub struct AppState {
    pub key_store: Arc<dyn KeyStore>,
    pub cred_store: Arc<dyn ServerCredStore>,
    pub key_name: String,
    pub sessions: SessionTable,
}

impl AppState {
    pub fn new(key_store: Arc<dyn KeyStore>, cred_store: Arc<dyn ServerCredStore>, key_name: impl Into<String>) -> Self {
        Self { key_store, cred_store, key_name: key_name.into(), sessions: SessionTable::new() }
    }
}

/// Builds the axum [`Router`] serving the enrollment endpoint.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/kerpass/v1/enroll", post(routes::enroll_step))
        .route("/healthz", axum::routing::get(routes::healthz))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
