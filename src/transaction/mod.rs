pub mod clients;
pub mod handlers;
pub mod orchestrator;
pub mod store;

use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::routing::{get, post};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::client::ServiceClient;
use crate::config::Config;
use crate::db::{self, Db};
use crate::error::ApiError;
use crate::events::EventPublisher;

use orchestrator::Orchestrator;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS transactions (
    id                    TEXT PRIMARY KEY,
    type                  TEXT NOT NULL,
    status                TEXT NOT NULL DEFAULT 'pending',
    user_id               TEXT NOT NULL,
    source_wallet_id      TEXT,
    destination_wallet_id TEXT,
    amount                INTEGER NOT NULL,
    currency              TEXT NOT NULL,
    description           TEXT,
    external_ref          TEXT,
    parent_transaction_id TEXT REFERENCES transactions(id),
    ledger_entry_id       TEXT,
    failure_reason        TEXT,
    metadata              TEXT NOT NULL DEFAULT '{}',
    created_at            INTEGER NOT NULL,
    processed_at          INTEGER,
    completed_at          INTEGER,
    updated_at            INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_user_ref
    ON transactions(user_id, external_ref) WHERE external_ref IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions(user_id, created_at);
";

#[derive(Debug, Error)]
pub enum TxError {
    #[error("transaction not found")]
    NotFound,
    #[error("illegal transaction transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("external reference already used")]
    DuplicateReference,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl From<TxError> for ApiError {
    fn from(err: TxError) -> Self {
        match err {
            TxError::NotFound => ApiError::not_found(err.to_string()),
            TxError::InvalidTransition { .. } | TxError::DuplicateReference => {
                ApiError::conflict(err.to_string())
            }
            TxError::Invalid(_) => ApiError::validation(err.to_string()),
            TxError::Db(e) => e.into(),
        }
    }
}

#[derive(Clone)]
pub struct TxState {
    pub db: Db,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn router(state: TxState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/v1/transactions",
            get(handlers::list_transactions),
        )
        .route("/api/v1/transactions/transfer", post(handlers::create_transfer))
        .route("/api/v1/transactions/deposit", post(handlers::create_deposit))
        .route(
            "/api/v1/transactions/withdrawal",
            post(handlers::create_withdrawal),
        )
        .route("/api/v1/transactions/{id}", get(handlers::get_transaction))
        .route(
            "/api/v1/transactions/{id}/reverse",
            post(handlers::reverse_transaction),
        )
        .route(
            "/api/v1/transactions/{id}/cancel",
            post(handlers::cancel_transaction),
        )
        .layer(cors)
        .with_state(state)
}

pub async fn serve(cfg: Config) -> Result<()> {
    let db = db::open(&cfg.database_path(), SCHEMA)?;
    let publisher = EventPublisher::new(&cfg.gateway_url, &cfg.internal_token);

    let orchestrator = Orchestrator {
        db: db.clone(),
        risk: Arc::new(clients::HttpRiskGate::new(ServiceClient::new(&cfg.risk_url))),
        wallets: Arc::new(clients::HttpWalletGate::new(ServiceClient::new(
            &cfg.wallet_url,
        ))),
        ledger: Arc::new(clients::HttpLedgerGate::new(ServiceClient::new(
            &cfg.ledger_url,
        ))),
        events: Arc::new(clients::HttpEventSink::new(publisher)),
        notifier: Arc::new(clients::HttpNotifySink::new(ServiceClient::new(
            &cfg.notification_url,
        ))),
        risk_fail_closed: cfg.risk_fail_closed,
    };

    let state = TxState {
        db,
        orchestrator: Arc::new(orchestrator),
    };
    crate::serve::run("transactions", cfg.port, router(state)).await
}
