pub mod handlers;
pub mod limits;
pub mod store;
pub mod transfer;

use anyhow::Result;
use axum::Router;
use axum::routing::{get, post, put};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::client::ServiceClient;
use crate::config::Config;
use crate::db::{self, Db};
use crate::error::ApiError;
use crate::events::EventPublisher;
use crate::money::Paise;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS wallets (
    id                TEXT PRIMARY KEY,
    user_id           TEXT NOT NULL,
    type              TEXT NOT NULL DEFAULT 'default',
    currency          TEXT NOT NULL DEFAULT 'INR',
    balance           INTEGER NOT NULL DEFAULT 0,
    available_balance INTEGER NOT NULL DEFAULT 0,
    status            TEXT NOT NULL DEFAULT 'inactive',
    ledger_account_id TEXT,
    vpa               TEXT,
    closed_at         INTEGER,
    close_reason      TEXT,
    created_at        INTEGER NOT NULL,
    updated_at        INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_wallets_user_type_currency
    ON wallets(user_id, type, currency) WHERE status != 'closed';

CREATE TABLE IF NOT EXISTS wallet_limits (
    wallet_id        TEXT PRIMARY KEY REFERENCES wallets(id),
    daily_limit      INTEGER NOT NULL,
    daily_spent      INTEGER NOT NULL DEFAULT 0,
    daily_reset_at   INTEGER NOT NULL,
    monthly_limit    INTEGER NOT NULL,
    monthly_spent    INTEGER NOT NULL DEFAULT 0,
    monthly_reset_at INTEGER NOT NULL,
    updated_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS wallet_holds (
    id          TEXT PRIMARY KEY,
    wallet_id   TEXT NOT NULL REFERENCES wallets(id),
    amount      INTEGER NOT NULL,
    reason      TEXT,
    status      TEXT NOT NULL DEFAULT 'active',
    created_at  INTEGER NOT NULL,
    released_at INTEGER
);

CREATE TABLE IF NOT EXISTS processed_transfers (
    transaction_id        TEXT PRIMARY KEY,
    source_wallet_id      TEXT NOT NULL,
    destination_wallet_id TEXT,
    amount                INTEGER NOT NULL,
    processed_at          INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS processed_deposits (
    transaction_id TEXT PRIMARY KEY,
    wallet_id      TEXT NOT NULL,
    amount         INTEGER NOT NULL,
    processed_at   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS upi_intents (
    id             TEXT PRIMARY KEY,
    wallet_id      TEXT NOT NULL REFERENCES wallets(id),
    transaction_id TEXT NOT NULL,
    amount         INTEGER NOT NULL,
    vpa            TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'pending',
    expires_at     INTEGER NOT NULL,
    created_at     INTEGER NOT NULL
);
";

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet not found")]
    NotFound,
    #[error("hold not found")]
    HoldNotFound,
    #[error("deposit intent not found")]
    IntentNotFound,
    #[error("wallet is '{0}', not active")]
    NotActive(String),
    #[error("wallet currencies do not match")]
    CurrencyMismatch,
    #[error("amount must be positive")]
    InvalidAmount,
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Paise, requested: Paise },
    #[error("daily limit exceeded: spent {spent} of {limit}")]
    DailyLimitExceeded { spent: Paise, limit: Paise },
    #[error("monthly limit exceeded: spent {spent} of {limit}")]
    MonthlyLimitExceeded { spent: Paise, limit: Paise },
    #[error("illegal wallet transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("wallet balance must be zero to close")]
    NonZeroBalance,
    #[error("reason must be at least 10 characters")]
    ReasonTooShort,
    #[error("a non-closed wallet of this type and currency already exists")]
    DuplicateWallet,
    #[error("deposit intent expired")]
    IntentExpired,
    #[error("deposit intent is not pending")]
    IntentNotPending,
    #[error("daily limit must be positive and not exceed the monthly limit")]
    InvalidLimits,
    #[error("source and destination wallets must differ")]
    SameWallet,
    #[error("user has not completed KYC verification")]
    KycRequired,
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl From<WalletError> for ApiError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::NotFound | WalletError::HoldNotFound | WalletError::IntentNotFound => {
                ApiError::not_found(err.to_string())
            }
            WalletError::NotActive(_)
            | WalletError::InvalidTransition { .. }
            | WalletError::DuplicateWallet
            | WalletError::IntentNotPending => ApiError::conflict(err.to_string()),
            WalletError::Db(e) => e.into(),
            _ => ApiError::validation(err.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct WalletState {
    pub db: Db,
    pub publisher: EventPublisher,
    pub identity: ServiceClient,
    pub ledger: ServiceClient,
}

pub fn router(state: WalletState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/v1/wallets",
            get(handlers::list_wallets).post(handlers::create_wallet),
        )
        .route("/api/v1/wallets/{id}", get(handlers::get_wallet))
        .route("/api/v1/wallets/{id}/balance", get(handlers::get_balance))
        .route(
            "/api/v1/wallets/{id}/limits",
            get(handlers::get_limits).put(handlers::update_limits),
        )
        .route("/api/v1/wallets/{id}/activate", post(handlers::activate))
        .route("/api/v1/wallets/{id}/freeze", post(handlers::freeze))
        .route("/api/v1/wallets/{id}/unfreeze", post(handlers::unfreeze))
        .route("/api/v1/wallets/{id}/close", post(handlers::close))
        .route("/api/v1/wallets/{id}/holds", post(handlers::place_hold))
        .route(
            "/api/v1/wallets/{id}/holds/{hold_id}/release",
            post(handlers::release_hold),
        )
        .route(
            "/api/v1/wallets/{id}/deposit/upi",
            post(handlers::create_upi_intent),
        )
        .route(
            "/api/v1/wallets/upi/{intent_id}/complete",
            post(handlers::complete_upi_intent),
        )
        // Settlement surface for the transaction orchestrator.
        .route("/internal/v1/wallets/transfer", post(handlers::execute_transfer))
        .route("/internal/v1/wallets/deposit", post(handlers::execute_deposit))
        .route(
            "/internal/v1/wallets/withdraw",
            post(handlers::execute_withdrawal),
        )
        .route("/internal/v1/wallets/{id}", get(handlers::get_wallet_internal))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(cfg: Config) -> Result<()> {
    let db = db::open(&cfg.database_path(), SCHEMA)?;
    let state = WalletState {
        db,
        publisher: EventPublisher::new(&cfg.gateway_url, &cfg.internal_token),
        identity: ServiceClient::new(&cfg.identity_url),
        ledger: ServiceClient::new(&cfg.ledger_url),
    };
    crate::serve::run("wallet", cfg.port, router(state)).await
}
