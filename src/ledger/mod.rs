pub mod accounts;
pub mod entries;
pub mod handlers;

use anyhow::Result;
use axum::Router;
use axum::routing::{get, post};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db::{self, Db};
use crate::error::ApiError;
use crate::money::Paise;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id                TEXT PRIMARY KEY,
    code              TEXT UNIQUE NOT NULL,
    name              TEXT NOT NULL,
    type              TEXT NOT NULL,
    currency          TEXT NOT NULL,
    parent_account_id TEXT REFERENCES accounts(id),
    balance           INTEGER NOT NULL DEFAULT 0,
    total_debits      INTEGER NOT NULL DEFAULT 0,
    total_credits     INTEGER NOT NULL DEFAULT 0,
    status            TEXT NOT NULL DEFAULT 'active',
    metadata          TEXT,
    created_at        INTEGER NOT NULL,
    updated_at        INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS journal_entries (
    id                TEXT PRIMARY KEY,
    entry_number      TEXT UNIQUE NOT NULL,
    type              TEXT NOT NULL,
    status            TEXT NOT NULL DEFAULT 'draft',
    description       TEXT NOT NULL,
    reference_type    TEXT,
    reference_id      TEXT,
    posted_at         INTEGER,
    posted_by         TEXT,
    voided_at         INTEGER,
    voided_by         TEXT,
    void_reason       TEXT,
    reversal_entry_id TEXT REFERENCES journal_entries(id),
    metadata          TEXT,
    created_at        INTEGER NOT NULL,
    updated_at        INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS ledger_lines (
    id          TEXT PRIMARY KEY,
    entry_id    TEXT NOT NULL REFERENCES journal_entries(id),
    line_no     INTEGER NOT NULL,
    account_id  TEXT NOT NULL REFERENCES accounts(id),
    debit       INTEGER NOT NULL DEFAULT 0,
    credit      INTEGER NOT NULL DEFAULT 0,
    description TEXT
);
CREATE INDEX IF NOT EXISTS idx_ledger_lines_entry ON ledger_lines(entry_id);
CREATE INDEX IF NOT EXISTS idx_ledger_lines_account ON ledger_lines(account_id);

CREATE TABLE IF NOT EXISTS entry_counters (
    year INTEGER PRIMARY KEY,
    next INTEGER NOT NULL
);

INSERT OR IGNORE INTO accounts
    (id, code, name, type, currency, status, created_at, updated_at)
VALUES
    ('acct-cash-inr', 'CASH', 'Cash and bank', 'asset', 'INR', 'active',
     unixepoch(), unixepoch());
";

/// The seeded cash/bank asset account every money movement settles against.
pub const CASH_ACCOUNT_CODE: &str = "CASH";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("account not found")]
    AccountNotFound,
    #[error("journal entry not found")]
    EntryNotFound,
    #[error("account code '{0}' already exists")]
    DuplicateCode(String),
    #[error("account '{0}' is not active")]
    AccountNotActive(String),
    #[error("journal entry needs at least two lines")]
    TooFewLines,
    #[error("line {0}: exactly one of debit or credit must be positive")]
    OneSidedLine(usize),
    #[error("entry is unbalanced: debits {debits}, credits {credits}")]
    Unbalanced { debits: Paise, credits: Paise },
    #[error("entry is '{actual}', expected '{expected}'")]
    WrongStatus {
        expected: &'static str,
        actual: String,
    },
    #[error("reason must be 10 to 500 characters")]
    BadReason,
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::AccountNotFound | LedgerError::EntryNotFound => {
                ApiError::not_found(err.to_string())
            }
            LedgerError::DuplicateCode(_) | LedgerError::WrongStatus { .. } => {
                ApiError::conflict(err.to_string())
            }
            LedgerError::Db(e) => e.into(),
            _ => ApiError::validation(err.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct LedgerState {
    pub db: Db,
}

pub fn router(state: LedgerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/v1/ledger/accounts",
            get(handlers::list_accounts).post(handlers::create_account),
        )
        .route(
            "/api/v1/ledger/accounts/{id}",
            get(handlers::get_account).patch(handlers::update_account),
        )
        .route(
            "/api/v1/ledger/entries",
            get(handlers::list_entries).post(handlers::create_entry),
        )
        .route("/api/v1/ledger/entries/{id}", get(handlers::get_entry))
        .route("/api/v1/ledger/entries/{id}/post", post(handlers::post_entry))
        .route("/api/v1/ledger/entries/{id}/void", post(handlers::void_entry))
        .route(
            "/api/v1/ledger/entries/{id}/reverse",
            post(handlers::reverse_entry),
        )
        // Service-to-service surface; never proxied by the gateway.
        .route("/internal/v1/ledger/accounts", post(handlers::create_account))
        .route(
            "/internal/v1/ledger/accounts/by-code/{code}",
            get(handlers::get_account_by_code),
        )
        .route("/internal/v1/ledger/entries", post(handlers::create_entry))
        .route(
            "/internal/v1/ledger/entries/{id}/post",
            post(handlers::post_entry),
        )
        .route(
            "/internal/v1/ledger/entries/{id}/reverse",
            post(handlers::reverse_entry),
        )
        .layer(cors)
        .with_state(state)
}

pub async fn serve(cfg: Config) -> Result<()> {
    let db = db::open(&cfg.database_path(), SCHEMA)?;
    let app = router(LedgerState { db });
    crate::serve::run("ledger", cfg.port, app).await
}
