pub mod handlers;

use anyhow::Result;
use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::db::{self, Db};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY,
    email         TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    full_name     TEXT,
    status        TEXT NOT NULL DEFAULT 'pending',
    roles         TEXT NOT NULL DEFAULT '[]',
    permissions   TEXT NOT NULL DEFAULT '[]',
    kyc_verified  INTEGER NOT NULL DEFAULT 0,
    created_at    INTEGER NOT NULL,
    updated_at    INTEGER NOT NULL
);
";

#[derive(Clone)]
pub struct IdentityState {
    pub db: Db,
    pub jwt_secret: String,
}

pub fn router(state: IdentityState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/identity/auth/register", post(handlers::register))
        .route("/api/v1/identity/auth/login", post(handlers::login))
        .route("/api/v1/identity/users/{id}", get(handlers::get_user))
        .route(
            "/api/v1/identity/users/{id}/verify-kyc",
            post(handlers::verify_kyc),
        )
        .route("/internal/v1/users/{id}", get(handlers::get_user))
        .layer(cors)
        .with_state(state)
}

pub async fn serve(cfg: Config) -> Result<()> {
    let db = db::open(&cfg.database_path(), SCHEMA)?;
    let state = IdentityState {
        db,
        jwt_secret: cfg.jwt_secret.clone(),
    };
    crate::serve::run("identity", cfg.port, router(state)).await
}
