use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::clock;
use crate::error::ApiError;
use crate::token;

use super::IdentityState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "identity" }))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub status: String,
    pub roles: Vec<String>,
    pub kyc_verified: bool,
    pub created_at: i64,
}

pub async fn register(
    State(state): State<IdentityState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if !req.email.contains('@') {
        return Err(ApiError::validation("a valid email is required"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::validation("password must be at least 8 characters"));
    }

    let password_hash = bcrypt::hash(&req.password, 12)
        .map_err(|e| ApiError::internal(format!("hashing password: {e}")))?;
    let user_id = Uuid::new_v4().to_string();

    let conn = state.db.lock().await;

    let existing: Option<String> = conn
        .query_row("SELECT id FROM users WHERE email = ?1", [&req.email], |r| {
            r.get(0)
        })
        .ok();
    if existing.is_some() {
        return Err(ApiError::conflict("email already registered"));
    }

    conn.execute(
        "INSERT INTO users (id, email, password_hash, full_name, roles, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, '[\"user\"]', ?5, ?5)",
        rusqlite::params![user_id, req.email, password_hash, req.full_name, clock::unix_now()],
    )?;

    load_user(&conn, &user_id).map(Json)
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

pub async fn login(
    State(state): State<IdentityState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let conn = state.db.lock().await;

    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT id, password_hash FROM users WHERE email = ?1",
            [&req.email],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .ok();

    let (user_id, password_hash) =
        row.ok_or_else(|| ApiError::unauthorized("invalid email or password"))?;

    if !bcrypt::verify(&req.password, &password_hash).unwrap_or(false) {
        return Err(ApiError::unauthorized("invalid email or password"));
    }

    let user = load_user(&conn, &user_id)?;
    let permissions = load_permissions(&conn, &user_id)?;
    let token = token::issue(
        &user.id,
        &user.email,
        &user.status,
        user.roles.clone(),
        permissions,
        &state.jwt_secret,
    )?;

    Ok(Json(LoginResponse { token, user }))
}

pub async fn get_user(
    State(state): State<IdentityState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let conn = state.db.lock().await;
    load_user(&conn, &id).map(Json)
}

/// Marks the user KYC-verified and activates the account. Wallet
/// activation checks this flag before provisioning a ledger account.
pub async fn verify_kyc(
    State(state): State<IdentityState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let conn = state.db.lock().await;

    let affected = conn.execute(
        "UPDATE users SET kyc_verified = 1, status = 'active', updated_at = ?1 WHERE id = ?2",
        rusqlite::params![clock::unix_now(), id],
    )?;
    if affected == 0 {
        return Err(ApiError::not_found("user not found"));
    }

    load_user(&conn, &id).map(Json)
}

fn load_user(conn: &rusqlite::Connection, id: &str) -> Result<UserResponse, ApiError> {
    conn.query_row(
        "SELECT id, email, full_name, status, roles, kyc_verified, created_at
         FROM users WHERE id = ?1",
        [id],
        |row| {
            let roles: String = row.get(4)?;
            Ok(UserResponse {
                id: row.get(0)?,
                email: row.get(1)?,
                full_name: row.get(2)?,
                status: row.get(3)?,
                roles: serde_json::from_str(&roles).unwrap_or_default(),
                kyc_verified: row.get(5)?,
                created_at: row.get(6)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => ApiError::not_found("user not found"),
        other => other.into(),
    })
}

fn load_permissions(conn: &rusqlite::Connection, id: &str) -> Result<Vec<String>, ApiError> {
    let raw: String = conn.query_row(
        "SELECT permissions FROM users WHERE id = ?1",
        [id],
        |r| r.get(0),
    )?;
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}
