use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::clock;
use crate::context::UserContext;
use crate::error::ApiError;
use crate::events;
use crate::money::Paise;

use super::WalletState;
use super::limits::{self, WalletLimits};
use super::store::{self, Hold, Wallet, WalletType};
use super::transfer::{self, DepositRequest, SettlementOutcome, TransferRequest, UpiIntent};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "wallet" }))
}

#[derive(Deserialize)]
pub struct CreateWalletRequest {
    #[serde(rename = "type", default)]
    pub wallet_type: WalletType,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    crate::money::DEFAULT_CURRENCY.to_string()
}

pub async fn create_wallet(
    ctx: UserContext,
    State(state): State<WalletState>,
    Json(req): Json<CreateWalletRequest>,
) -> Result<Json<Wallet>, ApiError> {
    let wallet = {
        let conn = state.db.lock().await;
        store::create_wallet(&conn, &ctx.user_id, req.wallet_type, &req.currency)?
    };

    state.publisher.publish(
        events::topics::WALLETS,
        events::WALLET_CREATED,
        json!({ "wallet_id": wallet.id, "user_id": wallet.user_id }),
    );
    Ok(Json(wallet))
}

pub async fn list_wallets(
    ctx: UserContext,
    State(state): State<WalletState>,
) -> Result<Json<Vec<Wallet>>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(store::list_wallets(&conn, &ctx.user_id)?))
}

pub async fn get_wallet(
    ctx: UserContext,
    State(state): State<WalletState>,
    Path(id): Path<String>,
) -> Result<Json<Wallet>, ApiError> {
    let conn = state.db.lock().await;
    let wallet = store::get_wallet(&conn, &id)?;
    if wallet.user_id != ctx.user_id {
        return Err(ApiError::not_found("wallet not found"));
    }
    Ok(Json(wallet))
}

/// Unscoped read for the orchestrator.
pub async fn get_wallet_internal(
    State(state): State<WalletState>,
    Path(id): Path<String>,
) -> Result<Json<Wallet>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(store::get_wallet(&conn, &id)?))
}

#[derive(Serialize)]
pub struct BalanceResponse {
    pub wallet_id: String,
    pub balance: Paise,
    pub available_balance: Paise,
    pub currency: String,
}

pub async fn get_balance(
    ctx: UserContext,
    State(state): State<WalletState>,
    Path(id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let conn = state.db.lock().await;
    let wallet = store::get_wallet(&conn, &id)?;
    if wallet.user_id != ctx.user_id {
        return Err(ApiError::not_found("wallet not found"));
    }
    Ok(Json(BalanceResponse {
        wallet_id: wallet.id,
        balance: wallet.balance,
        available_balance: wallet.available_balance,
        currency: wallet.currency,
    }))
}

pub async fn get_limits(
    State(state): State<WalletState>,
    Path(id): Path<String>,
) -> Result<Json<WalletLimits>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(limits::effective(&conn, &id, clock::unix_now())?))
}

#[derive(Deserialize)]
pub struct UpdateLimitsRequest {
    pub daily_limit: Paise,
    pub monthly_limit: Paise,
}

pub async fn update_limits(
    State(state): State<WalletState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateLimitsRequest>,
) -> Result<Json<WalletLimits>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(limits::update_limits(
        &conn,
        &id,
        req.daily_limit,
        req.monthly_limit,
    )?))
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct UserRecord {
    #[allow(dead_code)]
    id: String,
    #[serde(default)]
    kyc_verified: bool,
}

#[derive(Deserialize)]
struct AccountRef {
    id: String,
}

pub async fn activate(
    ctx: UserContext,
    State(state): State<WalletState>,
    Path(id): Path<String>,
) -> Result<Json<Wallet>, ApiError> {
    let wallet = {
        let conn = state.db.lock().await;
        store::get_wallet(&conn, &id)?
    };
    if wallet.user_id != ctx.user_id {
        return Err(ApiError::not_found("wallet not found"));
    }

    let user: UserRecord = state
        .identity
        .get_json(&format!("/internal/v1/users/{}", ctx.user_id))
        .await?;
    if !user.kyc_verified {
        return Err(ApiError::validation(
            "user has not completed KYC verification",
        ));
    }

    let short: String = id.chars().filter(|c| *c != '-').take(8).collect();
    let account: AccountRef = state
        .ledger
        .post_json(
            "/internal/v1/ledger/accounts",
            &json!({
                "code": format!("WAL-{short}"),
                "name": format!("Wallet {short} liability"),
                "type": "liability",
                "currency": wallet.currency,
            }),
        )
        .await?;

    let activated = {
        let conn = state.db.lock().await;
        store::activate(&conn, &id, &account.id)?
    };

    state.publisher.publish(
        events::topics::WALLETS,
        events::WALLET_UPDATED,
        json!({ "wallet_id": activated.id, "status": activated.status }),
    );
    Ok(Json(activated))
}

#[derive(Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

pub async fn freeze(
    State(state): State<WalletState>,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<Wallet>, ApiError> {
    let wallet = {
        let conn = state.db.lock().await;
        store::freeze(&conn, &id, &req.reason)?
    };
    publish_updated(&state, &wallet);
    Ok(Json(wallet))
}

pub async fn unfreeze(
    State(state): State<WalletState>,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<Wallet>, ApiError> {
    let wallet = {
        let conn = state.db.lock().await;
        store::unfreeze(&conn, &id, &req.reason)?
    };
    publish_updated(&state, &wallet);
    Ok(Json(wallet))
}

pub async fn close(
    State(state): State<WalletState>,
    Path(id): Path<String>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<Wallet>, ApiError> {
    let wallet = {
        let conn = state.db.lock().await;
        store::close(&conn, &id, &req.reason)?
    };
    publish_updated(&state, &wallet);
    Ok(Json(wallet))
}

// ── Holds ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct PlaceHoldRequest {
    pub amount: Paise,
    pub reason: Option<String>,
}

pub async fn place_hold(
    State(state): State<WalletState>,
    Path(id): Path<String>,
    Json(req): Json<PlaceHoldRequest>,
) -> Result<Json<Hold>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(store::place_hold(
        &conn,
        &id,
        req.amount,
        req.reason.as_deref(),
    )?))
}

pub async fn release_hold(
    State(state): State<WalletState>,
    Path((id, hold_id)): Path<(String, String)>,
) -> Result<Json<Hold>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(store::release_hold(&conn, &id, &hold_id)?))
}

// ── UPI intents ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct UpiIntentRequest {
    pub amount: Paise,
}

pub async fn create_upi_intent(
    State(state): State<WalletState>,
    Path(id): Path<String>,
    Json(req): Json<UpiIntentRequest>,
) -> Result<Json<UpiIntent>, ApiError> {
    let conn = state.db.lock().await;
    Ok(Json(transfer::create_upi_intent(&conn, &id, req.amount)?))
}

pub async fn complete_upi_intent(
    State(state): State<WalletState>,
    Path(intent_id): Path<String>,
) -> Result<Json<UpiIntent>, ApiError> {
    let intent = {
        let mut conn = state.db.lock().await;
        transfer::complete_upi_intent(&mut conn, &intent_id)?
    };

    state.publisher.publish(
        events::topics::WALLETS,
        events::WALLET_UPDATED,
        json!({ "wallet_id": intent.wallet_id, "upi_intent_id": intent.id }),
    );
    Ok(Json(intent))
}

// ── Settlement (internal) ───────────────────────────────────────────

pub async fn execute_transfer(
    State(state): State<WalletState>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<SettlementOutcome>, ApiError> {
    let mut conn = state.db.lock().await;
    Ok(Json(transfer::execute_transfer(&mut conn, &req)?))
}

pub async fn execute_deposit(
    State(state): State<WalletState>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<SettlementOutcome>, ApiError> {
    let mut conn = state.db.lock().await;
    Ok(Json(transfer::execute_deposit(&mut conn, &req)?))
}

pub async fn execute_withdrawal(
    State(state): State<WalletState>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<SettlementOutcome>, ApiError> {
    let mut conn = state.db.lock().await;
    Ok(Json(transfer::execute_withdrawal(&mut conn, &req)?))
}

fn publish_updated(state: &WalletState, wallet: &Wallet) {
    state.publisher.publish(
        events::topics::WALLETS,
        events::WALLET_UPDATED,
        json!({ "wallet_id": wallet.id, "status": wallet.status }),
    );
}
