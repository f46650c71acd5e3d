use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock;
use crate::db_str_enum;
use crate::money::Paise;

use super::WalletError;
use super::limits;
use super::store::{self, Wallet, WalletStatus};

pub const UPI_INTENT_TTL_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    /// Idempotency key: the orchestrator's transaction id.
    pub transaction_id: String,
    pub source_wallet_id: String,
    pub destination_wallet_id: String,
    pub amount: Paise,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub transaction_id: String,
    pub wallet_id: String,
    pub amount: Paise,
}

#[derive(Debug, Serialize)]
pub struct SettlementOutcome {
    /// False when the idempotency ledger already contained this
    /// transaction and the call was a no-op replay.
    pub applied: bool,
}

/// Move `amount` between two active wallets in one serialized database
/// transaction. Wallet rows are touched in ascending id order so
/// concurrent movements cannot deadlock.
pub fn execute_transfer(
    conn: &mut Connection,
    req: &TransferRequest,
) -> Result<SettlementOutcome, WalletError> {
    if req.amount <= 0 {
        return Err(WalletError::InvalidAmount);
    }
    if req.source_wallet_id == req.destination_wallet_id {
        return Err(WalletError::SameWallet);
    }

    let tx = conn.transaction()?;
    let now = clock::unix_now();

    if transfer_already_processed(&tx, &req.transaction_id)? {
        return Ok(SettlementOutcome { applied: false });
    }

    let window = limits::load_for_update(&tx, &req.source_wallet_id, now)?;
    limits::verify(&window, req.amount)?;

    // Deterministic lock order: smaller wallet id first.
    let (first, second) = if req.source_wallet_id < req.destination_wallet_id {
        (&req.source_wallet_id, &req.destination_wallet_id)
    } else {
        (&req.destination_wallet_id, &req.source_wallet_id)
    };
    let first_wallet = store::get_wallet(&tx, first)?;
    let second_wallet = store::get_wallet(&tx, second)?;
    let (source, destination) = if *first == req.source_wallet_id {
        (&first_wallet, &second_wallet)
    } else {
        (&second_wallet, &first_wallet)
    };

    require_active(source)?;
    require_active(destination)?;
    if source.currency != destination.currency {
        return Err(WalletError::CurrencyMismatch);
    }
    if source.available_balance < req.amount {
        return Err(WalletError::InsufficientFunds {
            available: source.available_balance,
            requested: req.amount,
        });
    }

    debit_wallet(&tx, &source.id, req.amount, now)?;
    credit_wallet(&tx, &destination.id, req.amount, now)?;
    limits::consume(&tx, &source.id, req.amount, now)?;

    tx.execute(
        "INSERT INTO processed_transfers
             (transaction_id, source_wallet_id, destination_wallet_id, amount, processed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            req.transaction_id,
            req.source_wallet_id,
            req.destination_wallet_id,
            req.amount,
            now
        ],
    )?;

    tx.commit()?;
    Ok(SettlementOutcome { applied: true })
}

/// Credit a wallet from outside money. No limits apply to inbound funds.
pub fn execute_deposit(
    conn: &mut Connection,
    req: &DepositRequest,
) -> Result<SettlementOutcome, WalletError> {
    if req.amount <= 0 {
        return Err(WalletError::InvalidAmount);
    }

    let tx = conn.transaction()?;
    let now = clock::unix_now();

    let replayed: Option<String> = tx
        .query_row(
            "SELECT transaction_id FROM processed_deposits WHERE transaction_id = ?1",
            [&req.transaction_id],
            |r| r.get(0),
        )
        .ok();
    if replayed.is_some() {
        return Ok(SettlementOutcome { applied: false });
    }

    let wallet = store::get_wallet(&tx, &req.wallet_id)?;
    require_active(&wallet)?;

    credit_wallet(&tx, &wallet.id, req.amount, now)?;
    tx.execute(
        "INSERT INTO processed_deposits (transaction_id, wallet_id, amount, processed_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![req.transaction_id, req.wallet_id, req.amount, now],
    )?;

    tx.commit()?;
    Ok(SettlementOutcome { applied: true })
}

/// Debit a wallet toward outside money. Counts against transfer limits;
/// records into the transfer ledger with no destination.
pub fn execute_withdrawal(
    conn: &mut Connection,
    req: &DepositRequest,
) -> Result<SettlementOutcome, WalletError> {
    if req.amount <= 0 {
        return Err(WalletError::InvalidAmount);
    }

    let tx = conn.transaction()?;
    let now = clock::unix_now();

    if transfer_already_processed(&tx, &req.transaction_id)? {
        return Ok(SettlementOutcome { applied: false });
    }

    let window = limits::load_for_update(&tx, &req.wallet_id, now)?;
    limits::verify(&window, req.amount)?;

    let wallet = store::get_wallet(&tx, &req.wallet_id)?;
    require_active(&wallet)?;
    if wallet.available_balance < req.amount {
        return Err(WalletError::InsufficientFunds {
            available: wallet.available_balance,
            requested: req.amount,
        });
    }

    debit_wallet(&tx, &wallet.id, req.amount, now)?;
    limits::consume(&tx, &wallet.id, req.amount, now)?;
    tx.execute(
        "INSERT INTO processed_transfers
             (transaction_id, source_wallet_id, destination_wallet_id, amount, processed_at)
         VALUES (?1, ?2, NULL, ?3, ?4)",
        rusqlite::params![req.transaction_id, req.wallet_id, req.amount, now],
    )?;

    tx.commit()?;
    Ok(SettlementOutcome { applied: true })
}

// ── UPI deposit intents ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Completed,
    Expired,
}

db_str_enum!(IntentStatus {
    Pending => "pending",
    Completed => "completed",
    Expired => "expired",
});

#[derive(Debug, Clone, Serialize)]
pub struct UpiIntent {
    pub id: String,
    pub wallet_id: String,
    pub transaction_id: String,
    pub amount: Paise,
    pub vpa: String,
    pub status: IntentStatus,
    pub expires_at: i64,
    pub created_at: i64,
}

/// Stage an inbound UPI deposit. The stored transaction id later drives
/// the idempotent deposit path when the payment callback lands.
pub fn create_upi_intent(
    conn: &Connection,
    wallet_id: &str,
    amount: Paise,
) -> Result<UpiIntent, WalletError> {
    if amount <= 0 {
        return Err(WalletError::InvalidAmount);
    }
    let wallet = store::get_wallet(conn, wallet_id)?;
    require_active(&wallet)?;
    let vpa = wallet
        .vpa
        .unwrap_or_else(|| store::derive_vpa(wallet_id));

    let id = Uuid::new_v4().to_string();
    let now = clock::unix_now();
    conn.execute(
        "INSERT INTO upi_intents (id, wallet_id, transaction_id, amount, vpa, expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            id,
            wallet_id,
            Uuid::new_v4().to_string(),
            amount,
            vpa,
            now + UPI_INTENT_TTL_SECS,
            now
        ],
    )?;

    get_upi_intent(conn, &id)
}

pub fn complete_upi_intent(
    conn: &mut Connection,
    intent_id: &str,
) -> Result<UpiIntent, WalletError> {
    let intent = get_upi_intent(conn, intent_id)?;
    match intent.status {
        IntentStatus::Pending => {}
        _ => return Err(WalletError::IntentNotPending),
    }
    if clock::unix_now() >= intent.expires_at {
        conn.execute(
            "UPDATE upi_intents SET status = 'expired' WHERE id = ?1",
            [intent_id],
        )?;
        return Err(WalletError::IntentExpired);
    }

    execute_deposit(
        conn,
        &DepositRequest {
            transaction_id: intent.transaction_id.clone(),
            wallet_id: intent.wallet_id.clone(),
            amount: intent.amount,
        },
    )?;
    conn.execute(
        "UPDATE upi_intents SET status = 'completed' WHERE id = ?1",
        [intent_id],
    )?;

    get_upi_intent(conn, intent_id)
}

pub fn get_upi_intent(conn: &Connection, id: &str) -> Result<UpiIntent, WalletError> {
    conn.query_row(
        "SELECT id, wallet_id, transaction_id, amount, vpa, status, expires_at, created_at
         FROM upi_intents WHERE id = ?1",
        [id],
        |row| {
            Ok(UpiIntent {
                id: row.get(0)?,
                wallet_id: row.get(1)?,
                transaction_id: row.get(2)?,
                amount: row.get(3)?,
                vpa: row.get(4)?,
                status: row.get(5)?,
                expires_at: row.get(6)?,
                created_at: row.get(7)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => WalletError::IntentNotFound,
        other => other.into(),
    })
}

// ── Row mutations ───────────────────────────────────────────────────

fn transfer_already_processed(conn: &Connection, transaction_id: &str) -> Result<bool, WalletError> {
    let row: Option<String> = conn
        .query_row(
            "SELECT transaction_id FROM processed_transfers WHERE transaction_id = ?1",
            [transaction_id],
            |r| r.get(0),
        )
        .ok();
    Ok(row.is_some())
}

fn require_active(wallet: &Wallet) -> Result<(), WalletError> {
    if wallet.status != WalletStatus::Active {
        return Err(WalletError::NotActive(wallet.status.to_string()));
    }
    Ok(())
}

fn debit_wallet(conn: &Connection, id: &str, amount: Paise, now: i64) -> Result<(), WalletError> {
    conn.execute(
        "UPDATE wallets SET balance = balance - ?1,
             available_balance = available_balance - ?1, updated_at = ?2
         WHERE id = ?3",
        rusqlite::params![amount, now, id],
    )?;
    Ok(())
}

fn credit_wallet(conn: &Connection, id: &str, amount: Paise, now: i64) -> Result<(), WalletError> {
    conn.execute(
        "UPDATE wallets SET balance = balance + ?1,
             available_balance = available_balance + ?1, updated_at = ?2
         WHERE id = ?3",
        rusqlite::params![amount, now, id],
    )?;
    Ok(())
}
