use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock;
use crate::db_str_enum;
use crate::money::Paise;

use super::WalletError;
use super::limits;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    #[default]
    Default,
    Savings,
    Current,
    Fixed,
}

db_str_enum!(WalletType {
    Default => "default",
    Savings => "savings",
    Current => "current",
    Fixed => "fixed",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletStatus {
    Inactive,
    Active,
    Frozen,
    Closed,
}

db_str_enum!(WalletStatus {
    Inactive => "inactive",
    Active => "active",
    Frozen => "frozen",
    Closed => "closed",
});

#[derive(Debug, Clone, Serialize)]
pub struct Wallet {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub wallet_type: WalletType,
    pub currency: String,
    pub balance: Paise,
    pub available_balance: Paise,
    pub status: WalletStatus,
    pub ledger_account_id: Option<String>,
    pub vpa: Option<String>,
    pub closed_at: Option<i64>,
    pub close_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Hold {
    pub id: String,
    pub wallet_id: String,
    pub amount: Paise,
    pub reason: Option<String>,
    pub status: String,
    pub created_at: i64,
    pub released_at: Option<i64>,
}

const WALLET_COLUMNS: &str = "id, user_id, type, currency, balance, available_balance, \
     status, ledger_account_id, vpa, closed_at, close_reason, created_at, updated_at";

const MIN_REASON: usize = 10;

pub fn create_wallet(
    conn: &Connection,
    user_id: &str,
    wallet_type: WalletType,
    currency: &str,
) -> Result<Wallet, WalletError> {
    let duplicate: Option<String> = conn
        .query_row(
            "SELECT id FROM wallets
             WHERE user_id = ?1 AND type = ?2 AND currency = ?3 AND status != 'closed'",
            rusqlite::params![user_id, wallet_type, currency],
            |r| r.get(0),
        )
        .ok();
    if duplicate.is_some() {
        return Err(WalletError::DuplicateWallet);
    }

    let id = Uuid::new_v4().to_string();
    let now = clock::unix_now();
    conn.execute(
        "INSERT INTO wallets (id, user_id, type, currency, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        rusqlite::params![id, user_id, wallet_type, currency, now],
    )?;
    limits::init_limits(conn, &id, now)?;

    get_wallet(conn, &id)
}

pub fn get_wallet(conn: &Connection, id: &str) -> Result<Wallet, WalletError> {
    conn.query_row(
        &format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = ?1"),
        [id],
        row_to_wallet,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => WalletError::NotFound,
        other => other.into(),
    })
}

pub fn list_wallets(conn: &Connection, user_id: &str) -> Result<Vec<Wallet>, WalletError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = ?1 ORDER BY created_at"
    ))?;
    let wallets = stmt
        .query_map([user_id], row_to_wallet)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(wallets)
}

/// inactive -> active. The caller has already verified KYC and
/// provisioned the backing liability account.
pub fn activate(
    conn: &Connection,
    id: &str,
    ledger_account_id: &str,
) -> Result<Wallet, WalletError> {
    let wallet = get_wallet(conn, id)?;
    if wallet.status != WalletStatus::Inactive {
        return Err(transition_err(wallet.status, WalletStatus::Active));
    }

    let vpa = derive_vpa(id);
    conn.execute(
        "UPDATE wallets SET status = 'active', ledger_account_id = ?1, vpa = ?2,
             updated_at = ?3 WHERE id = ?4",
        rusqlite::params![ledger_account_id, vpa, clock::unix_now(), id],
    )?;
    get_wallet(conn, id)
}

pub fn freeze(conn: &Connection, id: &str, reason: &str) -> Result<Wallet, WalletError> {
    if reason.len() < MIN_REASON {
        return Err(WalletError::ReasonTooShort);
    }
    let wallet = get_wallet(conn, id)?;
    if wallet.status != WalletStatus::Active {
        return Err(transition_err(wallet.status, WalletStatus::Frozen));
    }
    conn.execute(
        "UPDATE wallets SET status = 'frozen', updated_at = ?1 WHERE id = ?2",
        rusqlite::params![clock::unix_now(), id],
    )?;
    get_wallet(conn, id)
}

pub fn unfreeze(conn: &Connection, id: &str, reason: &str) -> Result<Wallet, WalletError> {
    if reason.len() < MIN_REASON {
        return Err(WalletError::ReasonTooShort);
    }
    let wallet = get_wallet(conn, id)?;
    if wallet.status != WalletStatus::Frozen {
        return Err(transition_err(wallet.status, WalletStatus::Active));
    }
    conn.execute(
        "UPDATE wallets SET status = 'active', updated_at = ?1 WHERE id = ?2",
        rusqlite::params![clock::unix_now(), id],
    )?;
    get_wallet(conn, id)
}

pub fn close(conn: &Connection, id: &str, reason: &str) -> Result<Wallet, WalletError> {
    if reason.is_empty() {
        return Err(WalletError::ReasonTooShort);
    }
    let wallet = get_wallet(conn, id)?;
    if wallet.status == WalletStatus::Closed {
        return Err(transition_err(wallet.status, WalletStatus::Closed));
    }
    if wallet.balance != 0 {
        return Err(WalletError::NonZeroBalance);
    }
    let now = clock::unix_now();
    conn.execute(
        "UPDATE wallets SET status = 'closed', closed_at = ?1, close_reason = ?2,
             updated_at = ?1 WHERE id = ?3",
        rusqlite::params![now, reason, id],
    )?;
    get_wallet(conn, id)
}

/// Reserve part of the available balance. The balance itself is
/// untouched; only headroom shrinks.
pub fn place_hold(
    conn: &Connection,
    wallet_id: &str,
    amount: Paise,
    reason: Option<&str>,
) -> Result<Hold, WalletError> {
    if amount <= 0 {
        return Err(WalletError::InvalidAmount);
    }
    let wallet = get_wallet(conn, wallet_id)?;
    if wallet.status != WalletStatus::Active {
        return Err(WalletError::NotActive(wallet.status.to_string()));
    }
    if wallet.available_balance < amount {
        return Err(WalletError::InsufficientFunds {
            available: wallet.available_balance,
            requested: amount,
        });
    }

    let id = Uuid::new_v4().to_string();
    let now = clock::unix_now();
    conn.execute(
        "UPDATE wallets SET available_balance = available_balance - ?1, updated_at = ?2
         WHERE id = ?3",
        rusqlite::params![amount, now, wallet_id],
    )?;
    conn.execute(
        "INSERT INTO wallet_holds (id, wallet_id, amount, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![id, wallet_id, amount, reason, now],
    )?;

    get_hold(conn, &id)
}

pub fn release_hold(
    conn: &Connection,
    wallet_id: &str,
    hold_id: &str,
) -> Result<Hold, WalletError> {
    let hold = get_hold(conn, hold_id)?;
    if hold.wallet_id != wallet_id || hold.status != "active" {
        return Err(WalletError::HoldNotFound);
    }

    let now = clock::unix_now();
    conn.execute(
        "UPDATE wallets SET available_balance = available_balance + ?1, updated_at = ?2
         WHERE id = ?3",
        rusqlite::params![hold.amount, now, wallet_id],
    )?;
    conn.execute(
        "UPDATE wallet_holds SET status = 'released', released_at = ?1 WHERE id = ?2",
        rusqlite::params![now, hold_id],
    )?;

    get_hold(conn, hold_id)
}

pub fn derive_vpa(wallet_id: &str) -> String {
    let short: String = wallet_id.chars().filter(|c| *c != '-').take(8).collect();
    format!("{short}@nivo")
}

fn get_hold(conn: &Connection, id: &str) -> Result<Hold, WalletError> {
    conn.query_row(
        "SELECT id, wallet_id, amount, reason, status, created_at, released_at
         FROM wallet_holds WHERE id = ?1",
        [id],
        |row| {
            Ok(Hold {
                id: row.get(0)?,
                wallet_id: row.get(1)?,
                amount: row.get(2)?,
                reason: row.get(3)?,
                status: row.get(4)?,
                created_at: row.get(5)?,
                released_at: row.get(6)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => WalletError::HoldNotFound,
        other => other.into(),
    })
}

fn transition_err(from: WalletStatus, to: WalletStatus) -> WalletError {
    WalletError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn row_to_wallet(row: &rusqlite::Row<'_>) -> rusqlite::Result<Wallet> {
    Ok(Wallet {
        id: row.get(0)?,
        user_id: row.get(1)?,
        wallet_type: row.get(2)?,
        currency: row.get(3)?,
        balance: row.get(4)?,
        available_balance: row.get(5)?,
        status: row.get(6)?,
        ledger_account_id: row.get(7)?,
        vpa: row.get(8)?,
        closed_at: row.get(9)?,
        close_reason: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}
