use rusqlite::Connection;
use serde::Serialize;

use crate::clock;
use crate::money::Paise;

use super::WalletError;

pub const DEFAULT_DAILY_LIMIT: Paise = 10_000_000; // 1,00,000 INR
pub const DEFAULT_MONTHLY_LIMIT: Paise = 100_000_000; // 10,00,000 INR

#[derive(Debug, Clone, Serialize)]
pub struct WalletLimits {
    pub wallet_id: String,
    pub daily_limit: Paise,
    pub daily_spent: Paise,
    pub daily_reset_at: i64,
    pub monthly_limit: Paise,
    pub monthly_spent: Paise,
    pub monthly_reset_at: i64,
}

pub fn init_limits(conn: &Connection, wallet_id: &str, now: i64) -> Result<(), WalletError> {
    conn.execute(
        "INSERT INTO wallet_limits (wallet_id, daily_limit, daily_reset_at,
             monthly_limit, monthly_reset_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            wallet_id,
            DEFAULT_DAILY_LIMIT,
            clock::next_day_boundary(now),
            DEFAULT_MONTHLY_LIMIT,
            clock::next_month_boundary(now),
            now,
        ],
    )?;
    Ok(())
}

/// Load the limits row for a mutation, applying any due period reset
/// first. The reset happens inside the caller's transaction so the very
/// operation that triggered it observes the fresh window. Resets never
/// run on unrelated writes.
pub fn load_for_update(
    conn: &Connection,
    wallet_id: &str,
    now: i64,
) -> Result<WalletLimits, WalletError> {
    let mut limits = read(conn, wallet_id)?;

    if now >= limits.daily_reset_at {
        limits.daily_spent = 0;
        limits.daily_reset_at = clock::next_day_boundary(now);
        conn.execute(
            "UPDATE wallet_limits SET daily_spent = 0, daily_reset_at = ?1, updated_at = ?2
             WHERE wallet_id = ?3",
            rusqlite::params![limits.daily_reset_at, now, wallet_id],
        )?;
    }
    if now >= limits.monthly_reset_at {
        limits.monthly_spent = 0;
        limits.monthly_reset_at = clock::next_month_boundary(now);
        conn.execute(
            "UPDATE wallet_limits SET monthly_spent = 0, monthly_reset_at = ?1, updated_at = ?2
             WHERE wallet_id = ?3",
            rusqlite::params![limits.monthly_reset_at, now, wallet_id],
        )?;
    }

    Ok(limits)
}

/// Check the window headroom without consuming it.
pub fn verify(limits: &WalletLimits, amount: Paise) -> Result<(), WalletError> {
    if limits.daily_spent + amount > limits.daily_limit {
        return Err(WalletError::DailyLimitExceeded {
            spent: limits.daily_spent,
            limit: limits.daily_limit,
        });
    }
    if limits.monthly_spent + amount > limits.monthly_limit {
        return Err(WalletError::MonthlyLimitExceeded {
            spent: limits.monthly_spent,
            limit: limits.monthly_limit,
        });
    }
    Ok(())
}

/// Record spend against both windows.
pub fn consume(conn: &Connection, wallet_id: &str, amount: Paise, now: i64) -> Result<(), WalletError> {
    conn.execute(
        "UPDATE wallet_limits SET daily_spent = daily_spent + ?1,
             monthly_spent = monthly_spent + ?1, updated_at = ?2
         WHERE wallet_id = ?3",
        rusqlite::params![amount, now, wallet_id],
    )?;
    Ok(())
}

/// Read-only view with expired windows rendered as zero, without
/// touching the row.
pub fn effective(conn: &Connection, wallet_id: &str, now: i64) -> Result<WalletLimits, WalletError> {
    let mut limits = read(conn, wallet_id)?;
    if now >= limits.daily_reset_at {
        limits.daily_spent = 0;
    }
    if now >= limits.monthly_reset_at {
        limits.monthly_spent = 0;
    }
    Ok(limits)
}

pub fn update_limits(
    conn: &Connection,
    wallet_id: &str,
    daily_limit: Paise,
    monthly_limit: Paise,
) -> Result<WalletLimits, WalletError> {
    if daily_limit <= 0 || monthly_limit <= 0 || daily_limit > monthly_limit {
        return Err(WalletError::InvalidLimits);
    }
    let changed = conn.execute(
        "UPDATE wallet_limits SET daily_limit = ?1, monthly_limit = ?2, updated_at = ?3
         WHERE wallet_id = ?4",
        rusqlite::params![daily_limit, monthly_limit, clock::unix_now(), wallet_id],
    )?;
    if changed == 0 {
        return Err(WalletError::NotFound);
    }
    read(conn, wallet_id)
}

fn read(conn: &Connection, wallet_id: &str) -> Result<WalletLimits, WalletError> {
    conn.query_row(
        "SELECT wallet_id, daily_limit, daily_spent, daily_reset_at,
                monthly_limit, monthly_spent, monthly_reset_at
         FROM wallet_limits WHERE wallet_id = ?1",
        [wallet_id],
        |row| {
            Ok(WalletLimits {
                wallet_id: row.get(0)?,
                daily_limit: row.get(1)?,
                daily_spent: row.get(2)?,
                daily_reset_at: row.get(3)?,
                monthly_limit: row.get(4)?,
                monthly_spent: row.get(5)?,
                monthly_reset_at: row.get(6)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => WalletError::NotFound,
        other => other.into(),
    })
}
