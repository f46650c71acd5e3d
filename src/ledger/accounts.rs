use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::clock;
use crate::db_str_enum;
use crate::money::Paise;

use super::LedgerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

db_str_enum!(AccountType {
    Asset => "asset",
    Liability => "liability",
    Equity => "equity",
    Revenue => "revenue",
    Expense => "expense",
});

impl AccountType {
    /// Debit-normal accounts grow on debit; the rest grow on credit.
    pub fn is_debit_normal(self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
    Closed,
}

db_str_enum!(AccountStatus {
    Active => "active",
    Inactive => "inactive",
    Closed => "closed",
});

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub currency: String,
    pub parent_account_id: Option<String>,
    pub balance: Paise,
    pub total_debits: Paise,
    pub total_credits: Paise,
    pub status: AccountStatus,
    pub metadata: Option<Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub code: String,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub parent_account_id: Option<String>,
    pub metadata: Option<Value>,
}

fn default_currency() -> String {
    crate::money::DEFAULT_CURRENCY.to_string()
}

/// Only name, status, and metadata are mutable after creation.
#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    pub name: Option<String>,
    pub status: Option<AccountStatus>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Default)]
pub struct AccountFilter {
    pub account_type: Option<AccountType>,
    pub status: Option<AccountStatus>,
    pub limit: u32,
    pub offset: u32,
}

const ACCOUNT_COLUMNS: &str = "id, code, name, type, currency, parent_account_id, \
     balance, total_debits, total_credits, status, metadata, created_at, updated_at";

pub fn create_account(
    conn: &Connection,
    req: &CreateAccountRequest,
) -> Result<Account, LedgerError> {
    if req.code.trim().is_empty() || req.name.trim().is_empty() {
        return Err(LedgerError::Invalid("code and name are required".into()));
    }

    let existing: Option<String> = conn
        .query_row("SELECT id FROM accounts WHERE code = ?1", [&req.code], |r| {
            r.get(0)
        })
        .ok();
    if existing.is_some() {
        return Err(LedgerError::DuplicateCode(req.code.clone()));
    }

    if let Some(parent) = &req.parent_account_id {
        get_account(conn, parent)?;
    }

    let id = Uuid::new_v4().to_string();
    let now = clock::unix_now();
    conn.execute(
        "INSERT INTO accounts (id, code, name, type, currency, parent_account_id,
             metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        rusqlite::params![
            id,
            req.code,
            req.name,
            req.account_type,
            req.currency,
            req.parent_account_id,
            req.metadata.as_ref().map(|m| m.to_string()),
            now,
        ],
    )?;

    get_account(conn, &id)
}

pub fn get_account(conn: &Connection, id: &str) -> Result<Account, LedgerError> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"),
        [id],
        row_to_account,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => LedgerError::AccountNotFound,
        other => other.into(),
    })
}

pub fn get_account_by_code(conn: &Connection, code: &str) -> Result<Account, LedgerError> {
    conn.query_row(
        &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE code = ?1"),
        [code],
        row_to_account,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => LedgerError::AccountNotFound,
        other => other.into(),
    })
}

pub fn list_accounts(
    conn: &Connection,
    filter: &AccountFilter,
) -> Result<Vec<Account>, LedgerError> {
    let mut sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE 1=1");
    let mut params: Vec<String> = Vec::new();

    if let Some(t) = filter.account_type {
        sql.push_str(" AND type = ?");
        params.push(t.as_str().to_string());
    }
    if let Some(s) = filter.status {
        sql.push_str(" AND status = ?");
        params.push(s.as_str().to_string());
    }

    let limit = if filter.limit == 0 { 50 } else { filter.limit.min(500) };
    sql.push_str(&format!(" ORDER BY code LIMIT {limit} OFFSET {}", filter.offset));

    let mut stmt = conn.prepare(&sql)?;
    let accounts = stmt
        .query_map(rusqlite::params_from_iter(params), row_to_account)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(accounts)
}

pub fn update_account(
    conn: &Connection,
    id: &str,
    req: &UpdateAccountRequest,
) -> Result<Account, LedgerError> {
    let current = get_account(conn, id)?;

    let name = req.name.clone().unwrap_or(current.name);
    let status = req.status.unwrap_or(current.status);
    let metadata = req
        .metadata
        .clone()
        .or(current.metadata)
        .map(|m| m.to_string());

    conn.execute(
        "UPDATE accounts SET name = ?1, status = ?2, metadata = ?3, updated_at = ?4
         WHERE id = ?5",
        rusqlite::params![name, status, metadata, clock::unix_now(), id],
    )?;

    get_account(conn, id)
}

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    let metadata: Option<String> = row.get(10)?;
    Ok(Account {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        account_type: row.get(3)?,
        currency: row.get(4)?,
        parent_account_id: row.get(5)?,
        balance: row.get(6)?,
        total_debits: row.get(7)?,
        total_credits: row.get(8)?,
        status: row.get(9)?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}
