use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::clock;
use crate::db_str_enum;
use crate::money::Paise;

use super::TxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Transfer,
    Deposit,
    Withdrawal,
    Reversal,
    Fee,
    Refund,
}

db_str_enum!(TransactionType {
    Transfer => "transfer",
    Deposit => "deposit",
    Withdrawal => "withdrawal",
    Reversal => "reversal",
    Fee => "fee",
    Refund => "refund",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Reversed,
    Cancelled,
}

db_str_enum!(TransactionStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
    Reversed => "reversed",
    Cancelled => "cancelled",
});

impl TransactionStatus {
    /// The lifecycle DAG. Cancellation only from pending; failure from
    /// pending or processing; reversal only from completed.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Reversed)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub user_id: String,
    pub source_wallet_id: Option<String>,
    pub destination_wallet_id: Option<String>,
    pub amount: Paise,
    pub currency: String,
    pub description: Option<String>,
    pub external_ref: Option<String>,
    pub parent_transaction_id: Option<String>,
    pub ledger_entry_id: Option<String>,
    pub failure_reason: Option<String>,
    pub metadata: Value,
    pub created_at: i64,
    pub processed_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub updated_at: i64,
}

pub struct NewTransaction<'a> {
    pub transaction_type: TransactionType,
    pub user_id: &'a str,
    pub source_wallet_id: Option<&'a str>,
    pub destination_wallet_id: Option<&'a str>,
    pub amount: Paise,
    pub currency: &'a str,
    pub description: Option<&'a str>,
    pub external_ref: Option<&'a str>,
    pub parent_transaction_id: Option<&'a str>,
}

const TX_COLUMNS: &str = "id, type, status, user_id, source_wallet_id, destination_wallet_id, \
     amount, currency, description, external_ref, parent_transaction_id, ledger_entry_id, \
     failure_reason, metadata, created_at, processed_at, completed_at, updated_at";

pub fn create(conn: &Connection, new: &NewTransaction<'_>) -> Result<Transaction, TxError> {
    if new.amount <= 0 {
        return Err(TxError::Invalid("amount must be positive".into()));
    }

    if let Some(external_ref) = new.external_ref {
        let duplicate: Option<String> = conn
            .query_row(
                "SELECT id FROM transactions WHERE user_id = ?1 AND external_ref = ?2",
                rusqlite::params![new.user_id, external_ref],
                |r| r.get(0),
            )
            .ok();
        if duplicate.is_some() {
            return Err(TxError::DuplicateReference);
        }
    }

    let id = Uuid::new_v4().to_string();
    let now = clock::unix_now();
    conn.execute(
        "INSERT INTO transactions (id, type, user_id, source_wallet_id,
             destination_wallet_id, amount, currency, description, external_ref,
             parent_transaction_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        rusqlite::params![
            id,
            new.transaction_type,
            new.user_id,
            new.source_wallet_id,
            new.destination_wallet_id,
            new.amount,
            new.currency,
            new.description,
            new.external_ref,
            new.parent_transaction_id,
            now,
        ],
    )?;

    get(conn, &id)
}

pub fn get(conn: &Connection, id: &str) -> Result<Transaction, TxError> {
    conn.query_row(
        &format!("SELECT {TX_COLUMNS} FROM transactions WHERE id = ?1"),
        [id],
        row_to_transaction,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => TxError::NotFound,
        other => other.into(),
    })
}

#[derive(Debug, Default)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
    pub transaction_type: Option<TransactionType>,
    pub limit: u32,
    pub offset: u32,
}

pub fn list_for_user(
    conn: &Connection,
    user_id: &str,
    filter: &TransactionFilter,
) -> Result<Vec<Transaction>, TxError> {
    let mut sql = format!("SELECT {TX_COLUMNS} FROM transactions WHERE user_id = ?");
    let mut params: Vec<String> = vec![user_id.to_string()];

    if let Some(s) = filter.status {
        sql.push_str(" AND status = ?");
        params.push(s.as_str().to_string());
    }
    if let Some(t) = filter.transaction_type {
        sql.push_str(" AND type = ?");
        params.push(t.as_str().to_string());
    }
    let limit = if filter.limit == 0 { 50 } else { filter.limit.min(500) };
    sql.push_str(&format!(
        " ORDER BY created_at DESC LIMIT {limit} OFFSET {}",
        filter.offset
    ));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), row_to_transaction)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Enforced DAG transition. Stamps processed/completed timestamps as the
/// lifecycle advances.
pub fn transition(
    conn: &Connection,
    id: &str,
    next: TransactionStatus,
) -> Result<Transaction, TxError> {
    let current = get(conn, id)?;
    if !current.status.can_transition_to(next) {
        return Err(TxError::InvalidTransition {
            from: current.status.to_string(),
            to: next.to_string(),
        });
    }

    let now = clock::unix_now();
    match next {
        TransactionStatus::Processing => conn.execute(
            "UPDATE transactions SET status = ?1, processed_at = ?2, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![next, now, id],
        )?,
        TransactionStatus::Completed => conn.execute(
            "UPDATE transactions SET status = ?1, completed_at = ?2, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![next, now, id],
        )?,
        _ => conn.execute(
            "UPDATE transactions SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![next, now, id],
        )?,
    };

    get(conn, id)
}

pub fn set_failure(conn: &Connection, id: &str, reason: &str) -> Result<Transaction, TxError> {
    transition(conn, id, TransactionStatus::Failed)?;
    conn.execute(
        "UPDATE transactions SET failure_reason = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![reason, clock::unix_now(), id],
    )?;
    get(conn, id)
}

pub fn set_ledger_entry(conn: &Connection, id: &str, entry_id: &str) -> Result<(), TxError> {
    conn.execute(
        "UPDATE transactions SET ledger_entry_id = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![entry_id, clock::unix_now(), id],
    )?;
    Ok(())
}

/// Shallow-merge keys into the metadata object.
pub fn merge_metadata(conn: &Connection, id: &str, patch: &Value) -> Result<(), TxError> {
    let current = get(conn, id)?;
    let mut merged = match current.metadata {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    if let Value::Object(patch_map) = patch {
        for (k, v) in patch_map {
            merged.insert(k.clone(), v.clone());
        }
    }
    conn.execute(
        "UPDATE transactions SET metadata = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![Value::Object(merged).to_string(), clock::unix_now(), id],
    )?;
    Ok(())
}

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    let metadata: String = row.get(13)?;
    Ok(Transaction {
        id: row.get(0)?,
        transaction_type: row.get(1)?,
        status: row.get(2)?,
        user_id: row.get(3)?,
        source_wallet_id: row.get(4)?,
        destination_wallet_id: row.get(5)?,
        amount: row.get(6)?,
        currency: row.get(7)?,
        description: row.get(8)?,
        external_ref: row.get(9)?,
        parent_transaction_id: row.get(10)?,
        ledger_entry_id: row.get(11)?,
        failure_reason: row.get(12)?,
        metadata: serde_json::from_str(&metadata).unwrap_or(Value::Null),
        created_at: row.get(14)?,
        processed_at: row.get(15)?,
        completed_at: row.get(16)?,
        updated_at: row.get(17)?,
    })
}
