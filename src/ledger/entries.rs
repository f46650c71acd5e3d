use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::clock;
use crate::db_str_enum;
use crate::money::Paise;

use super::LedgerError;
use super::accounts::{self, AccountStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    #[default]
    Standard,
    Opening,
    Closing,
    Adjusting,
    Reversing,
}

db_str_enum!(EntryType {
    Standard => "standard",
    Opening => "opening",
    Closing => "closing",
    Adjusting => "adjusting",
    Reversing => "reversing",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Draft,
    Posted,
    Voided,
    Reversed,
}

db_str_enum!(EntryStatus {
    Draft => "draft",
    Posted => "posted",
    Voided => "voided",
    Reversed => "reversed",
});

/// One side of a balanced movement. Exactly one of debit/credit is
/// positive; both are non-negative paise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerLine {
    pub account_id: String,
    #[serde(default)]
    pub debit: Paise,
    #[serde(default)]
    pub credit: Paise,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub id: String,
    pub entry_number: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub status: EntryStatus,
    pub description: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub posted_at: Option<i64>,
    pub posted_by: Option<String>,
    pub voided_at: Option<i64>,
    pub voided_by: Option<String>,
    pub void_reason: Option<String>,
    pub reversal_entry_id: Option<String>,
    pub metadata: Option<Value>,
    pub lines: Vec<LedgerLine>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateEntryRequest {
    #[serde(rename = "type", default)]
    pub entry_type: EntryType,
    pub description: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub metadata: Option<Value>,
    pub lines: Vec<LedgerLine>,
}

#[derive(Debug, Default)]
pub struct EntryFilter {
    pub status: Option<EntryStatus>,
    pub reference_id: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

const ENTRY_COLUMNS: &str = "id, entry_number, type, status, description, reference_type, \
     reference_id, posted_at, posted_by, voided_at, voided_by, void_reason, \
     reversal_entry_id, metadata, created_at, updated_at";

const MIN_REASON: usize = 10;
const MAX_REASON: usize = 500;

/// Persist a draft entry. Lines are validated for shape and account
/// existence; balances are untouched until `post_entry`.
pub fn create_entry(
    conn: &mut Connection,
    req: &CreateEntryRequest,
) -> Result<JournalEntry, LedgerError> {
    validate_lines(&req.lines)?;

    let tx = conn.transaction()?;
    for line in &req.lines {
        accounts::get_account(&tx, &line.account_id)?;
    }

    let now = clock::unix_now();
    let id = Uuid::new_v4().to_string();
    let entry_number = next_entry_number(&tx, clock::year_of(now))?;

    tx.execute(
        "INSERT INTO journal_entries (id, entry_number, type, status, description,
             reference_type, reference_id, metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'draft', ?4, ?5, ?6, ?7, ?8, ?8)",
        rusqlite::params![
            id,
            entry_number,
            req.entry_type,
            req.description,
            req.reference_type,
            req.reference_id,
            req.metadata.as_ref().map(|m| m.to_string()),
            now,
        ],
    )?;

    insert_lines(&tx, &id, &req.lines)?;
    tx.commit()?;

    get_entry(conn, &id)
}

/// draft -> posted. Applies every line to its account atomically; lines
/// against the same account coalesce into a single update, applied in
/// ascending account-id order.
pub fn post_entry(
    conn: &mut Connection,
    id: &str,
    posted_by: &str,
) -> Result<JournalEntry, LedgerError> {
    let tx = conn.transaction()?;
    let entry = get_entry_in(&tx, id)?;

    if entry.status != EntryStatus::Draft {
        return Err(LedgerError::WrongStatus {
            expected: "draft",
            actual: entry.status.to_string(),
        });
    }
    validate_lines(&entry.lines)?;
    require_balanced(&entry.lines)?;

    apply_lines(&tx, &entry.lines, 1)?;

    tx.execute(
        "UPDATE journal_entries SET status = 'posted', posted_at = ?1, posted_by = ?2,
             updated_at = ?1 WHERE id = ?3",
        rusqlite::params![clock::unix_now(), posted_by, id],
    )?;
    tx.commit()?;

    get_entry(conn, id)
}

/// posted -> voided. Balance effects are undone.
pub fn void_entry(
    conn: &mut Connection,
    id: &str,
    voided_by: &str,
    reason: &str,
) -> Result<JournalEntry, LedgerError> {
    if reason.len() < MIN_REASON || reason.len() > MAX_REASON {
        return Err(LedgerError::BadReason);
    }

    let tx = conn.transaction()?;
    let entry = get_entry_in(&tx, id)?;

    if entry.status != EntryStatus::Posted {
        return Err(LedgerError::WrongStatus {
            expected: "posted",
            actual: entry.status.to_string(),
        });
    }

    apply_lines(&tx, &entry.lines, -1)?;

    tx.execute(
        "UPDATE journal_entries SET status = 'voided', voided_at = ?1, voided_by = ?2,
             void_reason = ?3, updated_at = ?1 WHERE id = ?4",
        rusqlite::params![clock::unix_now(), voided_by, reason, id],
    )?;
    tx.commit()?;

    get_entry(conn, id)
}

/// Supersede a posted entry with a new reversing entry whose lines swap
/// debit and credit. The reversal is created and posted in one atomic
/// operation; the original moves to `reversed`.
pub fn reverse_entry(
    conn: &mut Connection,
    id: &str,
    reversed_by: &str,
    reason: Option<&str>,
) -> Result<JournalEntry, LedgerError> {
    let tx = conn.transaction()?;
    let original = get_entry_in(&tx, id)?;

    if original.status != EntryStatus::Posted {
        return Err(LedgerError::WrongStatus {
            expected: "posted",
            actual: original.status.to_string(),
        });
    }

    let swapped: Vec<LedgerLine> = original
        .lines
        .iter()
        .map(|l| LedgerLine {
            account_id: l.account_id.clone(),
            debit: l.credit,
            credit: l.debit,
            description: l.description.clone(),
        })
        .collect();

    let now = clock::unix_now();
    let reversal_id = Uuid::new_v4().to_string();
    let entry_number = next_entry_number(&tx, clock::year_of(now))?;
    let description = match reason {
        Some(r) => format!("Reversal of {}: {r}", original.entry_number),
        None => format!("Reversal of {}", original.entry_number),
    };
    let metadata = serde_json::json!({ "reversal_of": original.id });

    tx.execute(
        "INSERT INTO journal_entries (id, entry_number, type, status, description,
             reference_type, reference_id, metadata, posted_at, posted_by,
             created_at, updated_at)
         VALUES (?1, ?2, 'reversing', 'posted', ?3, ?4, ?5, ?6, ?7, ?8, ?7, ?7)",
        rusqlite::params![
            reversal_id,
            entry_number,
            description,
            original.reference_type,
            original.reference_id,
            metadata.to_string(),
            now,
            reversed_by,
        ],
    )?;
    insert_lines(&tx, &reversal_id, &swapped)?;
    apply_lines(&tx, &swapped, 1)?;

    tx.execute(
        "UPDATE journal_entries SET status = 'reversed', reversal_entry_id = ?1,
             updated_at = ?2 WHERE id = ?3",
        rusqlite::params![reversal_id, now, id],
    )?;
    tx.commit()?;

    get_entry(conn, &reversal_id)
}

pub fn get_entry(conn: &Connection, id: &str) -> Result<JournalEntry, LedgerError> {
    get_entry_in(conn, id)
}

pub fn list_entries(
    conn: &Connection,
    filter: &EntryFilter,
) -> Result<Vec<JournalEntry>, LedgerError> {
    let mut sql = format!("SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE 1=1");
    let mut params: Vec<String> = Vec::new();

    if let Some(s) = filter.status {
        sql.push_str(" AND status = ?");
        params.push(s.as_str().to_string());
    }
    if let Some(r) = &filter.reference_id {
        sql.push_str(" AND reference_id = ?");
        params.push(r.clone());
    }

    let limit = if filter.limit == 0 { 50 } else { filter.limit.min(500) };
    sql.push_str(&format!(
        " ORDER BY created_at DESC LIMIT {limit} OFFSET {}",
        filter.offset
    ));

    let mut stmt = conn.prepare(&sql)?;
    let headers = stmt
        .query_map(rusqlite::params_from_iter(params), row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;

    headers
        .into_iter()
        .map(|mut e| {
            e.lines = load_lines(conn, &e.id)?;
            Ok(e)
        })
        .collect()
}

// ── Internals ───────────────────────────────────────────────────────

fn validate_lines(lines: &[LedgerLine]) -> Result<(), LedgerError> {
    if lines.len() < 2 {
        return Err(LedgerError::TooFewLines);
    }
    for (i, line) in lines.iter().enumerate() {
        let debit_set = line.debit > 0;
        let credit_set = line.credit > 0;
        if line.debit < 0 || line.credit < 0 || debit_set == credit_set {
            return Err(LedgerError::OneSidedLine(i));
        }
    }
    Ok(())
}

fn require_balanced(lines: &[LedgerLine]) -> Result<(), LedgerError> {
    let debits: Paise = lines.iter().map(|l| l.debit).sum();
    let credits: Paise = lines.iter().map(|l| l.credit).sum();
    if debits != credits {
        return Err(LedgerError::Unbalanced { debits, credits });
    }
    Ok(())
}

/// Apply (direction = 1) or undo (direction = -1) the balance effect of
/// a set of lines. Per-account deltas are coalesced so one entry touches
/// each account row exactly once, in ascending id order.
fn apply_lines(
    conn: &Connection,
    lines: &[LedgerLine],
    direction: i64,
) -> Result<(), LedgerError> {
    let mut per_account: BTreeMap<&str, (Paise, Paise)> = BTreeMap::new();
    for line in lines {
        let slot = per_account.entry(line.account_id.as_str()).or_default();
        slot.0 += line.debit;
        slot.1 += line.credit;
    }

    for (account_id, (debit, credit)) in per_account {
        let account = accounts::get_account(conn, account_id)?;
        if direction > 0 && account.status != AccountStatus::Active {
            return Err(LedgerError::AccountNotActive(account.code));
        }

        let signed = if account.account_type.is_debit_normal() {
            debit - credit
        } else {
            credit - debit
        };

        conn.execute(
            "UPDATE accounts SET total_debits = total_debits + ?1,
                 total_credits = total_credits + ?2,
                 balance = balance + ?3,
                 updated_at = ?4
             WHERE id = ?5",
            rusqlite::params![
                direction * debit,
                direction * credit,
                direction * signed,
                clock::unix_now(),
                account_id
            ],
        )?;
    }
    Ok(())
}

fn insert_lines(conn: &Connection, entry_id: &str, lines: &[LedgerLine]) -> Result<(), LedgerError> {
    for (i, line) in lines.iter().enumerate() {
        conn.execute(
            "INSERT INTO ledger_lines (id, entry_id, line_no, account_id, debit, credit, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                entry_id,
                i as i64,
                line.account_id,
                line.debit,
                line.credit,
                line.description,
            ],
        )?;
    }
    Ok(())
}

/// Year-scoped monotonic entry numbers, `JE-YYYY-NNNNN`.
fn next_entry_number(conn: &Connection, year: i32) -> Result<String, LedgerError> {
    let next: i64 = conn.query_row(
        "INSERT INTO entry_counters (year, next) VALUES (?1, 1)
         ON CONFLICT(year) DO UPDATE SET next = next + 1
         RETURNING next",
        [year],
        |r| r.get(0),
    )?;
    Ok(format!("JE-{year}-{next:05}"))
}

fn get_entry_in(conn: &Connection, id: &str) -> Result<JournalEntry, LedgerError> {
    let mut entry = conn
        .query_row(
            &format!("SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE id = ?1"),
            [id],
            row_to_entry,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => LedgerError::EntryNotFound,
            other => other.into(),
        })?;
    entry.lines = load_lines(conn, id)?;
    Ok(entry)
}

fn load_lines(conn: &Connection, entry_id: &str) -> Result<Vec<LedgerLine>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT account_id, debit, credit, description FROM ledger_lines
         WHERE entry_id = ?1 ORDER BY line_no",
    )?;
    let lines = stmt
        .query_map([entry_id], |row| {
            Ok(LedgerLine {
                account_id: row.get(0)?,
                debit: row.get(1)?,
                credit: row.get(2)?,
                description: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<JournalEntry> {
    let metadata: Option<String> = row.get(13)?;
    Ok(JournalEntry {
        id: row.get(0)?,
        entry_number: row.get(1)?,
        entry_type: row.get(2)?,
        status: row.get(3)?,
        description: row.get(4)?,
        reference_type: row.get(5)?,
        reference_id: row.get(6)?,
        posted_at: row.get(7)?,
        posted_by: row.get(8)?,
        voided_at: row.get(9)?,
        voided_by: row.get(10)?,
        void_reason: row.get(11)?,
        reversal_entry_id: row.get(12)?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        lines: Vec::new(),
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}
