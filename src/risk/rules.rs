use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::clock;
use crate::db_str_enum;
use crate::money::Paise;

use super::RiskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Velocity,
    DailyLimit,
    Threshold,
}

db_str_enum!(RuleType {
    Velocity => "velocity",
    DailyLimit => "daily_limit",
    Threshold => "threshold",
});

/// Declared in ascending severity so `Ord` ranks block above flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskAction {
    Allow,
    Flag,
    Block,
}

db_str_enum!(RiskAction {
    Allow => "allow",
    Flag => "flag",
    Block => "block",
});

pub const MAX_SCORE: i64 = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct VelocityParams {
    pub window_minutes: i64,
    pub max_transactions: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyLimitParams {
    pub max_amount: Paise,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdParams {
    pub max_amount: Paise,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    crate::money::DEFAULT_CURRENCY.to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskRule {
    pub id: String,
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub name: String,
    pub parameters: Value,
    pub action: RiskAction,
    pub enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    pub name: String,
    pub parameters: Value,
    pub action: RiskAction,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct UpdateRuleRequest {
    pub parameters: Option<Value>,
    pub action: Option<RiskAction>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub transaction_id: String,
    pub user_id: String,
    pub amount: Paise,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub transaction_type: Option<String>,
    pub source_wallet_id: Option<String>,
    pub destination_wallet_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskVerdict {
    pub action: RiskAction,
    pub score: i64,
    pub reason: Option<String>,
    pub event_id: String,
    pub triggered_rules: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskEvent {
    pub id: String,
    pub transaction_id: String,
    pub user_id: String,
    pub rule_id: Option<String>,
    pub rule_type: Option<RuleType>,
    pub score: i64,
    pub action: RiskAction,
    pub reason: Option<String>,
    pub amount: Paise,
    pub currency: String,
    pub created_at: i64,
}

struct RuleHit {
    rule_id: String,
    rule_type: RuleType,
    action: RiskAction,
    score: i64,
    reason: String,
}

/// Evaluate every enabled rule against one proposed movement and write
/// the audit event. The event is written even when nothing fires, so
/// the table is a complete per-transaction trail and doubles as the
/// counter source for velocity and daily-limit rules.
pub fn evaluate(conn: &mut Connection, req: &EvaluateRequest) -> Result<RiskVerdict, RiskError> {
    let tx = conn.transaction()?;
    let now = clock::unix_now();

    let enabled = load_enabled(&tx)?;
    let mut hits: Vec<RuleHit> = Vec::new();
    for rule in &enabled {
        if let Some(hit) = evaluate_rule(&tx, rule, req, now)? {
            hits.push(hit);
        }
    }

    // Most severe hit: block beats flag, ties break on score.
    hits.sort_by(|a, b| (b.action, b.score).cmp(&(a.action, a.score)));
    let worst = hits.first();

    let action = worst.map(|h| h.action).unwrap_or(RiskAction::Allow);
    let score = hits.iter().map(|h| h.score).max().unwrap_or(0);
    let reason = worst.map(|h| h.reason.clone());
    let triggered_rules: Vec<String> = hits.iter().map(|h| h.rule_id.clone()).collect();

    let event_id = Uuid::new_v4().to_string();
    let metadata = serde_json::json!({
        "amount": req.amount,
        "currency": req.currency,
        "source_wallet_id": req.source_wallet_id,
        "destination_wallet_id": req.destination_wallet_id,
        "transaction_type": req.transaction_type,
    });
    tx.execute(
        "INSERT INTO risk_events (id, transaction_id, user_id, rule_id, rule_type,
             score, action, reason, amount, currency, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            event_id,
            req.transaction_id,
            req.user_id,
            worst.map(|h| h.rule_id.clone()),
            worst.map(|h| h.rule_type),
            score,
            action,
            reason,
            req.amount,
            req.currency,
            metadata.to_string(),
            now,
        ],
    )?;
    tx.commit()?;

    Ok(RiskVerdict {
        action,
        score,
        reason,
        event_id,
        triggered_rules,
    })
}

fn evaluate_rule(
    conn: &Connection,
    rule: &RiskRule,
    req: &EvaluateRequest,
    now: i64,
) -> Result<Option<RuleHit>, RiskError> {
    let hit = match rule.rule_type {
        RuleType::Velocity => {
            let params: VelocityParams = parse_params(&rule.parameters)?;
            let since = now - params.window_minutes * 60;
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM risk_events WHERE user_id = ?1 AND created_at >= ?2",
                rusqlite::params![req.user_id, since],
                |r| r.get(0),
            )?;
            if count >= params.max_transactions {
                let excess = count - params.max_transactions;
                Some((
                    (70 + 5 * excess).min(MAX_SCORE),
                    format!(
                        "{count} transactions in the last {} minutes (max {})",
                        params.window_minutes, params.max_transactions
                    ),
                ))
            } else {
                None
            }
        }
        RuleType::DailyLimit => {
            let params: DailyLimitParams = parse_params(&rule.parameters)?;
            if params.currency != req.currency {
                None
            } else {
                let today: Paise = conn.query_row(
                    "SELECT COALESCE(SUM(amount), 0) FROM risk_events
                     WHERE user_id = ?1 AND action = 'allow' AND currency = ?2
                       AND created_at >= ?3",
                    rusqlite::params![req.user_id, req.currency, clock::day_start(now)],
                    |r| r.get(0),
                )?;
                let total = today + req.amount;
                if total > params.max_amount {
                    let percent_over = (total - params.max_amount) * 100 / params.max_amount.max(1);
                    Some((
                        (80 + percent_over / 10).min(MAX_SCORE),
                        format!(
                            "daily volume {total} exceeds limit {}",
                            params.max_amount
                        ),
                    ))
                } else {
                    None
                }
            }
        }
        RuleType::Threshold => {
            let params: ThresholdParams = parse_params(&rule.parameters)?;
            if params.currency != req.currency || req.amount <= params.max_amount {
                None
            } else {
                let percent_over =
                    (req.amount - params.max_amount) * 100 / params.max_amount.max(1);
                Some((
                    (60 + percent_over / 20).min(MAX_SCORE),
                    format!("amount {} exceeds threshold {}", req.amount, params.max_amount),
                ))
            }
        }
    };

    Ok(hit.map(|(score, reason)| RuleHit {
        rule_id: rule.id.clone(),
        rule_type: rule.rule_type,
        action: rule.action,
        score,
        reason,
    }))
}

fn parse_params<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T, RiskError> {
    serde_json::from_value(value.clone()).map_err(|e| RiskError::BadParameters(e.to_string()))
}

// ── Rule store ──────────────────────────────────────────────────────

const RULE_COLUMNS: &str = "id, type, name, parameters, action, enabled, created_at, updated_at";

pub fn create_rule(conn: &Connection, req: &CreateRuleRequest) -> Result<RiskRule, RiskError> {
    // Fail early on malformed parameters instead of at evaluate time.
    match req.rule_type {
        RuleType::Velocity => {
            parse_params::<VelocityParams>(&req.parameters)?;
        }
        RuleType::DailyLimit => {
            parse_params::<DailyLimitParams>(&req.parameters)?;
        }
        RuleType::Threshold => {
            parse_params::<ThresholdParams>(&req.parameters)?;
        }
    }

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM risk_rules WHERE name = ?1",
            [&req.name],
            |r| r.get(0),
        )
        .ok();
    if existing.is_some() {
        return Err(RiskError::DuplicateName(req.name.clone()));
    }

    let id = Uuid::new_v4().to_string();
    let now = clock::unix_now();
    conn.execute(
        "INSERT INTO risk_rules (id, type, name, parameters, action, enabled, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        rusqlite::params![
            id,
            req.rule_type,
            req.name,
            req.parameters.to_string(),
            req.action,
            req.enabled,
            now
        ],
    )?;

    get_rule(conn, &id)
}

pub fn get_rule(conn: &Connection, id: &str) -> Result<RiskRule, RiskError> {
    conn.query_row(
        &format!("SELECT {RULE_COLUMNS} FROM risk_rules WHERE id = ?1"),
        [id],
        row_to_rule,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => RiskError::RuleNotFound,
        other => other.into(),
    })
}

pub fn list_rules(conn: &Connection) -> Result<Vec<RiskRule>, RiskError> {
    let mut stmt =
        conn.prepare(&format!("SELECT {RULE_COLUMNS} FROM risk_rules ORDER BY name"))?;
    let rules = stmt
        .query_map([], row_to_rule)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rules)
}

pub fn update_rule(
    conn: &Connection,
    id: &str,
    req: &UpdateRuleRequest,
) -> Result<RiskRule, RiskError> {
    let current = get_rule(conn, id)?;

    let parameters = req.parameters.clone().unwrap_or(current.parameters);
    match current.rule_type {
        RuleType::Velocity => {
            parse_params::<VelocityParams>(&parameters)?;
        }
        RuleType::DailyLimit => {
            parse_params::<DailyLimitParams>(&parameters)?;
        }
        RuleType::Threshold => {
            parse_params::<ThresholdParams>(&parameters)?;
        }
    }

    conn.execute(
        "UPDATE risk_rules SET parameters = ?1, action = ?2, enabled = ?3, updated_at = ?4
         WHERE id = ?5",
        rusqlite::params![
            parameters.to_string(),
            req.action.unwrap_or(current.action),
            req.enabled.unwrap_or(current.enabled),
            clock::unix_now(),
            id
        ],
    )?;

    get_rule(conn, id)
}

pub fn delete_rule(conn: &Connection, id: &str) -> Result<(), RiskError> {
    let affected = conn.execute("DELETE FROM risk_rules WHERE id = ?1", [id])?;
    if affected == 0 {
        return Err(RiskError::RuleNotFound);
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct EventFilter {
    pub transaction_id: Option<String>,
    pub user_id: Option<String>,
    pub limit: u32,
}

pub fn list_events(conn: &Connection, filter: &EventFilter) -> Result<Vec<RiskEvent>, RiskError> {
    let mut sql = String::from(
        "SELECT id, transaction_id, user_id, rule_id, rule_type, score, action, reason,
                amount, currency, created_at
         FROM risk_events WHERE 1=1",
    );
    let mut params: Vec<String> = Vec::new();
    if let Some(t) = &filter.transaction_id {
        sql.push_str(" AND transaction_id = ?");
        params.push(t.clone());
    }
    if let Some(u) = &filter.user_id {
        sql.push_str(" AND user_id = ?");
        params.push(u.clone());
    }
    let limit = if filter.limit == 0 { 100 } else { filter.limit.min(1000) };
    sql.push_str(&format!(" ORDER BY created_at DESC LIMIT {limit}"));

    let mut stmt = conn.prepare(&sql)?;
    let events = stmt
        .query_map(rusqlite::params_from_iter(params), |row| {
            Ok(RiskEvent {
                id: row.get(0)?,
                transaction_id: row.get(1)?,
                user_id: row.get(2)?,
                rule_id: row.get(3)?,
                rule_type: row.get(4)?,
                score: row.get(5)?,
                action: row.get(6)?,
                reason: row.get(7)?,
                amount: row.get(8)?,
                currency: row.get(9)?,
                created_at: row.get(10)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(events)
}

fn load_enabled(conn: &Connection) -> Result<Vec<RiskRule>, RiskError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {RULE_COLUMNS} FROM risk_rules WHERE enabled = 1"
    ))?;
    let rules = stmt
        .query_map([], row_to_rule)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rules)
}

fn row_to_rule(row: &rusqlite::Row<'_>) -> rusqlite::Result<RiskRule> {
    let parameters: String = row.get(3)?;
    Ok(RiskRule {
        id: row.get(0)?,
        rule_type: row.get(1)?,
        name: row.get(2)?,
        parameters: serde_json::from_str(&parameters).unwrap_or(Value::Null),
        action: row.get(4)?,
        enabled: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
