use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::clock;
use crate::db_str_enum;

use super::NotificationError;
use super::template;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    Sms,
    Email,
    Push,
    InApp,
}

db_str_enum!(Channel {
    Sms => "sms",
    Email => "email",
    Push => "push",
    InApp => "in-app",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

db_str_enum!(Priority {
    Critical => "critical",
    High => "high",
    Normal => "normal",
    Low => "low",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Queued,
    Sent,
    Delivered,
    Failed,
}

db_str_enum!(NotificationStatus {
    Queued => "queued",
    Sent => "sent",
    Delivered => "delivered",
    Failed => "failed",
});

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: String,
    pub user_id: Option<String>,
    pub channel: Channel,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub priority: Priority,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub template_id: Option<String>,
    pub status: NotificationStatus,
    pub correlation_id: Option<String>,
    pub source_service: Option<String>,
    pub retry_count: u32,
    pub failure_reason: Option<String>,
    pub queued_at: i64,
    pub sent_at: Option<i64>,
    pub delivered_at: Option<i64>,
    pub failed_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub user_id: Option<String>,
    pub channel: Channel,
    #[serde(rename = "type")]
    pub notification_type: String,
    #[serde(default)]
    pub priority: Priority,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub template_id: Option<String>,
    #[serde(default)]
    pub variables: Map<String, Value>,
    pub correlation_id: Option<String>,
    pub source_service: Option<String>,
    pub metadata: Option<Value>,
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, channel, type, priority, recipient, subject, \
     body, template_id, status, correlation_id, source_service, retry_count, failure_reason, \
     queued_at, sent_at, delivered_at, failed_at";

/// Queue a notification. A repeated correlation id returns the original
/// row unchanged, so senders can retry blindly.
pub fn send(
    conn: &Connection,
    req: &SendNotificationRequest,
) -> Result<Notification, NotificationError> {
    if let Some(correlation_id) = &req.correlation_id
        && let Some(existing) = find_by_correlation(conn, correlation_id)?
    {
        return Ok(existing);
    }

    let (subject, body) = match &req.template_id {
        Some(template_id) => {
            let tpl = template::get_template(conn, template_id)?;
            (
                tpl.subject.map(|s| template::render(&s, &req.variables)),
                template::render(&tpl.body, &req.variables),
            )
        }
        None => {
            let body = req
                .body
                .clone()
                .ok_or(NotificationError::MissingBody)?;
            (req.subject.clone(), body)
        }
    };

    let id = Uuid::new_v4().to_string();
    let now = clock::unix_now();
    conn.execute(
        "INSERT INTO notifications (id, user_id, channel, type, priority, recipient,
             subject, body, template_id, correlation_id, source_service, metadata,
             queued_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13, ?13)",
        rusqlite::params![
            id,
            req.user_id,
            req.channel,
            req.notification_type,
            req.priority,
            req.recipient,
            subject,
            body,
            req.template_id,
            req.correlation_id,
            req.source_service,
            req.metadata.as_ref().map(|m| m.to_string()),
            now,
        ],
    )?;

    get(conn, &id)
}

pub fn get(conn: &Connection, id: &str) -> Result<Notification, NotificationError> {
    conn.query_row(
        &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
        [id],
        row_to_notification,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => NotificationError::NotFound,
        other => other.into(),
    })
}

#[derive(Debug, Default)]
pub struct NotificationFilter {
    pub status: Option<NotificationStatus>,
    pub channel: Option<Channel>,
    pub user_id: Option<String>,
    pub limit: u32,
}

pub fn list(
    conn: &Connection,
    filter: &NotificationFilter,
) -> Result<Vec<Notification>, NotificationError> {
    let mut sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE 1=1");
    let mut params: Vec<String> = Vec::new();

    if let Some(s) = filter.status {
        sql.push_str(" AND status = ?");
        params.push(s.as_str().to_string());
    }
    if let Some(c) = filter.channel {
        sql.push_str(" AND channel = ?");
        params.push(c.as_str().to_string());
    }
    if let Some(u) = &filter.user_id {
        sql.push_str(" AND user_id = ?");
        params.push(u.clone());
    }
    let limit = if filter.limit == 0 { 100 } else { filter.limit.min(1000) };
    sql.push_str(&format!(" ORDER BY queued_at DESC LIMIT {limit}"));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), row_to_notification)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub total: i64,
    pub by_status: Map<String, Value>,
    pub by_channel: Map<String, Value>,
}

pub fn stats(conn: &Connection) -> Result<Stats, NotificationError> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM notifications", [], |r| r.get(0))?;

    let mut by_status = Map::new();
    let mut stmt =
        conn.prepare("SELECT status, COUNT(*) FROM notifications GROUP BY status")?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
    for row in rows {
        let (status, count) = row?;
        by_status.insert(status, count.into());
    }

    let mut by_channel = Map::new();
    let mut stmt =
        conn.prepare("SELECT channel, COUNT(*) FROM notifications GROUP BY channel")?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
    for row in rows {
        let (channel, count) = row?;
        by_channel.insert(channel, count.into());
    }

    Ok(Stats {
        total,
        by_status,
        by_channel,
    })
}

/// Put a terminally delivered or failed notification back on the queue
/// for a fresh delivery attempt.
pub fn replay(conn: &Connection, id: &str) -> Result<Notification, NotificationError> {
    let notification = get(conn, id)?;
    match notification.status {
        NotificationStatus::Delivered | NotificationStatus::Failed => {}
        _ => return Err(NotificationError::NotReplayable),
    }

    conn.execute(
        "UPDATE notifications SET status = 'queued', retry_count = 0, failure_reason = NULL,
             queued_at = ?1, sent_at = NULL, delivered_at = NULL, failed_at = NULL,
             updated_at = ?1
         WHERE id = ?2",
        rusqlite::params![clock::unix_now(), id],
    )?;

    get(conn, id)
}

// ── Worker-side mutations ───────────────────────────────────────────

pub fn fetch_batch(conn: &Connection, n: u32) -> Result<Vec<Notification>, NotificationError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE status = 'queued'
         ORDER BY CASE priority
             WHEN 'critical' THEN 0 WHEN 'high' THEN 1 WHEN 'normal' THEN 2 ELSE 3 END,
             queued_at
         LIMIT {n}"
    ))?;
    let rows = stmt
        .query_map([], row_to_notification)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn mark_sent(conn: &Connection, id: &str) -> Result<(), NotificationError> {
    let now = clock::unix_now();
    conn.execute(
        "UPDATE notifications SET status = 'sent', sent_at = ?1, updated_at = ?1 WHERE id = ?2",
        rusqlite::params![now, id],
    )?;
    Ok(())
}

pub fn mark_delivered(conn: &Connection, id: &str) -> Result<(), NotificationError> {
    let now = clock::unix_now();
    conn.execute(
        "UPDATE notifications SET status = 'delivered', delivered_at = ?1, updated_at = ?1
         WHERE id = ?2",
        rusqlite::params![now, id],
    )?;
    Ok(())
}

pub fn mark_failed(conn: &Connection, id: &str, reason: &str) -> Result<(), NotificationError> {
    let now = clock::unix_now();
    conn.execute(
        "UPDATE notifications SET status = 'failed', failed_at = ?1, failure_reason = ?2,
             updated_at = ?1
         WHERE id = ?3",
        rusqlite::params![now, reason, id],
    )?;
    Ok(())
}

/// Requeue after a failed attempt, bumping the retry counter.
pub fn requeue(conn: &Connection, id: &str) -> Result<(), NotificationError> {
    let now = clock::unix_now();
    conn.execute(
        "UPDATE notifications SET status = 'queued', retry_count = retry_count + 1,
             queued_at = ?1, updated_at = ?1
         WHERE id = ?2",
        rusqlite::params![now, id],
    )?;
    Ok(())
}

fn find_by_correlation(
    conn: &Connection,
    correlation_id: &str,
) -> Result<Option<Notification>, NotificationError> {
    match conn.query_row(
        &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE correlation_id = ?1"),
        [correlation_id],
        row_to_notification,
    ) {
        Ok(n) => Ok(Some(n)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        channel: row.get(2)?,
        notification_type: row.get(3)?,
        priority: row.get(4)?,
        recipient: row.get(5)?,
        subject: row.get(6)?,
        body: row.get(7)?,
        template_id: row.get(8)?,
        status: row.get(9)?,
        correlation_id: row.get(10)?,
        source_service: row.get(11)?,
        retry_count: row.get(12)?,
        failure_reason: row.get(13)?,
        queued_at: row.get(14)?,
        sent_at: row.get(15)?,
        delivered_at: row.get(16)?,
        failed_at: row.get(17)?,
    })
}
