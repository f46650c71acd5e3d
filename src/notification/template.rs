use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::clock;

use super::NotificationError;

/// Replace `{{name}}` placeholders with the string form of each
/// variable. Unknown placeholders are left verbatim so a missing
/// variable never fails a send.
pub fn render(template: &str, vars: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let name = &after[..end];
                match vars.get(name.trim()) {
                    Some(value) => out.push_str(&format_var(value)),
                    None => {
                        out.push_str("{{");
                        out.push_str(name);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated opener; emit literally.
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn format_var(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                format!("{:.2}", n.as_f64().unwrap_or(0.0))
            }
        }
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

// ── Template store ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub channel: String,
    pub subject: Option<String>,
    pub body: String,
    pub version: i64,
    pub metadata: Option<Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub channel: String,
    pub subject: Option<String>,
    pub body: String,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTemplateRequest {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub metadata: Option<Value>,
}

const TEMPLATE_COLUMNS: &str =
    "id, name, channel, subject, body, version, metadata, created_at, updated_at";

pub fn create_template(
    conn: &Connection,
    req: &CreateTemplateRequest,
) -> Result<Template, NotificationError> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM notification_templates WHERE name = ?1",
            [&req.name],
            |r| r.get(0),
        )
        .ok();
    if existing.is_some() {
        return Err(NotificationError::DuplicateName(req.name.clone()));
    }

    let id = Uuid::new_v4().to_string();
    let now = clock::unix_now();
    conn.execute(
        "INSERT INTO notification_templates (id, name, channel, subject, body, metadata,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        rusqlite::params![
            id,
            req.name,
            req.channel,
            req.subject,
            req.body,
            req.metadata.as_ref().map(|m| m.to_string()),
            now
        ],
    )?;

    get_template(conn, &id)
}

pub fn get_template(conn: &Connection, id: &str) -> Result<Template, NotificationError> {
    conn.query_row(
        &format!("SELECT {TEMPLATE_COLUMNS} FROM notification_templates WHERE id = ?1"),
        [id],
        row_to_template,
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => NotificationError::TemplateNotFound,
        other => other.into(),
    })
}

pub fn list_templates(conn: &Connection) -> Result<Vec<Template>, NotificationError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM notification_templates ORDER BY name"
    ))?;
    let templates = stmt
        .query_map([], row_to_template)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(templates)
}

/// Content changes bump the version.
pub fn update_template(
    conn: &Connection,
    id: &str,
    req: &UpdateTemplateRequest,
) -> Result<Template, NotificationError> {
    let current = get_template(conn, id)?;

    conn.execute(
        "UPDATE notification_templates SET subject = ?1, body = ?2, metadata = ?3,
             version = version + 1, updated_at = ?4
         WHERE id = ?5",
        rusqlite::params![
            req.subject.clone().or(current.subject),
            req.body.clone().unwrap_or(current.body),
            req.metadata
                .clone()
                .or(current.metadata)
                .map(|m| m.to_string()),
            clock::unix_now(),
            id
        ],
    )?;

    get_template(conn, id)
}

pub fn delete_template(conn: &Connection, id: &str) -> Result<(), NotificationError> {
    let affected = conn.execute("DELETE FROM notification_templates WHERE id = ?1", [id])?;
    if affected == 0 {
        return Err(NotificationError::TemplateNotFound);
    }
    Ok(())
}

fn row_to_template(row: &rusqlite::Row<'_>) -> rusqlite::Result<Template> {
    let metadata: Option<String> = row.get(6)?;
    Ok(Template {
        id: row.get(0)?,
        name: row.get(1)?,
        channel: row.get(2)?,
        subject: row.get(3)?,
        body: row.get(4)?,
        version: row.get(5)?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn substitutes_strings_numbers_bools() {
        let v = vars(&[
            ("name", json!("Asha")),
            ("amount", json!(1250)),
            ("rate", json!(2.5)),
            ("flagged", json!(true)),
        ]);
        assert_eq!(
            render("Hi {{name}}: {{amount}} at {{rate}} ({{flagged}})", &v),
            "Hi Asha: 1250 at 2.50 (true)"
        );
    }

    #[test]
    fn missing_variable_is_left_verbatim() {
        let v = vars(&[("a", json!("x"))]);
        assert_eq!(render("{{a}} and {{missing}}", &v), "x and {{missing}}");
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        let v = vars(&[]);
        assert_eq!(render("broken {{tail", &v), "broken {{tail");
    }
}
