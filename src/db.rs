use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tokio::sync::Mutex;

/// Every service owns one connection behind an async mutex. The mutex plus
/// explicit rusqlite transactions give money-movement paths the
/// serializable discipline they require.
pub type Db = Arc<Mutex<Connection>>;

pub fn open(path: &Path, schema: &str) -> Result<Db> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data dir {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("opening sqlite at {}", path.display()))?;

    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(schema).context("running schema migration")?;

    Ok(Arc::new(Mutex::new(conn)))
}

/// String-backed enum plumbing for SQLite columns: `as_str`/`parse`,
/// `Display`, and rusqlite `FromSql`/`ToSql`.
#[macro_export]
macro_rules! db_str_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                Self::parse(value.as_str()?)
                    .ok_or(rusqlite::types::FromSqlError::InvalidType)
            }
        }

        impl rusqlite::types::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(self.as_str().into())
            }
        }
    };
}

/// In-memory database with the same schema, for tests.
pub fn open_in_memory(schema: &str) -> Result<Db> {
    let conn = Connection::open_in_memory().context("opening in-memory sqlite")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(schema).context("running schema migration")?;
    Ok(Arc::new(Mutex::new(conn)))
}
