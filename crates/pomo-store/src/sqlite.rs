//! SQLite-based store implementation

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use pomo_api::{Phase, SessionRecord};
use pomo_util::{SessionId, TaskId, UserId};
use rusqlite::{Connection, Row, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::{SessionStore, StoreError, StoreResult};

const SELECT_COLUMNS: &str = "id, phase, start_time, end_time, duration_minutes, completed, \
     linked_task_id, created_at, updated_at";

/// SQLite-based store.
///
/// Clones share one connection. Queries run on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                phase TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                duration_minutes INTEGER NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0,
                linked_task_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_user_start
                ON sessions(user_id, start_time);
            CREATE INDEX IF NOT EXISTS idx_sessions_user_end
                ON sessions(user_id, end_time);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    fn upsert_sync(&self, user: &UserId, record: &SessionRecord) -> StoreResult<()> {
        let conn = self.conn()?;

        // Timestamps use a fixed-width format so text comparison orders them.
        let changed = conn.execute(
            r#"
            INSERT INTO sessions (
                id, user_id, phase, start_time, end_time, duration_minutes,
                completed, linked_task_id, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                phase = excluded.phase,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                duration_minutes = excluded.duration_minutes,
                completed = excluded.completed,
                linked_task_id = excluded.linked_task_id,
                updated_at = excluded.updated_at
            WHERE excluded.updated_at >= sessions.updated_at
              AND excluded.user_id = sessions.user_id
            "#,
            params![
                record.id.to_string(),
                user.as_str(),
                record.phase.as_str(),
                format_ts(record.start_time),
                record.end_time.map(format_ts),
                record.duration_minutes,
                record.completed,
                record.linked_task_id.as_ref().map(|t| t.as_str()),
                format_ts(record.created_at),
                format_ts(record.updated_at),
            ],
        )?;

        if changed == 0 {
            debug!(session_id = %record.id, "Stale upsert ignored");
        } else {
            debug!(
                session_id = %record.id,
                completed = record.completed,
                "Session upserted"
            );
        }
        Ok(())
    }

    fn delete_sync(&self, user: &UserId, id: &SessionId) -> StoreResult<()> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM sessions WHERE id = ? AND user_id = ?",
            params![id.to_string(), user.as_str()],
        )?;
        debug!(session_id = %id, removed, "Session deleted");
        Ok(())
    }

    /// Newest readable in-progress record. Rows that cannot be read back are
    /// deleted so they never block recovery of an older one.
    fn load_incomplete_sync(&self, user: &UserId) -> StoreResult<Option<SessionRecord>> {
        let conn = self.conn()?;

        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM sessions \
             WHERE user_id = ? AND completed = 0 AND end_time IS NULL \
             ORDER BY start_time DESC"
        );
        let candidates = {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([user.as_str()], |row| {
                let id: String = row.get(0)?;
                Ok((id, RawRow::from_row(row)))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        for (raw_id, raw) in candidates {
            match raw.map_err(StoreError::from).and_then(RawRow::into_record) {
                Ok(record) => return Ok(Some(record)),
                Err(e) => {
                    warn!(
                        session_id = %raw_id,
                        error = %e,
                        "Discarding unreadable in-progress session"
                    );
                    conn.execute(
                        "DELETE FROM sessions WHERE id = ? AND user_id = ?",
                        params![raw_id, user.as_str()],
                    )?;
                }
            }
        }

        Ok(None)
    }

    fn list_completed_sync(
        &self,
        user: &UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<SessionRecord>> {
        let conn = self.conn()?;

        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM sessions \
             WHERE user_id = ? AND completed = 1 AND end_time >= ? \
             ORDER BY end_time ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user.as_str(), format_ts(since)], RawRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }
}

/// Run a store query off the async runtime
async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {e}")))?
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn upsert(&self, user: &UserId, record: &SessionRecord) -> StoreResult<()> {
        let store = self.clone();
        let (user, record) = (user.clone(), record.clone());
        blocking(move || store.upsert_sync(&user, &record)).await
    }

    async fn delete(&self, user: &UserId, id: &SessionId) -> StoreResult<()> {
        let store = self.clone();
        let (user, id) = (user.clone(), id.clone());
        blocking(move || store.delete_sync(&user, &id)).await
    }

    async fn load_most_recent_incomplete(
        &self,
        user: &UserId,
    ) -> StoreResult<Option<SessionRecord>> {
        let store = self.clone();
        let user = user.clone();
        blocking(move || store.load_incomplete_sync(&user)).await
    }

    async fn list_completed_since(
        &self,
        user: &UserId,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<SessionRecord>> {
        let store = self.clone();
        let user = user.clone();
        blocking(move || store.list_completed_sync(&user, since)).await
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(column: &str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("{column} '{value}': {e}")))
}

/// Columns as stored, before validation
struct RawRow {
    id: String,
    phase: String,
    start_time: String,
    end_time: Option<String>,
    duration_minutes: u32,
    completed: bool,
    linked_task_id: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            phase: row.get(1)?,
            start_time: row.get(2)?,
            end_time: row.get(3)?,
            duration_minutes: row.get(4)?,
            completed: row.get(5)?,
            linked_task_id: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_record(self) -> StoreResult<SessionRecord> {
        let id = SessionId::parse(&self.id)
            .ok_or_else(|| StoreError::Serialization(format!("session id '{}'", self.id)))?;
        let phase: Phase = self
            .phase
            .parse()
            .map_err(|e| StoreError::Serialization(format!("{e}")))?;
        let end_time = self
            .end_time
            .as_deref()
            .map(|s| parse_ts("end_time", s))
            .transpose()?;

        Ok(SessionRecord {
            id,
            phase,
            start_time: parse_ts("start_time", &self.start_time)?,
            end_time,
            duration_minutes: self.duration_minutes,
            completed: self.completed,
            linked_task_id: self.linked_task_id.map(TaskId::new),
            created_at: parse_ts("created_at", &self.created_at)?,
            updated_at: parse_ts("updated_at", &self.updated_at)?,
        })
    }
}
