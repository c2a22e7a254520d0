use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const CREATE_LOGS: &str = "
CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    level TEXT NOT NULL,
    target TEXT NOT NULL,
    message TEXT NOT NULL,
    fields TEXT,
    session_id TEXT,
    owner_id TEXT
);
CREATE INDEX IF NOT EXISTS idx_logs_level ON logs(level);
CREATE INDEX IF NOT EXISTS idx_logs_session ON logs(session_id);
";

/// A warn+ log record persisted to SQLite.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: Option<String>,
    pub session_id: Option<String>,
    pub owner_id: Option<String>,
}

/// Filters for [`SqliteLogSink::query`]. Results are newest first.
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<String>,
    pub session_id: Option<String>,
    pub owner_id: Option<String>,
    pub limit: Option<u32>,
}

/// SQLite table of warn+ log events.
pub struct SqliteLogSink {
    conn: Mutex<Connection>,
}

impl SqliteLogSink {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch(CREATE_LOGS)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_LOGS)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert(&self, entry: &LogEntry) {
        let conn = self.conn.lock();
        // A failing log write must never take the caller down.
        let _ = conn.execute(
            "INSERT INTO logs (timestamp, level, target, message, fields, session_id, owner_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                entry.timestamp,
                entry.level,
                entry.target,
                entry.message,
                entry.fields,
                entry.session_id,
                entry.owner_id,
            ],
        );
    }

    pub fn query(&self, q: &LogQuery) -> Result<Vec<LogRecord>, rusqlite::Error> {
        let conn = self.conn.lock();
        let mut sql = String::from(
            "SELECT id, timestamp, level, target, message, fields, session_id, owner_id FROM logs WHERE 1=1",
        );
        let mut params: Vec<String> = Vec::new();

        for (column, value) in [
            ("level", &q.level),
            ("session_id", &q.session_id),
            ("owner_id", &q.owner_id),
        ] {
            if let Some(value) = value {
                params.push(value.clone());
                sql.push_str(&format!(" AND {column} = ?{}", params.len()));
            }
        }
        sql.push_str(&format!(" ORDER BY id DESC LIMIT {}", q.limit.unwrap_or(100)));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok(LogRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                level: row.get(2)?,
                target: row.get(3)?,
                message: row.get(4)?,
                fields: row.get(5)?,
                session_id: row.get(6)?,
                owner_id: row.get(7)?,
            })
        })?;
        rows.collect()
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
    }
}

struct LogEntry {
    timestamp: String,
    level: String,
    target: String,
    message: String,
    fields: Option<String>,
    session_id: Option<String>,
    owner_id: Option<String>,
}

/// `tracing` layer that copies WARN and ERROR events into a [`SqliteLogSink`].
/// `session_id` and `owner_id` are lifted from the event or any enclosing span.
pub struct SqliteLogLayer {
    sink: Arc<SqliteLogSink>,
}

impl SqliteLogLayer {
    pub fn new(sink: Arc<SqliteLogSink>) -> Self {
        Self { sink }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
    session_id: Option<String>,
    owner_id: Option<String>,
}

impl FieldVisitor {
    fn put(&mut self, name: &str, value: String) {
        match name {
            "message" => self.message = Some(value),
            "session_id" => self.session_id = Some(value),
            "owner_id" => self.owner_id = Some(value),
            other => {
                self.fields
                    .insert(other.to_string(), serde_json::Value::String(value));
            }
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let raw = format!("{value:?}");
        self.put(field.name(), raw.trim_matches('"').to_string());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field.name(), value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

/// Stored on spans so child events inherit their ids.
struct SpanIds {
    session_id: Option<String>,
    owner_id: Option<String>,
}

impl<S> Layer<S> for SqliteLogLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        if visitor.session_id.is_none() && visitor.owner_id.is_none() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanIds {
                session_id: visitor.session_id,
                owner_id: visitor.owner_id,
            });
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if visitor.session_id.is_some() && visitor.owner_id.is_some() {
                    break;
                }
                if let Some(ids) = span.extensions().get::<SpanIds>() {
                    if visitor.session_id.is_none() {
                        visitor.session_id.clone_from(&ids.session_id);
                    }
                    if visitor.owner_id.is_none() {
                        visitor.owner_id.clone_from(&ids.owner_id);
                    }
                }
            }
        }

        let fields = if visitor.fields.is_empty() {
            None
        } else {
            serde_json::to_string(&visitor.fields).ok()
        };

        self.sink.insert(&LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_string(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields,
            session_id: visitor.session_id,
            owner_id: visitor.owner_id,
        });
    }
}
