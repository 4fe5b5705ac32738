use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use rusqlite::types::Type;
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use playbook_core::{PlaybookError, Result};

/// Handle to the SQLite database. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening playbook store");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        Self::init(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        // WAL for concurrent readers; foreign keys so playbook deletion cascades.
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )
        .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Lock the connection for a sequence of statements.
    pub fn conn(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS playbooks (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    description TEXT,
    guide TEXT,
    visibility TEXT NOT NULL DEFAULT 'private',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS personas (
    id TEXT PRIMARY KEY,
    playbook_id TEXT NOT NULL REFERENCES playbooks(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    system_prompt TEXT,
    position INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_personas_playbook ON personas(playbook_id, position);

CREATE TABLE IF NOT EXISTS skills (
    id TEXT PRIMARY KEY,
    playbook_id TEXT NOT NULL REFERENCES playbooks(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    description TEXT,
    content TEXT NOT NULL DEFAULT '',
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(playbook_id, name)
);

CREATE TABLE IF NOT EXISTS skill_attachments (
    id TEXT PRIMARY KEY,
    skill_id TEXT NOT NULL REFERENCES skills(id) ON DELETE CASCADE,
    filename TEXT NOT NULL,
    mime_type TEXT NOT NULL DEFAULT 'text/plain',
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_attachments_skill ON skill_attachments(skill_id);

CREATE TABLE IF NOT EXISTS tool_servers (
    id TEXT PRIMARY KEY,
    playbook_id TEXT NOT NULL REFERENCES playbooks(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    url TEXT NOT NULL,
    tools TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    UNIQUE(playbook_id, name)
);

CREATE TABLE IF NOT EXISTS api_keys (
    id TEXT PRIMARY KEY,
    playbook_id TEXT NOT NULL REFERENCES playbooks(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    key_hash TEXT NOT NULL UNIQUE,
    permissions TEXT NOT NULL DEFAULT '[]',
    revoked INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    last_used_at TEXT
);

CREATE TABLE IF NOT EXISTS memories (
    playbook_id TEXT NOT NULL REFERENCES playbooks(id) ON DELETE CASCADE,
    key TEXT NOT NULL,
    value TEXT NOT NULL DEFAULT 'null',
    tags TEXT NOT NULL DEFAULT '[]',
    description TEXT,
    tier TEXT NOT NULL DEFAULT 'working',
    priority INTEGER NOT NULL DEFAULT 50,
    parent_key TEXT,
    summary TEXT,
    memory_type TEXT NOT NULL DEFAULT 'flat',
    status TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    retention_policy TEXT,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (playbook_id, key)
);
CREATE INDEX IF NOT EXISTS idx_memories_parent ON memories(playbook_id, parent_key);
CREATE INDEX IF NOT EXISTS idx_memories_tier ON memories(playbook_id, tier, priority);

CREATE TABLE IF NOT EXISTS canvas_documents (
    playbook_id TEXT NOT NULL REFERENCES playbooks(id) ON DELETE CASCADE,
    slug TEXT NOT NULL,
    name TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    metadata TEXT NOT NULL DEFAULT '{}',
    sort_order INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (playbook_id, slug)
);

CREATE TABLE IF NOT EXISTS canvas_sections (
    playbook_id TEXT NOT NULL,
    slug TEXT NOT NULL,
    section_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    heading TEXT NOT NULL,
    level INTEGER NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    locked_by TEXT,
    locked_at TEXT,
    PRIMARY KEY (playbook_id, slug, section_id),
    FOREIGN KEY (playbook_id, slug) REFERENCES canvas_documents(playbook_id, slug) ON DELETE CASCADE
);
";

// ── Column helpers ─────────────────────────────────────────────

/// Map a rusqlite failure into the store error.
pub(crate) fn db_err(e: rusqlite::Error) -> PlaybookError {
    PlaybookError::Storage(e.to_string())
}

/// Canonical timestamp text. Fixed width so lexical order matches time order.
pub(crate) fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_failure(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn ts_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn opt_ts_col(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| {
        DateTime::parse_from_rfc3339(&r)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_failure(idx, e))
    })
    .transpose()
}

pub(crate) fn json_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Value> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn string_list_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn parsed_col<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = PlaybookError>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_failure(idx, e))
}

pub(crate) fn opt_parsed_col<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = PlaybookError>,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| r.parse().map_err(|e| conversion_failure(idx, e)))
        .transpose()
}

pub(crate) fn to_json_text<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_creates_schema() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('memories', 'canvas_sections', 'api_keys')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn open_on_disk_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("playbook.db");
        Database::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn timestamps_sort_lexically() {
        let early = ts(DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc));
        let late = ts(DateTime::parse_from_rfc3339("2026-01-01T00:00:00.5Z").unwrap().with_timezone(&Utc));
        assert!(early < late);
    }
}
