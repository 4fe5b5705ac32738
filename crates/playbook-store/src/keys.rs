//! API key records. Only the blake3 hash of a key is ever stored.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use playbook_core::Result;

use crate::db::{Database, db_err, opt_ts_col, string_list_col, to_json_text, ts, ts_col};

const KEY_COLUMNS: &str = "id, playbook_id, name, permissions, revoked, created_at, last_used_at";

#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyRow {
    pub id: String,
    pub playbook_id: String,
    pub name: String,
    pub permissions: Vec<String>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

fn row_to_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApiKeyRow> {
    Ok(ApiKeyRow {
        id: row.get(0)?,
        playbook_id: row.get(1)?,
        name: row.get(2)?,
        permissions: string_list_col(row, 3)?,
        revoked: row.get(4)?,
        created_at: ts_col(row, 5)?,
        last_used_at: opt_ts_col(row, 6)?,
    })
}

impl Database {
    pub fn insert_api_key(
        &self,
        playbook_id: &str,
        name: &str,
        key_hash: &str,
        permissions: &[String],
        now: DateTime<Utc>,
    ) -> Result<ApiKeyRow> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "INSERT INTO api_keys (id, playbook_id, name, key_hash, permissions, revoked, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6) RETURNING {KEY_COLUMNS}"
            ),
            params![
                uuid::Uuid::new_v4().to_string(),
                playbook_id,
                name,
                key_hash,
                to_json_text(&permissions)?,
                ts(now)
            ],
            row_to_key,
        )
        .map_err(db_err)
    }

    /// Look up an unrevoked key by hash and stamp `last_used_at`.
    pub fn use_api_key(&self, key_hash: &str, now: DateTime<Utc>) -> Result<Option<ApiKeyRow>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "UPDATE api_keys SET last_used_at = ?2
                 WHERE key_hash = ?1 AND revoked = 0 RETURNING {KEY_COLUMNS}"
            ),
            params![key_hash, ts(now)],
            row_to_key,
        )
        .optional()
        .map_err(db_err)
    }

    pub fn list_api_keys(&self, playbook_id: &str) -> Result<Vec<ApiKeyRow>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {KEY_COLUMNS} FROM api_keys WHERE playbook_id = ?1 ORDER BY created_at ASC"
            ))
            .map_err(db_err)?;
        let keys = stmt
            .query_map(params![playbook_id], row_to_key)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(keys)
    }

    pub fn revoke_api_key(&self, id: &str) -> Result<bool> {
        let conn = self.conn();
        let n = conn
            .execute(
                "UPDATE api_keys SET revoked = 1 WHERE id = ?1 AND revoked = 0",
                params![id],
            )
            .map_err(db_err)?;
        Ok(n > 0)
    }
}
