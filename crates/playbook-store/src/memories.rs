//! Memory rows: upsert, filtered search, and the conditional statements the
//! tier engine relies on (promotion, archival, task status, parent completion).

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params, params_from_iter};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use playbook_core::{Memory, MemoryType, Result, TaskStatus, Tier};

use crate::db::{
    Database, db_err, json_col, opt_parsed_col, opt_ts_col, parsed_col, string_list_col,
    to_json_text, ts, ts_col,
};

const MEMORY_COLUMNS: &str = "key, value, tags, description, tier, priority, parent_key, summary, \
     memory_type, status, metadata, retention_policy, access_count, last_accessed_at, \
     created_at, updated_at";

/// Integer rank of a tier column or parameter, matching [`Tier::rank`].
fn tier_rank_sql(expr: &str) -> String {
    format!("(CASE {expr} WHEN 'working' THEN 2 WHEN 'contextual' THEN 1 ELSE 0 END)")
}

/// A JSON column coerced to an object so `json_set` never operates on a scalar.
fn json_object_sql(column: &str) -> String {
    format!("(CASE WHEN json_type({column}) = 'object' THEN {column} ELSE '{{}}' END)")
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    Ok(Memory {
        key: row.get(0)?,
        value: json_col(row, 1)?,
        tags: string_list_col(row, 2)?,
        description: row.get(3)?,
        tier: parsed_col(row, 4)?,
        priority: row.get(5)?,
        parent_key: row.get(6)?,
        summary: row.get(7)?,
        memory_type: parsed_col(row, 8)?,
        status: opt_parsed_col(row, 9)?,
        metadata: json_col(row, 10)?,
        retention_policy: row.get(11)?,
        access_count: row.get(12)?,
        last_accessed_at: opt_ts_col(row, 13)?,
        created_at: ts_col(row, 14)?,
        updated_at: ts_col(row, 15)?,
    })
}

/// Fields of a memory write. `None` leaves the stored value untouched on update
/// and falls back to the column default on insert.
#[derive(Debug, Clone, Default)]
pub struct MemoryWrite {
    pub value: Option<Value>,
    pub tags: Option<Vec<String>>,
    pub description: Option<String>,
    pub tier: Option<Tier>,
    /// Already clamped by the caller.
    pub priority: Option<i64>,
    pub parent_key: Option<String>,
    pub summary: Option<String>,
    pub memory_type: Option<MemoryType>,
    pub status: Option<TaskStatus>,
    pub metadata: Option<Value>,
    pub retention_policy: Option<String>,
}

/// Filters for [`Database::search_memories`]. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    /// Case-insensitive substring over key, description, and summary.
    pub query: Option<String>,
    /// Any-match against the memory's tags.
    pub tags: Option<Vec<String>>,
    pub tier: Option<Tier>,
    pub memory_type: Option<MemoryType>,
    pub status: Option<TaskStatus>,
    /// Restrict to memories with no parent.
    pub roots_only: bool,
    /// Restrict to direct children of this key.
    pub parent_key: Option<String>,
    /// Restrict to these exact keys.
    pub keys: Option<Vec<String>>,
    pub limit: Option<usize>,
}

/// Selection for [`Database::archive_memories`], intersected with the
/// not-already-longterm and not-permanent guard.
#[derive(Debug, Clone, Default)]
pub struct ArchiveFilter {
    pub keys: Option<Vec<String>>,
    pub updated_before: Option<DateTime<Utc>>,
    pub from_tier: Option<Tier>,
    pub tags: Option<Vec<String>>,
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

const TAG_OVERLAP_SQL: &str = "EXISTS (SELECT 1 FROM json_each(memories.tags) t \
     WHERE t.value IN (SELECT value FROM json_each(?)))";

impl Database {
    /// Fetch a memory without touching its access statistics.
    pub fn get_memory(&self, playbook_id: &str, key: &str) -> Result<Option<Memory>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE playbook_id = ?1 AND key = ?2"),
            params![playbook_id, key],
            row_to_memory,
        )
        .optional()
        .map_err(db_err)
    }

    /// Fetch a memory, incrementing `access_count` and stamping
    /// `last_accessed_at` in the same statement.
    pub fn touch_memory(
        &self,
        playbook_id: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Memory>> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "UPDATE memories SET access_count = access_count + 1, last_accessed_at = ?3 \
                 WHERE playbook_id = ?1 AND key = ?2 RETURNING {MEMORY_COLUMNS}"
            ),
            params![playbook_id, key, ts(now)],
            row_to_memory,
        )
        .optional()
        .map_err(db_err)
    }

    /// Insert or partially update a memory in one statement.
    pub fn upsert_memory(
        &self,
        playbook_id: &str,
        key: &str,
        write: &MemoryWrite,
        now: DateTime<Utc>,
    ) -> Result<Memory> {
        let value = write.value.as_ref().map(to_json_text).transpose()?;
        let tags = write.tags.as_ref().map(to_json_text).transpose()?;
        let metadata = write.metadata.as_ref().map(to_json_text).transpose()?;

        let conn = self.conn();
        conn.query_row(
            &format!(
                "INSERT INTO memories (playbook_id, key, value, tags, description, tier, priority, \
                     parent_key, summary, memory_type, status, metadata, retention_policy, \
                     access_count, created_at, updated_at)
                 VALUES (?1, ?2, COALESCE(?3, 'null'), COALESCE(?4, '[]'), ?5, COALESCE(?6, 'working'), \
                     COALESCE(?7, 50), ?8, ?9, COALESCE(?10, 'flat'), ?11, COALESCE(?12, '{{}}'), ?13, \
                     0, ?14, ?14)
                 ON CONFLICT(playbook_id, key) DO UPDATE SET
                     value = COALESCE(?3, memories.value),
                     tags = COALESCE(?4, memories.tags),
                     description = COALESCE(?5, memories.description),
                     tier = COALESCE(?6, memories.tier),
                     priority = COALESCE(?7, memories.priority),
                     parent_key = COALESCE(?8, memories.parent_key),
                     summary = COALESCE(?9, memories.summary),
                     memory_type = COALESCE(?10, memories.memory_type),
                     status = COALESCE(?11, memories.status),
                     metadata = COALESCE(?12, memories.metadata),
                     retention_policy = COALESCE(?13, memories.retention_policy),
                     updated_at = ?14
                 RETURNING {MEMORY_COLUMNS}"
            ),
            params![
                playbook_id,
                key,
                value,
                tags,
                write.description,
                write.tier.map(|t| t.as_str()),
                write.priority,
                write.parent_key,
                write.summary,
                write.memory_type.map(|t| t.as_str()),
                write.status.map(|s| s.as_str()),
                metadata,
                write.retention_policy,
                ts(now),
            ],
            row_to_memory,
        )
        .map_err(db_err)
    }

    /// Hard delete. Returns whether a row was removed.
    pub fn delete_memory(&self, playbook_id: &str, key: &str) -> Result<bool> {
        let conn = self.conn();
        let n = conn
            .execute(
                "DELETE FROM memories WHERE playbook_id = ?1 AND key = ?2",
                params![playbook_id, key],
            )
            .map_err(db_err)?;
        Ok(n > 0)
    }

    /// Filtered listing ordered by priority desc, then most recently updated.
    pub fn search_memories(&self, playbook_id: &str, filter: &MemoryFilter) -> Result<Vec<Memory>> {
        let mut clauses = vec!["playbook_id = ?".to_string()];
        let mut args: Vec<SqlValue> = vec![SqlValue::Text(playbook_id.to_string())];

        if let Some(q) = filter.query.as_deref().filter(|q| !q.is_empty()) {
            clauses.push(
                "(LOWER(key) LIKE ? ESCAPE '\\' OR LOWER(COALESCE(description, '')) LIKE ? ESCAPE '\\' \
                 OR LOWER(COALESCE(summary, '')) LIKE ? ESCAPE '\\')"
                    .to_string(),
            );
            let pattern = like_pattern(q);
            for _ in 0..3 {
                args.push(SqlValue::Text(pattern.clone()));
            }
        }
        if let Some(tags) = filter.tags.as_ref().filter(|t| !t.is_empty()) {
            clauses.push(TAG_OVERLAP_SQL.to_string());
            args.push(SqlValue::Text(to_json_text(tags)?));
        }
        if let Some(tier) = filter.tier {
            clauses.push("tier = ?".to_string());
            args.push(SqlValue::Text(tier.as_str().to_string()));
        }
        if let Some(memory_type) = filter.memory_type {
            clauses.push("memory_type = ?".to_string());
            args.push(SqlValue::Text(memory_type.as_str().to_string()));
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?".to_string());
            args.push(SqlValue::Text(status.as_str().to_string()));
        }
        if filter.roots_only {
            clauses.push("parent_key IS NULL".to_string());
        }
        if let Some(parent) = &filter.parent_key {
            clauses.push("parent_key = ?".to_string());
            args.push(SqlValue::Text(parent.clone()));
        }
        if let Some(keys) = &filter.keys {
            clauses.push("key IN (SELECT value FROM json_each(?))".to_string());
            args.push(SqlValue::Text(to_json_text(keys)?));
        }

        let mut sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memories WHERE {} \
             ORDER BY priority DESC, updated_at DESC, key ASC",
            clauses.join(" AND ")
        );
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            args.push(SqlValue::Integer(limit as i64));
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(args), row_to_memory)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    /// Which of the given keys exist, in the order given.
    pub fn existing_memory_keys(&self, playbook_id: &str, keys: &[String]) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT j.value FROM json_each(?2) j \
                 WHERE EXISTS (SELECT 1 FROM memories m WHERE m.playbook_id = ?1 AND m.key = j.value) \
                 ORDER BY j.key",
            )
            .map_err(db_err)?;
        let found = stmt
            .query_map(params![playbook_id, to_json_text(&keys)?], |row| row.get(0))
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(db_err)?;
        Ok(found)
    }

    /// Keys on the ancestor chain of `start` (excluding `start` unless the chain
    /// loops back to it). The walk follows every link and stops on a repeated key.
    pub fn memory_ancestors(&self, playbook_id: &str, start: &str) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "WITH RECURSIVE chain(k) AS (
                     SELECT parent_key FROM memories WHERE playbook_id = ?1 AND key = ?2
                     UNION
                     SELECT m.parent_key
                     FROM memories m JOIN chain ON m.playbook_id = ?1 AND m.key = chain.k
                 )
                 SELECT k FROM chain WHERE k IS NOT NULL",
            )
            .map_err(db_err)?;
        let chain = stmt
            .query_map(params![playbook_id, start], |row| row.get(0))
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<String>>>()
            .map_err(db_err)?;
        Ok(chain)
    }

    /// Re-parent existing keys, optionally moving them to a new tier.
    pub fn reparent_memories(
        &self,
        playbook_id: &str,
        keys: &[String],
        parent_key: &str,
        tier: Option<Tier>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let conn = self.conn();
        conn.execute(
            "UPDATE memories SET parent_key = ?3, tier = COALESCE(?4, tier), updated_at = ?5 \
             WHERE playbook_id = ?1 AND key IN (SELECT value FROM json_each(?2))",
            params![
                playbook_id,
                to_json_text(&keys)?,
                parent_key,
                tier.map(|t| t.as_str()),
                ts(now)
            ],
        )
        .map_err(db_err)
    }

    /// Boost priority (capped at 100), reset `access_count`, and move to
    /// `target` only when that does not lower the tier. One statement.
    pub fn promote_memory(
        &self,
        playbook_id: &str,
        key: &str,
        boost: i64,
        target: Option<Tier>,
        now: DateTime<Utc>,
    ) -> Result<Option<Memory>> {
        let sql = format!(
            "UPDATE memories SET
                 priority = MIN(100, priority + ?3),
                 access_count = 0,
                 tier = CASE WHEN ?4 IS NOT NULL AND {target_rank} >= {current_rank}
                             THEN ?4 ELSE tier END,
                 updated_at = ?5
             WHERE playbook_id = ?1 AND key = ?2
             RETURNING {MEMORY_COLUMNS}",
            target_rank = tier_rank_sql("?4"),
            current_rank = tier_rank_sql("tier"),
        );
        let conn = self.conn();
        conn.query_row(
            &sql,
            params![playbook_id, key, boost, target.map(|t| t.as_str()), ts(now)],
            row_to_memory,
        )
        .optional()
        .map_err(db_err)
    }

    /// Move every matching, non-permanent, not-yet-longterm memory to
    /// `longterm`. Returns the archived keys.
    pub fn archive_memories(
        &self,
        playbook_id: &str,
        filter: &ArchiveFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let mut clauses = vec![
            "playbook_id = ?".to_string(),
            "tier != 'longterm'".to_string(),
            "COALESCE(retention_policy, '') != 'permanent'".to_string(),
        ];
        let mut args: Vec<SqlValue> = vec![
            SqlValue::Text(ts(now)),
            SqlValue::Text(playbook_id.to_string()),
        ];

        if let Some(keys) = &filter.keys {
            clauses.push("key IN (SELECT value FROM json_each(?))".to_string());
            args.push(SqlValue::Text(to_json_text(keys)?));
        }
        if let Some(before) = filter.updated_before {
            clauses.push("updated_at < ?".to_string());
            args.push(SqlValue::Text(ts(before)));
        }
        if let Some(tier) = filter.from_tier {
            clauses.push("tier = ?".to_string());
            args.push(SqlValue::Text(tier.as_str().to_string()));
        }
        if let Some(tags) = filter.tags.as_ref().filter(|t| !t.is_empty()) {
            clauses.push(TAG_OVERLAP_SQL.to_string());
            args.push(SqlValue::Text(to_json_text(tags)?));
        }

        let sql = format!(
            "UPDATE memories SET tier = 'longterm', updated_at = ? WHERE {} RETURNING key",
            clauses.join(" AND ")
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let mut keys = stmt
            .query_map(params_from_iter(args), |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        keys.sort();
        Ok(keys)
    }

    /// Set a task's status, merge `result` into `value.result`, and
    /// optionally replace the summary.
    pub fn update_task(
        &self,
        playbook_id: &str,
        key: &str,
        status: TaskStatus,
        result: Option<&Value>,
        summary: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<Memory>> {
        let result = result.map(to_json_text).transpose()?;
        let sql = format!(
            "UPDATE memories SET
                 status = ?3,
                 value = CASE WHEN ?4 IS NULL THEN value
                              ELSE json_set({value_obj}, '$.result', json(?4)) END,
                 summary = COALESCE(?5, summary),
                 updated_at = ?6
             WHERE playbook_id = ?1 AND key = ?2
             RETURNING {MEMORY_COLUMNS}",
            value_obj = json_object_sql("value"),
        );
        let conn = self.conn();
        conn.query_row(
            &sql,
            params![playbook_id, key, status.as_str(), result, summary, ts(now)],
            row_to_memory,
        )
        .optional()
        .map_err(db_err)
    }

    /// Write the current completed-children count into the parent's
    /// `metadata.completed_tasks`.
    pub fn refresh_completed_count(&self, playbook_id: &str, parent_key: &str) -> Result<()> {
        let sql = format!(
            "UPDATE memories SET metadata = json_set({meta}, '$.completed_tasks',
                 (SELECT COUNT(*) FROM memories c
                  WHERE c.playbook_id = ?1 AND c.parent_key = ?2 AND c.status = 'completed'))
             WHERE playbook_id = ?1 AND key = ?2",
            meta = json_object_sql("metadata"),
        );
        let conn = self.conn();
        conn.execute(&sql, params![playbook_id, parent_key])
            .map_err(db_err)?;
        Ok(())
    }

    /// Mark the parent completed when no child is left unfinished. The
    /// sibling check and the write are one statement, so concurrent
    /// completions of the last two children complete the parent exactly once.
    /// Returns whether the parent transitioned.
    pub fn complete_parent_if_done(
        &self,
        playbook_id: &str,
        parent_key: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let sql = format!(
            "UPDATE memories SET
                 status = 'completed',
                 metadata = json_set({meta},
                     '$.completed_tasks',
                     (SELECT COUNT(*) FROM memories c WHERE c.playbook_id = ?1 AND c.parent_key = ?2),
                     '$.completed_at', ?3),
                 updated_at = ?3
             WHERE playbook_id = ?1 AND key = ?2
               AND COALESCE(status, '') != 'completed'
               AND NOT EXISTS (
                   SELECT 1 FROM memories c
                   WHERE c.playbook_id = ?1 AND c.parent_key = ?2
                     AND COALESCE(c.status, '') != 'completed')",
            meta = json_object_sql("metadata"),
        );
        let conn = self.conn();
        let n = conn
            .execute(&sql, params![playbook_id, parent_key, ts(now)])
            .map_err(db_err)?;
        Ok(n > 0)
    }
}
