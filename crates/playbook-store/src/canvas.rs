//! Canvas documents and their sections.
//!
//! Sections live in their own table so a lock or a patch touches one row with
//! a conditional statement; the document's `content` column is re-rendered in
//! the same transaction as every section change.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use playbook_core::{CanvasDocument, CanvasSection, CanvasSummary, PlaybookError, Result};

use crate::db::{Database, db_err, json_col, opt_ts_col, to_json_text, ts, ts_col};

fn row_to_section(row: &rusqlite::Row<'_>) -> rusqlite::Result<CanvasSection> {
    Ok(CanvasSection {
        id: row.get(0)?,
        heading: row.get(1)?,
        level: row.get(2)?,
        content: row.get(3)?,
        locked_by: row.get(4)?,
        locked_at: opt_ts_col(row, 5)?,
    })
}

fn load_sections(conn: &Connection, playbook_id: &str, slug: &str) -> Result<Vec<CanvasSection>> {
    let mut stmt = conn
        .prepare(
            "SELECT section_id, heading, level, content, locked_by, locked_at
             FROM canvas_sections WHERE playbook_id = ?1 AND slug = ?2 ORDER BY position",
        )
        .map_err(db_err)?;
    let sections = stmt
        .query_map(params![playbook_id, slug], row_to_section)
        .map_err(db_err)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(db_err)?;
    Ok(sections)
}

fn load_document(conn: &Connection, playbook_id: &str, slug: &str) -> Result<Option<CanvasDocument>> {
    let doc = conn
        .query_row(
            "SELECT slug, name, content, metadata, sort_order, created_at, updated_at
             FROM canvas_documents WHERE playbook_id = ?1 AND slug = ?2",
            params![playbook_id, slug],
            |row| {
                Ok(CanvasDocument {
                    slug: row.get(0)?,
                    name: row.get(1)?,
                    content: row.get(2)?,
                    sections: Vec::new(),
                    metadata: json_col(row, 3)?,
                    sort_order: row.get(4)?,
                    created_at: ts_col(row, 5)?,
                    updated_at: ts_col(row, 6)?,
                })
            },
        )
        .optional()
        .map_err(db_err)?;

    match doc {
        Some(mut doc) => {
            doc.sections = load_sections(conn, playbook_id, slug)?;
            Ok(Some(doc))
        }
        None => Ok(None),
    }
}

/// Current holder of a section lock, or `None` when the section is missing.
fn section_holder(
    conn: &Connection,
    playbook_id: &str,
    slug: &str,
    section_id: &str,
) -> Result<Option<Option<String>>> {
    conn.query_row(
        "SELECT locked_by FROM canvas_sections
         WHERE playbook_id = ?1 AND slug = ?2 AND section_id = ?3",
        params![playbook_id, slug, section_id],
        |row| row.get::<_, Option<String>>(0),
    )
    .optional()
    .map_err(db_err)
}

/// Explain why a guarded section statement touched no row.
fn section_miss(
    conn: &Connection,
    playbook_id: &str,
    slug: &str,
    section_id: &str,
) -> Result<PlaybookError> {
    let exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM canvas_documents WHERE playbook_id = ?1 AND slug = ?2)",
            params![playbook_id, slug],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    if !exists {
        return Ok(PlaybookError::not_found("Canvas", slug));
    }
    Ok(match section_holder(conn, playbook_id, slug, section_id)? {
        Some(Some(holder)) => PlaybookError::Locked { holder },
        _ => PlaybookError::not_found("Section", section_id),
    })
}

/// Lock guard applied by [`Database::patch_canvas_section`].
#[derive(Debug, Clone)]
pub struct LockGuard {
    /// The agent performing the patch; its own locks never block it.
    pub agent_id: Option<String>,
    /// Locks taken before this instant are stale.
    pub stale_before: DateTime<Utc>,
}

impl Database {
    /// Listing ordered by `sort_order`, then name.
    pub fn list_canvas(&self, playbook_id: &str) -> Result<Vec<CanvasSummary>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT d.slug, d.name, d.sort_order, d.updated_at,
                        (SELECT COUNT(*) FROM canvas_sections s
                         WHERE s.playbook_id = d.playbook_id AND s.slug = d.slug)
                 FROM canvas_documents d WHERE d.playbook_id = ?1
                 ORDER BY d.sort_order ASC, d.name ASC",
            )
            .map_err(db_err)?;
        let docs = stmt
            .query_map(params![playbook_id], |row| {
                Ok(CanvasSummary {
                    slug: row.get(0)?,
                    name: row.get(1)?,
                    sort_order: row.get(2)?,
                    updated_at: ts_col(row, 3)?,
                    section_count: row.get::<_, i64>(4)? as usize,
                })
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(docs)
    }

    pub fn get_canvas(&self, playbook_id: &str, slug: &str) -> Result<Option<CanvasDocument>> {
        let conn = self.conn();
        load_document(&conn, playbook_id, slug)
    }

    /// Upsert a document and replace its sections wholesale.
    /// `sort_order = None` keeps the stored order (0 for a new document).
    #[allow(clippy::too_many_arguments)]
    pub fn put_canvas(
        &self,
        playbook_id: &str,
        slug: &str,
        name: &str,
        content: &str,
        sections: &[CanvasSection],
        metadata: Option<&Value>,
        sort_order: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<CanvasDocument> {
        let metadata = metadata.map(to_json_text).transpose()?;
        let now = ts(now);

        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "INSERT INTO canvas_documents
                 (playbook_id, slug, name, content, metadata, sort_order, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, COALESCE(?5, '{}'), COALESCE(?6, 0), ?7, ?7)
             ON CONFLICT(playbook_id, slug) DO UPDATE SET
                 name = ?3,
                 content = ?4,
                 metadata = COALESCE(?5, canvas_documents.metadata),
                 sort_order = COALESCE(?6, canvas_documents.sort_order),
                 updated_at = ?7",
            params![playbook_id, slug, name, content, metadata, sort_order, now],
        )
        .map_err(db_err)?;
        tx.execute(
            "DELETE FROM canvas_sections WHERE playbook_id = ?1 AND slug = ?2",
            params![playbook_id, slug],
        )
        .map_err(db_err)?;
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO canvas_sections
                         (playbook_id, slug, section_id, position, heading, level, content)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(db_err)?;
            for (position, section) in sections.iter().enumerate() {
                insert
                    .execute(params![
                        playbook_id,
                        slug,
                        section.id,
                        position as i64,
                        section.heading,
                        section.level,
                        section.content,
                    ])
                    .map_err(db_err)?;
            }
        }
        let doc = load_document(&tx, playbook_id, slug)?
            .ok_or_else(|| PlaybookError::not_found("Canvas", slug))?;
        tx.commit().map_err(db_err)?;
        Ok(doc)
    }

    /// Compare-and-swap lock: succeeds when the section is unlocked, already
    /// held by `agent_id`, or held by a lock older than `stale_before`.
    pub fn lock_canvas_section(
        &self,
        playbook_id: &str,
        slug: &str,
        section_id: &str,
        agent_id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<CanvasSection> {
        let conn = self.conn();
        let locked = conn
            .query_row(
                "UPDATE canvas_sections SET locked_by = ?4, locked_at = ?5
                 WHERE playbook_id = ?1 AND slug = ?2 AND section_id = ?3
                   AND (locked_by IS NULL OR locked_by = ?4 OR locked_at IS NULL OR locked_at < ?6)
                 RETURNING section_id, heading, level, content, locked_by, locked_at",
                params![playbook_id, slug, section_id, agent_id, ts(now), ts(stale_before)],
                row_to_section,
            )
            .optional()
            .map_err(db_err)?;
        match locked {
            Some(section) => Ok(section),
            None => Err(section_miss(&conn, playbook_id, slug, section_id)?),
        }
    }

    /// Clear a section lock regardless of holder. Returns the previous holder.
    pub fn unlock_canvas_section(
        &self,
        playbook_id: &str,
        slug: &str,
        section_id: &str,
    ) -> Result<Option<String>> {
        let conn = self.conn();
        let previous = section_holder(&conn, playbook_id, slug, section_id)?;
        let Some(previous) = previous else {
            return Err(section_miss(&conn, playbook_id, slug, section_id)?);
        };
        conn.execute(
            "UPDATE canvas_sections SET locked_by = NULL, locked_at = NULL
             WHERE playbook_id = ?1 AND slug = ?2 AND section_id = ?3",
            params![playbook_id, slug, section_id],
        )
        .map_err(db_err)?;
        Ok(previous)
    }

    /// Replace one section's body (and optionally its heading), then re-render
    /// the document content with `render`, all in one transaction.
    ///
    /// With a guard, the write only applies if the section is not freshly
    /// locked by another agent; the lock check is part of the UPDATE itself.
    #[allow(clippy::too_many_arguments)]
    pub fn patch_canvas_section(
        &self,
        playbook_id: &str,
        slug: &str,
        section_id: &str,
        content: &str,
        heading: Option<&str>,
        guard: Option<&LockGuard>,
        render: impl FnOnce(&[CanvasSection]) -> String,
        now: DateTime<Utc>,
    ) -> Result<CanvasDocument> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(db_err)?;

        let changed = match guard {
            Some(guard) => tx.execute(
                "UPDATE canvas_sections SET content = ?4, heading = COALESCE(?5, heading)
                 WHERE playbook_id = ?1 AND slug = ?2 AND section_id = ?3
                   AND (locked_by IS NULL OR locked_by = ?6 OR locked_at IS NULL OR locked_at < ?7)",
                params![
                    playbook_id,
                    slug,
                    section_id,
                    content,
                    heading,
                    guard.agent_id,
                    ts(guard.stale_before)
                ],
            ),
            None => tx.execute(
                "UPDATE canvas_sections SET content = ?4, heading = COALESCE(?5, heading)
                 WHERE playbook_id = ?1 AND slug = ?2 AND section_id = ?3",
                params![playbook_id, slug, section_id, content, heading],
            ),
        }
        .map_err(db_err)?;

        if changed == 0 {
            let err = section_miss(&tx, playbook_id, slug, section_id)?;
            return Err(err);
        }

        let sections = load_sections(&tx, playbook_id, slug)?;
        let rendered = render(&sections);
        tx.execute(
            "UPDATE canvas_documents SET content = ?3, updated_at = ?4
             WHERE playbook_id = ?1 AND slug = ?2",
            params![playbook_id, slug, rendered, ts(now)],
        )
        .map_err(db_err)?;
        let doc = load_document(&tx, playbook_id, slug)?
            .ok_or_else(|| PlaybookError::not_found("Canvas", slug))?;
        tx.commit().map_err(db_err)?;
        Ok(doc)
    }
}
