//! Playbooks and the entities they own that the protocol server reads:
//! personas, skills (with attachments), and linked tool servers.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use playbook_core::{
    Persona, Playbook, PlaybookError, Result, Skill, SkillAttachment, Tool, ToolServer, Visibility,
};

use crate::db::{Database, db_err, parsed_col, string_list_col, to_json_text, ts, ts_col};

const PLAYBOOK_COLUMNS: &str = "id, name, description, guide, visibility, created_at, updated_at";
const SKILL_COLUMNS: &str = "id, name, description, content, tags, updated_at";

fn row_to_playbook(row: &rusqlite::Row<'_>) -> rusqlite::Result<Playbook> {
    Ok(Playbook {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        guide: row.get(3)?,
        visibility: parsed_col::<Visibility>(row, 4)?,
        created_at: ts_col(row, 5)?,
        updated_at: ts_col(row, 6)?,
    })
}

fn row_to_skill(row: &rusqlite::Row<'_>) -> rusqlite::Result<Skill> {
    Ok(Skill {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        content: row.get(3)?,
        tags: string_list_col(row, 4)?,
        attachments: Vec::new(),
        updated_at: ts_col(row, 5)?,
    })
}

fn row_to_persona(row: &rusqlite::Row<'_>) -> rusqlite::Result<Persona> {
    Ok(Persona {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        system_prompt: row.get(3)?,
    })
}

/// Partial update of a playbook's own fields.
#[derive(Debug, Clone, Default)]
pub struct PlaybookUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub guide: Option<String>,
    pub visibility: Option<Visibility>,
}

#[derive(Debug, Clone, Default)]
pub struct SkillDraft {
    pub name: String,
    pub description: Option<String>,
    pub content: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SkillUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Map a uniqueness violation to a validation error naming the duplicate.
fn unique_err(kind: &str, name: &str) -> impl FnOnce(rusqlite::Error) -> PlaybookError {
    let message = format!("{kind} '{name}' already exists");
    move |e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            PlaybookError::Validation(message)
        }
        other => db_err(other),
    }
}

impl Database {
    // ── Playbooks ──────────────────────────────────────────────

    pub fn create_playbook(
        &self,
        name: &str,
        description: Option<&str>,
        guide: Option<&str>,
        visibility: Visibility,
        now: DateTime<Utc>,
    ) -> Result<Playbook> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn();
        let playbook = conn
            .query_row(
                &format!(
                    "INSERT INTO playbooks (id, name, description, guide, visibility, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6) RETURNING {PLAYBOOK_COLUMNS}"
                ),
                params![id, name, description, guide, visibility.as_str(), ts(now)],
                row_to_playbook,
            )
            .map_err(db_err)?;
        debug!(playbook_id = %playbook.id, "created playbook");
        Ok(playbook)
    }

    pub fn get_playbook(&self, id: &str) -> Result<Option<Playbook>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {PLAYBOOK_COLUMNS} FROM playbooks WHERE id = ?1"),
            params![id],
            row_to_playbook,
        )
        .optional()
        .map_err(db_err)
    }

    pub fn list_playbooks(&self) -> Result<Vec<Playbook>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {PLAYBOOK_COLUMNS} FROM playbooks ORDER BY created_at ASC, name ASC"
            ))
            .map_err(db_err)?;
        let playbooks = stmt
            .query_map([], row_to_playbook)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(playbooks)
    }

    pub fn update_playbook(
        &self,
        id: &str,
        update: &PlaybookUpdate,
        now: DateTime<Utc>,
    ) -> Result<Playbook> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "UPDATE playbooks SET
                     name = COALESCE(?2, name),
                     description = COALESCE(?3, description),
                     guide = COALESCE(?4, guide),
                     visibility = COALESCE(?5, visibility),
                     updated_at = ?6
                 WHERE id = ?1 RETURNING {PLAYBOOK_COLUMNS}"
            ),
            params![
                id,
                update.name,
                update.description,
                update.guide,
                update.visibility.map(|v| v.as_str()),
                ts(now)
            ],
            row_to_playbook,
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| PlaybookError::not_found("Playbook", id))
    }

    pub fn delete_playbook(&self, id: &str) -> Result<bool> {
        let conn = self.conn();
        let n = conn
            .execute("DELETE FROM playbooks WHERE id = ?1", params![id])
            .map_err(db_err)?;
        Ok(n > 0)
    }

    // ── Personas ───────────────────────────────────────────────

    pub fn list_personas(&self, playbook_id: &str) -> Result<Vec<Persona>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, description, system_prompt FROM personas
                 WHERE playbook_id = ?1 ORDER BY position ASC, created_at ASC",
            )
            .map_err(db_err)?;
        let personas = stmt
            .query_map(params![playbook_id], row_to_persona)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(personas)
    }

    /// The first persona by position.
    pub fn primary_persona(&self, playbook_id: &str) -> Result<Option<Persona>> {
        Ok(self.list_personas(playbook_id)?.into_iter().next())
    }

    /// Update the primary persona in place, creating it when the playbook has none.
    /// `name` is required only when creating.
    pub fn upsert_primary_persona(
        &self,
        playbook_id: &str,
        name: Option<&str>,
        description: Option<&str>,
        system_prompt: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Persona> {
        if let Some(existing) = self.primary_persona(playbook_id)? {
            let conn = self.conn();
            return conn
                .query_row(
                    "UPDATE personas SET
                         name = COALESCE(?2, name),
                         description = COALESCE(?3, description),
                         system_prompt = COALESCE(?4, system_prompt)
                     WHERE id = ?1 RETURNING id, name, description, system_prompt",
                    params![existing.id, name, description, system_prompt],
                    row_to_persona,
                )
                .map_err(db_err);
        }

        let name = name.ok_or_else(|| {
            PlaybookError::Validation("persona name is required when the playbook has no persona".into())
        })?;
        let conn = self.conn();
        conn.query_row(
            "INSERT INTO personas (id, playbook_id, name, description, system_prompt, position, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6) RETURNING id, name, description, system_prompt",
            params![
                uuid::Uuid::new_v4().to_string(),
                playbook_id,
                name,
                description,
                system_prompt,
                ts(now)
            ],
            row_to_persona,
        )
        .map_err(db_err)
    }

    // ── Skills ─────────────────────────────────────────────────

    /// Skills with their attachment listings (content omitted), ordered by name.
    pub fn list_skills(&self, playbook_id: &str) -> Result<Vec<Skill>> {
        let mut skills = {
            let conn = self.conn();
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SKILL_COLUMNS} FROM skills WHERE playbook_id = ?1 ORDER BY name ASC"
                ))
                .map_err(db_err)?;
            stmt.query_map(params![playbook_id], row_to_skill)
                .map_err(db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err)?
        };
        for skill in &mut skills {
            skill.attachments = self.list_attachments(&skill.id)?;
        }
        Ok(skills)
    }

    /// Look up a skill by id or exact name.
    pub fn get_skill(&self, playbook_id: &str, id_or_name: &str) -> Result<Option<Skill>> {
        let skill = {
            let conn = self.conn();
            conn.query_row(
                &format!(
                    "SELECT {SKILL_COLUMNS} FROM skills
                     WHERE playbook_id = ?1 AND (id = ?2 OR name = ?2)
                     ORDER BY (id = ?2) DESC LIMIT 1"
                ),
                params![playbook_id, id_or_name],
                row_to_skill,
            )
            .optional()
            .map_err(db_err)?
        };
        match skill {
            Some(mut skill) => {
                skill.attachments = self.list_attachments(&skill.id)?;
                Ok(Some(skill))
            }
            None => Ok(None),
        }
    }

    pub fn create_skill(&self, playbook_id: &str, draft: &SkillDraft, now: DateTime<Utc>) -> Result<Skill> {
        let conn = self.conn();
        conn.query_row(
            &format!(
                "INSERT INTO skills (id, playbook_id, name, description, content, tags, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) RETURNING {SKILL_COLUMNS}"
            ),
            params![
                uuid::Uuid::new_v4().to_string(),
                playbook_id,
                draft.name,
                draft.description,
                draft.content,
                to_json_text(&draft.tags)?,
                ts(now)
            ],
            row_to_skill,
        )
        .map_err(unique_err("skill", &draft.name))
    }

    pub fn update_skill(
        &self,
        playbook_id: &str,
        id: &str,
        update: &SkillUpdate,
        now: DateTime<Utc>,
    ) -> Result<Skill> {
        let tags = update.tags.as_ref().map(to_json_text).transpose()?;
        let name = update.name.clone().unwrap_or_default();
        let skill = {
            let conn = self.conn();
            conn.query_row(
                &format!(
                    "UPDATE skills SET
                         name = COALESCE(?3, name),
                         description = COALESCE(?4, description),
                         content = COALESCE(?5, content),
                         tags = COALESCE(?6, tags),
                         updated_at = ?7
                     WHERE playbook_id = ?1 AND id = ?2 RETURNING {SKILL_COLUMNS}"
                ),
                params![
                    playbook_id,
                    id,
                    update.name,
                    update.description,
                    update.content,
                    tags,
                    ts(now)
                ],
                row_to_skill,
            )
            .optional()
            .map_err(unique_err("skill", &name))?
        };
        let mut skill = skill.ok_or_else(|| PlaybookError::not_found("Skill", id))?;
        skill.attachments = self.list_attachments(&skill.id)?;
        Ok(skill)
    }

    pub fn delete_skill(&self, playbook_id: &str, id: &str) -> Result<bool> {
        let conn = self.conn();
        let n = conn
            .execute(
                "DELETE FROM skills WHERE playbook_id = ?1 AND id = ?2",
                params![playbook_id, id],
            )
            .map_err(db_err)?;
        Ok(n > 0)
    }

    // ── Skill attachments ──────────────────────────────────────

    fn list_attachments(&self, skill_id: &str) -> Result<Vec<SkillAttachment>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, skill_id, filename, mime_type FROM skill_attachments
                 WHERE skill_id = ?1 ORDER BY filename ASC",
            )
            .map_err(db_err)?;
        let attachments = stmt
            .query_map(params![skill_id], |row| {
                Ok(SkillAttachment {
                    id: row.get(0)?,
                    skill_id: row.get(1)?,
                    filename: row.get(2)?,
                    mime_type: row.get(3)?,
                    content: None,
                })
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(attachments)
    }

    pub fn add_attachment(
        &self,
        skill_id: &str,
        filename: &str,
        mime_type: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<SkillAttachment> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO skill_attachments (id, skill_id, filename, mime_type, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![id, skill_id, filename, mime_type, content, ts(now)],
        )
        .map_err(db_err)?;
        Ok(SkillAttachment {
            id,
            skill_id: skill_id.to_string(),
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            content: Some(content.to_string()),
        })
    }

    /// Attachment with content, only if its skill belongs to `playbook_id`.
    pub fn get_attachment(
        &self,
        playbook_id: &str,
        skill_id: &str,
        attachment_id: &str,
    ) -> Result<Option<SkillAttachment>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT a.id, a.skill_id, a.filename, a.mime_type, a.content
             FROM skill_attachments a JOIN skills s ON s.id = a.skill_id
             WHERE s.playbook_id = ?1 AND a.skill_id = ?2 AND a.id = ?3",
            params![playbook_id, skill_id, attachment_id],
            |row| {
                Ok(SkillAttachment {
                    id: row.get(0)?,
                    skill_id: row.get(1)?,
                    filename: row.get(2)?,
                    mime_type: row.get(3)?,
                    content: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    // ── Linked tool servers ────────────────────────────────────

    pub fn list_tool_servers(&self, playbook_id: &str) -> Result<Vec<ToolServer>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, url, tools FROM tool_servers
                 WHERE playbook_id = ?1 ORDER BY name ASC",
            )
            .map_err(db_err)?;
        let raw = stmt
            .query_map(params![playbook_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;

        raw.into_iter()
            .map(|(id, name, url, tools)| {
                Ok(ToolServer {
                    id,
                    name,
                    url,
                    tools: serde_json::from_str::<Vec<Tool>>(&tools)?,
                })
            })
            .collect()
    }

    /// Link (or re-link) an external tool server with its declared tools.
    pub fn link_tool_server(
        &self,
        playbook_id: &str,
        name: &str,
        url: &str,
        tools: &[Tool],
        now: DateTime<Utc>,
    ) -> Result<ToolServer> {
        let id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn();
        let id: String = conn
            .query_row(
                "INSERT INTO tool_servers (id, playbook_id, name, url, tools, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(playbook_id, name) DO UPDATE SET url = ?4, tools = ?5
                 RETURNING id",
                params![id, playbook_id, name, url, to_json_text(&tools)?, ts(now)],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(ToolServer {
            id,
            name: name.to_string(),
            url: url.to_string(),
            tools: tools.to_vec(),
        })
    }
}
