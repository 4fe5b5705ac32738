use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use playbook_config::CanvasConfig;
use playbook_core::{CanvasDocument, CanvasSection, CanvasSummary, PlaybookError, Result};
use playbook_store::{Database, LockGuard};

use crate::parser::{parse_sections, render};

/// Canvas operations scoped to one playbook.
#[derive(Clone)]
pub struct CanvasEngine {
    db: Database,
    playbook_id: String,
    config: CanvasConfig,
}

/// Table-of-contents entry returned by `get_toc`.
#[derive(Debug, Clone, Serialize)]
pub struct TocEntry {
    pub id: String,
    pub heading: String,
    pub level: u8,
    pub locked_by: Option<String>,
}

fn validate_slug(slug: &str) -> Result<()> {
    let valid = slug
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(PlaybookError::Validation(format!(
            "slug '{slug}' must start with a letter or digit and contain only letters, digits, '-', '_' or '.'"
        )))
    }
}

impl CanvasEngine {
    pub fn new(db: Database, playbook_id: impl Into<String>, config: CanvasConfig) -> Self {
        Self {
            db,
            playbook_id: playbook_id.into(),
            config,
        }
    }

    /// Locks taken before this instant are stale. A TTL too large to represent
    /// keeps every lock live.
    fn stale_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        i64::try_from(self.config.lock_ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|ttl| now.checked_sub_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn list(&self) -> Result<Vec<CanvasSummary>> {
        self.db.list_canvas(&self.playbook_id)
    }

    pub fn read(&self, slug: &str) -> Result<CanvasDocument> {
        self.db
            .get_canvas(&self.playbook_id, slug)?
            .ok_or_else(|| PlaybookError::not_found("Canvas", slug))
    }

    /// Parse and store a whole document. Sections are replaced and their ids
    /// reassigned; any locks on the old sections are dropped.
    pub fn write(
        &self,
        slug: &str,
        name: Option<&str>,
        content: &str,
        metadata: Option<&Value>,
        sort_order: Option<i64>,
    ) -> Result<CanvasDocument> {
        validate_slug(slug)?;
        let sections = parse_sections(content);
        let rendered = render(&sections);
        let name = name.filter(|n| !n.trim().is_empty()).unwrap_or(slug);

        let doc = self.db.put_canvas(
            &self.playbook_id,
            slug,
            name,
            &rendered,
            &sections,
            metadata,
            sort_order,
            Utc::now(),
        )?;
        info!(playbook = %self.playbook_id, slug, sections = doc.sections.len(), "canvas written");
        Ok(doc)
    }

    pub fn patch_section(
        &self,
        slug: &str,
        section_id: &str,
        content: &str,
        heading: Option<&str>,
        agent_id: Option<&str>,
    ) -> Result<CanvasDocument> {
        self.patch_section_at(slug, section_id, content, heading, agent_id, Utc::now())
    }

    /// Replace one section's body and re-render the document.
    ///
    /// A section freshly locked by a different agent rejects the patch unless
    /// lock enforcement is turned off, in which case the conflict is only logged.
    pub fn patch_section_at(
        &self,
        slug: &str,
        section_id: &str,
        content: &str,
        heading: Option<&str>,
        agent_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CanvasDocument> {
        let stale_before = self.stale_before(now);
        let heading = heading.map(str::trim).filter(|h| !h.is_empty());
        if heading.is_some_and(|h| h.contains(['\n', '\r'])) {
            return Err(PlaybookError::Validation(
                "heading must be a single line".into(),
            ));
        }

        let guard = if self.config.enforce_locks {
            Some(LockGuard {
                agent_id: agent_id.map(String::from),
                stale_before,
            })
        } else {
            self.warn_on_foreign_lock(slug, section_id, agent_id, stale_before)?;
            None
        };

        let doc = self.db.patch_canvas_section(
            &self.playbook_id,
            slug,
            section_id,
            content.trim(),
            heading,
            guard.as_ref(),
            render,
            now,
        )?;
        debug!(playbook = %self.playbook_id, slug, section_id, agent = ?agent_id, "canvas section patched");
        Ok(doc)
    }

    fn warn_on_foreign_lock(
        &self,
        slug: &str,
        section_id: &str,
        agent_id: Option<&str>,
        stale_before: DateTime<Utc>,
    ) -> Result<()> {
        let doc = self.read(slug)?;
        let held = doc.sections.iter().find(|s| s.id == section_id).and_then(|s| {
            match (&s.locked_by, s.locked_at) {
                (Some(holder), Some(at)) if at >= stale_before && Some(holder.as_str()) != agent_id => {
                    Some(holder.clone())
                }
                _ => None,
            }
        });
        if let Some(holder) = held {
            warn!(slug, section_id, holder = %holder, agent = ?agent_id, "patching a section locked by another agent");
        }
        Ok(())
    }

    pub fn toc(&self, slug: &str) -> Result<Vec<TocEntry>> {
        let doc = self.read(slug)?;
        Ok(doc
            .sections
            .into_iter()
            .map(|s| TocEntry {
                id: s.id,
                heading: s.heading,
                level: s.level,
                locked_by: s.locked_by,
            })
            .collect())
    }

    pub fn lock(&self, slug: &str, section_id: &str, agent_id: &str) -> Result<CanvasSection> {
        self.lock_at(slug, section_id, agent_id, Utc::now())
    }

    /// Take or refresh a section lock. Succeeds when the section is unlocked,
    /// already held by `agent_id`, or held by a lock older than the TTL.
    pub fn lock_at(
        &self,
        slug: &str,
        section_id: &str,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CanvasSection> {
        if agent_id.trim().is_empty() {
            return Err(PlaybookError::Validation("locked_by must not be empty".into()));
        }
        let section = self.db.lock_canvas_section(
            &self.playbook_id,
            slug,
            section_id,
            agent_id,
            now,
            self.stale_before(now),
        )?;
        debug!(playbook = %self.playbook_id, slug, section_id, agent = agent_id, "canvas section locked");
        Ok(section)
    }

    /// Clear a lock regardless of who holds it. Returns the previous holder.
    pub fn unlock(&self, slug: &str, section_id: &str) -> Result<Option<String>> {
        let previous = self
            .db
            .unlock_canvas_section(&self.playbook_id, slug, section_id)?;
        debug!(playbook = %self.playbook_id, slug, section_id, previous = ?previous, "canvas section unlocked");
        Ok(previous)
    }
}
