use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use playbook_config::MemoryConfig;
use playbook_core::memory::clamp_priority;
use playbook_core::{Memory, MemoryType, PlaybookError, Result, TaskStatus, Tier};
use playbook_store::{ArchiveFilter, Database, MemoryFilter, MemoryWrite};

/// Priority given to a consolidation parent.
pub const CONSOLIDATED_PRIORITY: i64 = 75;
/// Default and maximum boost applied by `promote`.
pub const DEFAULT_PROMOTION_BOOST: i64 = 10;
pub const MAX_PROMOTION_BOOST: i64 = 50;

/// Memory operations scoped to one playbook.
#[derive(Clone)]
pub struct MemoryEngine {
    pub(crate) db: Database,
    pub(crate) playbook_id: String,
    pub(crate) config: MemoryConfig,
}

// ── Request and outcome types ──────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub tags: Option<Vec<String>>,
    pub tier: Option<Tier>,
    pub memory_type: Option<MemoryType>,
    pub status: Option<TaskStatus>,
    /// `false` restricts results to top-level memories.
    pub include_children: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    pub created: bool,
    pub memory: Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsolidateRequest {
    pub memory_keys: Vec<String>,
    pub parent_key: String,
    pub summary: String,
    #[serde(default)]
    pub parent_tags: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub archive_children: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsolidateOutcome {
    pub parent: Memory,
    pub consolidated: Vec<String>,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromoteOutcome {
    pub previous_tier: Tier,
    pub previous_priority: i64,
    pub memory: Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContextRequest {
    pub include_tiers: Option<Vec<Tier>>,
    pub max_items: Option<usize>,
    pub expand_keys: Vec<String>,
    pub tags_filter: Option<Vec<String>>,
}

/// One memory as presented in the context view.
#[derive(Debug, Clone, Serialize)]
pub struct ContextItem {
    pub key: String,
    pub tier: Tier,
    pub priority: i64,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextView {
    pub tiers: Vec<(Tier, Vec<ContextItem>)>,
}

impl ContextView {
    pub fn total_items(&self) -> usize {
        self.tiers.iter().map(|(_, items)| items.len()).sum()
    }

    /// `{ "<tier>": [...], ..., "total_items": n }`
    pub fn to_json(&self) -> Value {
        let mut out = serde_json::Map::new();
        for (tier, items) in &self.tiers {
            out.insert(tier.as_str().to_string(), json!(items));
        }
        out.insert("total_items".into(), json!(self.total_items()));
        Value::Object(out)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArchiveRequest {
    pub keys: Option<Vec<String>>,
    pub older_than_hours: Option<u64>,
    pub from_tier: Option<Tier>,
    pub tags: Option<Vec<String>>,
}

// ── Engine ─────────────────────────────────────────────────────

impl MemoryEngine {
    pub fn new(db: Database, playbook_id: impl Into<String>, config: MemoryConfig) -> Self {
        Self {
            db,
            playbook_id: playbook_id.into(),
            config,
        }
    }

    pub fn playbook_id(&self) -> &str {
        &self.playbook_id
    }

    /// Exact-key fetch. Counts as an access.
    pub fn read(&self, key: &str) -> Result<Memory> {
        self.db
            .touch_memory(&self.playbook_id, key, Utc::now())?
            .ok_or_else(|| PlaybookError::not_found("Memory", key))
    }

    /// Filtered search, priority desc then most recent.
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<Memory>> {
        let filter = MemoryFilter {
            query: query.query.clone(),
            tags: query.tags.clone(),
            tier: query.tier,
            memory_type: query.memory_type,
            status: query.status,
            roots_only: !query.include_children.unwrap_or(true),
            limit: Some(query.limit.unwrap_or(self.config.search_limit)),
            ..Default::default()
        };
        self.db.search_memories(&self.playbook_id, &filter)
    }

    /// Listing used by the `memory` resource.
    pub fn list(&self, tier: Option<Tier>, limit: usize) -> Result<Vec<Memory>> {
        let filter = MemoryFilter {
            tier,
            limit: Some(limit),
            ..Default::default()
        };
        self.db.search_memories(&self.playbook_id, &filter)
    }

    /// Upsert with partial-update semantics. Priority is clamped to 1-100.
    pub fn write(&self, key: &str, mut write: MemoryWrite) -> Result<WriteOutcome> {
        validate_key(key)?;
        write.priority = write.priority.map(clamp_priority);
        if let Some(parent) = &write.parent_key {
            self.check_parent_link(key, parent)?;
        }

        let created = self.db.get_memory(&self.playbook_id, key)?.is_none();
        let memory = self
            .db
            .upsert_memory(&self.playbook_id, key, &write, Utc::now())?;
        debug!(playbook = %self.playbook_id, key, created, tier = %memory.tier, "memory written");
        Ok(WriteOutcome { created, memory })
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        if self.db.delete_memory(&self.playbook_id, key)? {
            debug!(playbook = %self.playbook_id, key, "memory deleted");
            Ok(())
        } else {
            Err(PlaybookError::not_found("Memory", key))
        }
    }

    /// Group existing memories under a new contextual parent.
    pub fn consolidate(&self, req: &ConsolidateRequest) -> Result<ConsolidateOutcome> {
        validate_key(&req.parent_key)?;
        if req.memory_keys.is_empty() {
            return Err(PlaybookError::Validation(
                "memory_keys must name at least one memory".into(),
            ));
        }
        if req.memory_keys.contains(&req.parent_key) {
            return Err(PlaybookError::Validation(format!(
                "parent_key '{}' is also listed as a child",
                req.parent_key
            )));
        }

        let existing = self
            .db
            .existing_memory_keys(&self.playbook_id, &req.memory_keys)?;
        if existing.is_empty() {
            return Err(PlaybookError::not_found("Memory", req.memory_keys.join(", ")));
        }
        let missing: Vec<String> = req
            .memory_keys
            .iter()
            .filter(|k| !existing.contains(k))
            .cloned()
            .collect();
        for child in &existing {
            self.check_parent_link(child, &req.parent_key)?;
        }

        let children = self.db.search_memories(
            &self.playbook_id,
            &MemoryFilter {
                keys: Some(existing.clone()),
                ..Default::default()
            },
        )?;
        let mut tags: Vec<String> = req.parent_tags.clone().unwrap_or_default();
        let child_tags = existing
            .iter()
            .filter_map(|key| children.iter().find(|c| &c.key == key))
            .flat_map(|c| c.tags.iter());
        for tag in child_tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }

        let now = Utc::now();
        let parent = self.db.upsert_memory(
            &self.playbook_id,
            &req.parent_key,
            &MemoryWrite {
                value: Some(json!({
                    "type": "consolidated",
                    "child_count": existing.len(),
                    "child_keys": existing,
                    "summary": req.summary,
                })),
                tags: Some(tags),
                tier: Some(Tier::Contextual),
                priority: Some(CONSOLIDATED_PRIORITY),
                summary: Some(req.summary.clone()),
                ..Default::default()
            },
            now,
        )?;
        let demote_to = req.archive_children.then_some(Tier::Longterm);
        self.db
            .reparent_memories(&self.playbook_id, &existing, &req.parent_key, demote_to, now)?;

        info!(
            playbook = %self.playbook_id,
            parent = %req.parent_key,
            children = existing.len(),
            missing = missing.len(),
            "memories consolidated"
        );
        Ok(ConsolidateOutcome {
            parent,
            consolidated: existing,
            missing,
        })
    }

    /// Boost priority and optionally raise the tier. Never lowers the tier.
    pub fn promote(
        &self,
        key: &str,
        target_tier: Option<Tier>,
        priority_boost: Option<i64>,
    ) -> Result<PromoteOutcome> {
        let boost = priority_boost
            .unwrap_or(DEFAULT_PROMOTION_BOOST)
            .clamp(0, MAX_PROMOTION_BOOST);
        let before = self
            .db
            .get_memory(&self.playbook_id, key)?
            .ok_or_else(|| PlaybookError::not_found("Memory", key))?;
        let memory = self
            .db
            .promote_memory(&self.playbook_id, key, boost, target_tier, Utc::now())?
            .ok_or_else(|| PlaybookError::not_found("Memory", key))?;

        if let Some(target) = target_tier
            && memory.tier != target
        {
            debug!(key, current = %memory.tier, requested = %target, "promotion target below current tier, kept");
        }
        Ok(PromoteOutcome {
            previous_tier: before.tier,
            previous_priority: before.priority,
            memory,
        })
    }

    /// Per-tier snapshot for an agent's context window.
    pub fn context_view(&self, req: &ContextRequest) -> Result<ContextView> {
        let tiers = req
            .include_tiers
            .clone()
            .unwrap_or_else(|| vec![Tier::Working, Tier::Contextual]);
        let max_items = req.max_items.unwrap_or(self.config.context_max_items);

        let mut view = Vec::with_capacity(tiers.len());
        for tier in tiers {
            let memories = self.db.search_memories(
                &self.playbook_id,
                &MemoryFilter {
                    tier: Some(tier),
                    tags: req.tags_filter.clone(),
                    limit: Some(max_items),
                    ..Default::default()
                },
            )?;
            let items = memories
                .into_iter()
                .map(|m| {
                    let expand = m.tier == Tier::Working || req.expand_keys.contains(&m.key);
                    ContextItem {
                        summary: (!expand).then(|| m.summary_or_key()),
                        value: expand.then(|| m.value.clone()),
                        key: m.key,
                        tier: m.tier,
                        priority: m.priority,
                        tags: m.tags,
                    }
                })
                .collect();
            view.push((tier, items));
        }
        Ok(ContextView { tiers: view })
    }

    /// Move matching memories to longterm. Permanent and already-longterm
    /// memories are never selected.
    pub fn archive(&self, req: &ArchiveRequest) -> Result<Vec<String>> {
        let now = Utc::now();
        let filter = ArchiveFilter {
            keys: req.keys.clone(),
            updated_before: req
                .older_than_hours
                .map(|h| hours_before(now, h)),
            from_tier: req.from_tier,
            tags: req.tags.clone(),
        };
        let archived = self.db.archive_memories(&self.playbook_id, &filter, now)?;
        info!(playbook = %self.playbook_id, count = archived.len(), "memories archived");
        Ok(archived)
    }

    /// Reject a `parent_key` that is the key itself or descends from it.
    pub(crate) fn check_parent_link(&self, key: &str, parent: &str) -> Result<()> {
        if !self.config.validate_parent_links {
            return Ok(());
        }
        if parent == key {
            return Err(PlaybookError::Validation(format!(
                "memory '{key}' cannot be its own parent"
            )));
        }
        let ancestors = self
            .db
            .memory_ancestors(&self.playbook_id, parent)?;
        if ancestors.iter().any(|a| a == key) {
            return Err(PlaybookError::Validation(format!(
                "parent_key '{parent}' would create a cycle: '{parent}' already descends from '{key}'"
            )));
        }
        Ok(())
    }
}

/// `now` minus `hours`, saturating at the earliest representable instant.
fn hours_before(now: DateTime<Utc>, hours: u64) -> DateTime<Utc> {
    i64::try_from(hours)
        .ok()
        .and_then(TimeDelta::try_hours)
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(PlaybookError::Validation("key must not be empty".into()));
    }
    Ok(())
}
