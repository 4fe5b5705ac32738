//! The static table of built-in tools.

use serde::de::DeserializeOwned;
use serde_json::Value;

use playbook_canvas::CanvasEngine;
use playbook_config::PlaybookConfig;
use playbook_core::{Permission, Playbook, PlaybookError, Result, Tool};
use playbook_memory::MemoryEngine;
use playbook_store::Database;

use crate::handlers::{canvas, memory, skills};

/// Everything a built-in handler may touch for one call.
pub struct ToolEnv<'a> {
    pub db: &'a Database,
    pub playbook: &'a Playbook,
    pub config: &'a PlaybookConfig,
}

impl ToolEnv<'_> {
    pub fn memory(&self) -> MemoryEngine {
        MemoryEngine::new(self.db.clone(), &self.playbook.id, self.config.memory.clone())
    }

    pub fn canvas(&self) -> CanvasEngine {
        CanvasEngine::new(self.db.clone(), &self.playbook.id, self.config.canvas.clone())
    }
}

pub type Handler = fn(&ToolEnv<'_>, Value) -> Result<Value>;

/// One row of the built-in tool table.
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Scope the caller's credential must carry; `None` for read-only tools.
    pub permission: Option<Permission>,
    pub schema: fn() -> Value,
    pub handler: Handler,
}

impl ToolSpec {
    pub fn descriptor(&self) -> Tool {
        Tool {
            name: self.name.to_string(),
            description: self.description.to_string(),
            input_schema: (self.schema)(),
        }
    }
}

/// Deserialize tool arguments; a missing arguments object reads as `{}`.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| PlaybookError::Validation(e.to_string()))
}

macro_rules! tool {
    ($name:literal, $perm:expr, $module:ident :: $func:ident, $desc:literal) => {
        ToolSpec {
            name: $name,
            description: $desc,
            permission: $perm,
            schema: $module::schemas::$func,
            handler: $module::$func,
        }
    };
}

const WRITE_MEMORY: Option<Permission> = Some(Permission::MemoryWrite);
const WRITE_SKILLS: Option<Permission> = Some(Permission::SkillsWrite);
const WRITE_PLAYBOOK: Option<Permission> = Some(Permission::PlaybookWrite);

pub static BUILTIN_TOOLS: &[ToolSpec] = &[
    // ── Memory ─────────────────────────────────────────────────
    tool!("read_memory", None, memory::read_memory,
        "Read one memory by key. Counts as an access."),
    tool!("search_memory", None, memory::search_memory,
        "Search memories by text, tags, tier, type, or status. Highest priority first."),
    tool!("get_memory_context", None, memory::get_memory_context,
        "Per-tier snapshot for your context: working memories in full, others as summaries."),
    tool!("get_memory_tree", None, memory::get_memory_tree,
        "Hierarchical view of memories from a root key, or of every top-level memory."),
    tool!("write_memory", WRITE_MEMORY, memory::write_memory,
        "Create or update a memory. Omitted optional fields keep their stored values."),
    tool!("delete_memory", WRITE_MEMORY, memory::delete_memory,
        "Permanently delete a memory."),
    tool!("consolidate_memories", WRITE_MEMORY, memory::consolidate_memories,
        "Group memories under a new contextual parent with a summary, optionally archiving them."),
    tool!("promote_memory", WRITE_MEMORY, memory::promote_memory,
        "Boost a memory's priority and optionally raise its tier. Never lowers the tier."),
    tool!("archive_memories", WRITE_MEMORY, memory::archive_memories,
        "Move matching memories to the longterm tier. Permanent memories are skipped."),
    tool!("create_task_graph", WRITE_MEMORY, memory::create_task_graph,
        "Create a plan memory with one child task memory per task."),
    tool!("update_task_status", WRITE_MEMORY, memory::update_task_status,
        "Set a task's status and result. Completing the last task completes the plan."),
    // ── Canvas ─────────────────────────────────────────────────
    tool!("list_canvas", None, canvas::list_canvas,
        "List canvas documents with their section counts."),
    tool!("read_canvas", None, canvas::read_canvas,
        "Read a canvas document with all of its sections."),
    tool!("get_canvas_toc", None, canvas::get_canvas_toc,
        "Table of contents of a canvas document: section ids, headings, levels, and lock holders."),
    tool!("write_canvas", WRITE_MEMORY, canvas::write_canvas,
        "Create or replace a canvas document from markdown. Section ids are reassigned."),
    tool!("patch_canvas_section", WRITE_MEMORY, canvas::patch_canvas_section,
        "Replace the content of one section. Rejected while another agent holds a fresh lock."),
    tool!("lock_canvas_section", WRITE_MEMORY, canvas::lock_canvas_section,
        "Take a soft lock on a section. Locks expire after the configured TTL."),
    tool!("unlock_canvas_section", WRITE_MEMORY, canvas::unlock_canvas_section,
        "Release a section lock."),
    // ── Skills and playbook ────────────────────────────────────
    tool!("list_skills", None, skills::list_skills,
        "List this playbook's skills."),
    tool!("get_skill", None, skills::get_skill,
        "Read a skill's full instructions by id or name."),
    tool!("create_skill", WRITE_SKILLS, skills::create_skill,
        "Add a skill to this playbook."),
    tool!("update_skill", WRITE_SKILLS, skills::update_skill,
        "Update a skill's name, description, instructions, or tags."),
    tool!("delete_skill", WRITE_SKILLS, skills::delete_skill,
        "Delete a skill and its attachments."),
    tool!("update_playbook", WRITE_PLAYBOOK, skills::update_playbook,
        "Update this playbook's name, description, guide, or primary persona."),
];

pub fn find(name: &str) -> Option<&'static ToolSpec> {
    BUILTIN_TOOLS.iter().find(|t| t.name == name)
}

/// Descriptors of every built-in tool, in table order.
pub fn catalog() -> Vec<Tool> {
    BUILTIN_TOOLS.iter().map(ToolSpec::descriptor).collect()
}
