use serde::Deserialize;
use serde_json::{Value, json};

use playbook_core::{MemoryType, Result, TaskStatus, Tier};
use playbook_memory::{
    ArchiveRequest, ConsolidateRequest, ContextRequest, SearchQuery, TaskGraphRequest,
};
use playbook_store::MemoryWrite;

use crate::registry::{ToolEnv, parse_args};

#[derive(Deserialize)]
struct KeyArgs {
    key: String,
}

#[derive(Deserialize)]
struct WriteArgs {
    key: String,
    value: Value,
    tags: Option<Vec<String>>,
    description: Option<String>,
    tier: Option<Tier>,
    priority: Option<i64>,
    parent_key: Option<String>,
    summary: Option<String>,
    memory_type: Option<MemoryType>,
    status: Option<TaskStatus>,
    metadata: Option<Value>,
    retention_policy: Option<String>,
}

#[derive(Deserialize)]
struct TreeArgs {
    root_key: Option<String>,
    max_depth: Option<usize>,
    #[serde(default)]
    include_values: bool,
}

#[derive(Deserialize)]
struct PromoteArgs {
    key: String,
    target_tier: Option<Tier>,
    priority_boost: Option<i64>,
}

#[derive(Deserialize)]
struct TaskStatusArgs {
    key: String,
    status: TaskStatus,
    result: Option<Value>,
    summary: Option<String>,
}

pub fn read_memory(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: KeyArgs = parse_args(args)?;
    Ok(json!(env.memory().read(&args.key)?))
}

pub fn search_memory(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let query: SearchQuery = parse_args(args)?;
    let results = env.memory().search(&query)?;
    Ok(json!({ "count": results.len(), "memories": results }))
}

pub fn get_memory_context(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let req: ContextRequest = parse_args(args)?;
    Ok(env.memory().context_view(&req)?.to_json())
}

pub fn get_memory_tree(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: TreeArgs = parse_args(args)?;
    let tree = env
        .memory()
        .tree(args.root_key.as_deref(), args.max_depth, args.include_values)?;
    Ok(json!({ "tree": tree }))
}

pub fn write_memory(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: WriteArgs = parse_args(args)?;
    let outcome = env.memory().write(
        &args.key,
        MemoryWrite {
            value: Some(args.value),
            tags: args.tags,
            description: args.description,
            tier: args.tier,
            priority: args.priority,
            parent_key: args.parent_key,
            summary: args.summary,
            memory_type: args.memory_type,
            status: args.status,
            metadata: args.metadata,
            retention_policy: args.retention_policy,
        },
    )?;
    Ok(json!({
        "action": if outcome.created { "created" } else { "updated" },
        "memory": outcome.memory,
    }))
}

pub fn delete_memory(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: KeyArgs = parse_args(args)?;
    env.memory().delete(&args.key)?;
    Ok(json!({ "deleted": args.key }))
}

pub fn consolidate_memories(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let req: ConsolidateRequest = parse_args(args)?;
    Ok(json!(env.memory().consolidate(&req)?))
}

pub fn promote_memory(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: PromoteArgs = parse_args(args)?;
    let outcome = env
        .memory()
        .promote(&args.key, args.target_tier, args.priority_boost)?;
    Ok(json!(outcome))
}

pub fn archive_memories(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let req: ArchiveRequest = parse_args(args)?;
    let archived = env.memory().archive(&req)?;
    Ok(json!({ "archived_count": archived.len(), "archived_keys": archived }))
}

pub fn create_task_graph(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let req: TaskGraphRequest = parse_args(args)?;
    Ok(json!(env.memory().create_task_graph(&req)?))
}

pub fn update_task_status(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: TaskStatusArgs = parse_args(args)?;
    let outcome = env.memory().update_task_status(
        &args.key,
        args.status,
        args.result.as_ref(),
        args.summary.as_deref(),
    )?;
    Ok(json!(outcome))
}

pub mod schemas {
    use serde_json::{Value, json};

    fn tier() -> Value {
        json!({ "type": "string", "enum": ["working", "contextual", "longterm"] })
    }

    fn status() -> Value {
        json!({ "type": "string", "enum": ["pending", "running", "completed", "failed", "blocked"] })
    }

    fn tags(description: &str) -> Value {
        json!({ "type": "array", "items": { "type": "string" }, "description": description })
    }

    pub fn read_memory() -> Value {
        json!({
            "type": "object",
            "properties": { "key": { "type": "string", "description": "Memory key" } },
            "required": ["key"]
        })
    }

    pub fn search_memory() -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Case-insensitive text matched against key, description, and summary" },
                "tags": tags("Match memories carrying any of these tags"),
                "tier": tier(),
                "memory_type": { "type": "string", "enum": ["flat", "hierarchical"] },
                "status": status(),
                "include_children": { "type": "boolean", "description": "false returns top-level memories only (default true)" },
                "limit": { "type": "integer", "minimum": 1, "description": "Maximum results (default 50)" }
            }
        })
    }

    pub fn get_memory_context() -> Value {
        json!({
            "type": "object",
            "properties": {
                "include_tiers": { "type": "array", "items": tier(), "description": "Default: working and contextual" },
                "max_items": { "type": "integer", "minimum": 0, "description": "Per tier (default 20)" },
                "expand_keys": tags("Keys to return with full values regardless of tier"),
                "tags_filter": tags("Only memories carrying any of these tags")
            }
        })
    }

    pub fn get_memory_tree() -> Value {
        json!({
            "type": "object",
            "properties": {
                "root_key": { "type": "string", "description": "Omit to start from every top-level memory" },
                "max_depth": { "type": "integer", "minimum": 0, "description": "Default 3, capped by the server limit" },
                "include_values": { "type": "boolean", "description": "Include full values (default false)" }
            }
        })
    }

    pub fn write_memory() -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": { "type": "string" },
                "value": { "description": "Any JSON value" },
                "tags": tags("Replaces the stored tags"),
                "description": { "type": "string" },
                "tier": tier(),
                "priority": { "type": "integer", "minimum": 1, "maximum": 100, "description": "Clamped to 1-100 (default 50)" },
                "parent_key": { "type": "string", "description": "Key of the parent memory" },
                "summary": { "type": "string" },
                "memory_type": { "type": "string", "enum": ["flat", "hierarchical"] },
                "status": status(),
                "metadata": { "type": "object" },
                "retention_policy": { "type": "string", "description": "\"permanent\" exempts the memory from archival" }
            },
            "required": ["key", "value"]
        })
    }

    pub fn delete_memory() -> Value {
        read_memory()
    }

    pub fn consolidate_memories() -> Value {
        json!({
            "type": "object",
            "properties": {
                "memory_keys": tags("Keys of the memories to consolidate"),
                "parent_key": { "type": "string", "description": "Key of the new parent memory" },
                "summary": { "type": "string" },
                "parent_tags": tags("Extra tags for the parent; children's tags are added"),
                "archive_children": { "type": "boolean", "description": "Move children to longterm (default true)" }
            },
            "required": ["memory_keys", "parent_key", "summary"]
        })
    }

    pub fn promote_memory() -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": { "type": "string" },
                "target_tier": tier(),
                "priority_boost": { "type": "integer", "minimum": 0, "maximum": 50, "description": "Default 10" }
            },
            "required": ["key"]
        })
    }

    pub fn archive_memories() -> Value {
        json!({
            "type": "object",
            "properties": {
                "keys": tags("Only these keys"),
                "older_than_hours": { "type": "integer", "minimum": 0, "description": "Only memories not updated for this many hours" },
                "from_tier": tier(),
                "tags": tags("Only memories carrying any of these tags")
            }
        })
    }

    pub fn create_task_graph() -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan_key": { "type": "string" },
                "plan_summary": { "type": "string" },
                "tasks": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "key": { "type": "string", "description": "Stored as <plan_key>/<key>" },
                            "description": { "type": "string" },
                            "priority": { "type": "integer", "minimum": 1, "maximum": 100 },
                            "depends_on": tags("Keys of sibling tasks")
                        },
                        "required": ["key"]
                    }
                },
                "tags": tags("Applied to the plan and every task")
            },
            "required": ["plan_key", "plan_summary", "tasks"]
        })
    }

    pub fn update_task_status() -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": { "type": "string", "description": "Full task key, e.g. plan/task" },
                "status": status(),
                "result": { "description": "Stored as value.result" },
                "summary": { "type": "string" }
            },
            "required": ["key", "status"]
        })
    }
}
