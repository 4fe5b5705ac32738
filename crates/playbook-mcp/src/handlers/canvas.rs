use serde::Deserialize;
use serde_json::{Value, json};

use playbook_core::Result;

use crate::registry::{ToolEnv, parse_args};

#[derive(Deserialize)]
struct SlugArgs {
    slug: String,
}

#[derive(Deserialize)]
struct WriteArgs {
    slug: String,
    name: Option<String>,
    content: String,
    metadata: Option<Value>,
    sort_order: Option<i64>,
}

#[derive(Deserialize)]
struct PatchArgs {
    slug: String,
    section_id: String,
    content: String,
    heading: Option<String>,
    agent_id: Option<String>,
}

#[derive(Deserialize)]
struct LockArgs {
    slug: String,
    section_id: String,
    locked_by: String,
}

#[derive(Deserialize)]
struct UnlockArgs {
    slug: String,
    section_id: String,
}

pub fn list_canvas(env: &ToolEnv<'_>, _args: Value) -> Result<Value> {
    let documents = env.canvas().list()?;
    Ok(json!({ "count": documents.len(), "documents": documents }))
}

pub fn read_canvas(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: SlugArgs = parse_args(args)?;
    Ok(json!(env.canvas().read(&args.slug)?))
}

pub fn get_canvas_toc(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: SlugArgs = parse_args(args)?;
    let sections = env.canvas().toc(&args.slug)?;
    Ok(json!({ "slug": args.slug, "sections": sections }))
}

pub fn write_canvas(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: WriteArgs = parse_args(args)?;
    let doc = env.canvas().write(
        &args.slug,
        args.name.as_deref(),
        &args.content,
        args.metadata.as_ref(),
        args.sort_order,
    )?;
    Ok(json!(doc))
}

pub fn patch_canvas_section(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: PatchArgs = parse_args(args)?;
    let doc = env.canvas().patch_section(
        &args.slug,
        &args.section_id,
        &args.content,
        args.heading.as_deref(),
        args.agent_id.as_deref(),
    )?;
    let section = doc.sections.iter().find(|s| s.id == args.section_id).cloned();
    Ok(json!({ "slug": doc.slug, "section": section, "content": doc.content }))
}

pub fn lock_canvas_section(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: LockArgs = parse_args(args)?;
    let section = env
        .canvas()
        .lock(&args.slug, &args.section_id, &args.locked_by)?;
    Ok(json!({
        "slug": args.slug,
        "section_id": section.id,
        "locked_by": section.locked_by,
        "locked_at": section.locked_at,
    }))
}

pub fn unlock_canvas_section(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: UnlockArgs = parse_args(args)?;
    let previous = env.canvas().unlock(&args.slug, &args.section_id)?;
    Ok(json!({
        "slug": args.slug,
        "section_id": args.section_id,
        "previously_locked_by": previous,
    }))
}

pub mod schemas {
    use serde_json::{Value, json};

    fn slug() -> Value {
        json!({ "type": "string", "description": "Document slug: letters, digits, '-', '_', '.'" })
    }

    fn section_id() -> Value {
        json!({ "type": "string", "description": "Section id from get_canvas_toc, e.g. s2" })
    }

    pub fn list_canvas() -> Value {
        json!({ "type": "object", "properties": {} })
    }

    pub fn read_canvas() -> Value {
        json!({
            "type": "object",
            "properties": { "slug": slug() },
            "required": ["slug"]
        })
    }

    pub fn get_canvas_toc() -> Value {
        read_canvas()
    }

    pub fn write_canvas() -> Value {
        json!({
            "type": "object",
            "properties": {
                "slug": slug(),
                "name": { "type": "string", "description": "Display name (defaults to the slug)" },
                "content": { "type": "string", "description": "Full markdown; headings delimit sections" },
                "metadata": { "type": "object" },
                "sort_order": { "type": "integer" }
            },
            "required": ["slug", "content"]
        })
    }

    pub fn patch_canvas_section() -> Value {
        json!({
            "type": "object",
            "properties": {
                "slug": slug(),
                "section_id": section_id(),
                "content": { "type": "string", "description": "New section body, without the heading line" },
                "heading": { "type": "string", "description": "Optional new heading text" },
                "agent_id": { "type": "string", "description": "Your agent id; required to patch a section you locked" }
            },
            "required": ["slug", "section_id", "content"]
        })
    }

    pub fn lock_canvas_section() -> Value {
        json!({
            "type": "object",
            "properties": {
                "slug": slug(),
                "section_id": section_id(),
                "locked_by": { "type": "string", "description": "Your agent id" }
            },
            "required": ["slug", "section_id", "locked_by"]
        })
    }

    pub fn unlock_canvas_section() -> Value {
        json!({
            "type": "object",
            "properties": { "slug": slug(), "section_id": section_id() },
            "required": ["slug", "section_id"]
        })
    }
}
