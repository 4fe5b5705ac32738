use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use playbook_core::{PlaybookError, Result, Skill, Visibility};
use playbook_store::{PlaybookUpdate, SkillDraft, SkillUpdate};

use crate::registry::{ToolEnv, parse_args};

#[derive(Deserialize)]
struct SkillRef {
    skill_id: String,
}

#[derive(Deserialize)]
struct CreateArgs {
    name: String,
    description: Option<String>,
    content: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct UpdateArgs {
    skill_id: String,
    name: Option<String>,
    description: Option<String>,
    content: Option<String>,
    tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct PersonaArgs {
    name: Option<String>,
    description: Option<String>,
    system_prompt: Option<String>,
}

#[derive(Deserialize)]
struct PlaybookArgs {
    name: Option<String>,
    description: Option<String>,
    guide: Option<String>,
    visibility: Option<Visibility>,
    persona: Option<PersonaArgs>,
}

fn find_skill(env: &ToolEnv<'_>, id_or_name: &str) -> Result<Skill> {
    env.db
        .get_skill(&env.playbook.id, id_or_name)?
        .ok_or_else(|| PlaybookError::not_found("Skill", id_or_name))
}

pub fn list_skills(env: &ToolEnv<'_>, _args: Value) -> Result<Value> {
    let prefix = &env.config.mcp.skill_tool_prefix;
    let skills: Vec<Value> = env
        .db
        .list_skills(&env.playbook.id)?
        .into_iter()
        .map(|s| {
            json!({
                "id": s.id,
                "name": s.name,
                "description": s.description,
                "tags": s.tags,
                "tool_name": format!("{prefix}{}", s.slug()),
                "attachments": s.attachments,
            })
        })
        .collect();
    Ok(json!({ "count": skills.len(), "skills": skills }))
}

pub fn get_skill(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: SkillRef = parse_args(args)?;
    Ok(json!(find_skill(env, &args.skill_id)?))
}

pub fn create_skill(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: CreateArgs = parse_args(args)?;
    if args.name.trim().is_empty() {
        return Err(PlaybookError::Validation("skill name must not be empty".into()));
    }
    check_skill_name(env, &args.name, None)?;
    let skill = env.db.create_skill(
        &env.playbook.id,
        &SkillDraft {
            name: args.name.trim().to_string(),
            description: args.description,
            content: args.content,
            tags: args.tags,
        },
        Utc::now(),
    )?;
    info!(playbook = %env.playbook.id, skill = %skill.name, "skill created");
    Ok(json!(skill))
}

pub fn update_skill(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: UpdateArgs = parse_args(args)?;
    let existing = find_skill(env, &args.skill_id)?;
    let name = args.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    if let Some(name) = &name {
        check_skill_name(env, name, Some(&existing.id))?;
    }
    let skill = env.db.update_skill(
        &env.playbook.id,
        &existing.id,
        &SkillUpdate {
            name,
            description: args.description,
            content: args.content,
            tags: args.tags,
        },
        Utc::now(),
    )?;
    Ok(json!(skill))
}

/// Each skill becomes one tool, so its slug must be non-empty and unique in the playbook.
fn check_skill_name(env: &ToolEnv<'_>, name: &str, except_id: Option<&str>) -> Result<()> {
    let slug = Skill::slug_of(name);
    if slug.is_empty() {
        return Err(PlaybookError::Validation(format!(
            "skill name '{name}' needs at least one ASCII letter or digit"
        )));
    }
    let clash = env
        .db
        .list_skills(&env.playbook.id)?
        .into_iter()
        .find(|s| Some(s.id.as_str()) != except_id && s.slug() == slug);
    if let Some(other) = clash {
        return Err(PlaybookError::Validation(format!(
            "skill name '{name}' maps to tool slug '{slug}', already used by '{}'",
            other.name
        )));
    }
    Ok(())
}

pub fn delete_skill(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: SkillRef = parse_args(args)?;
    let existing = find_skill(env, &args.skill_id)?;
    env.db.delete_skill(&env.playbook.id, &existing.id)?;
    info!(playbook = %env.playbook.id, skill = %existing.name, "skill deleted");
    Ok(json!({ "deleted": existing.id, "name": existing.name }))
}

pub fn update_playbook(env: &ToolEnv<'_>, args: Value) -> Result<Value> {
    let args: PlaybookArgs = parse_args(args)?;
    let now = Utc::now();
    let playbook = env.db.update_playbook(
        &env.playbook.id,
        &PlaybookUpdate {
            name: args.name,
            description: args.description,
            guide: args.guide,
            visibility: args.visibility,
        },
        now,
    )?;
    let persona = match args.persona {
        Some(p) => Some(env.db.upsert_primary_persona(
            &env.playbook.id,
            p.name.as_deref(),
            p.description.as_deref(),
            p.system_prompt.as_deref(),
            now,
        )?),
        None => env.db.primary_persona(&env.playbook.id)?,
    };
    Ok(json!({ "playbook": playbook, "persona": persona }))
}

pub mod schemas {
    use serde_json::{Value, json};

    fn skill_ref() -> Value {
        json!({ "type": "string", "description": "Skill id or exact name" })
    }

    fn tags() -> Value {
        json!({ "type": "array", "items": { "type": "string" } })
    }

    pub fn list_skills() -> Value {
        json!({ "type": "object", "properties": {} })
    }

    pub fn get_skill() -> Value {
        json!({
            "type": "object",
            "properties": { "skill_id": skill_ref() },
            "required": ["skill_id"]
        })
    }

    pub fn create_skill() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "description": { "type": "string" },
                "content": { "type": "string", "description": "Markdown instructions" },
                "tags": tags()
            },
            "required": ["name", "content"]
        })
    }

    pub fn update_skill() -> Value {
        json!({
            "type": "object",
            "properties": {
                "skill_id": skill_ref(),
                "name": { "type": "string" },
                "description": { "type": "string" },
                "content": { "type": "string" },
                "tags": tags()
            },
            "required": ["skill_id"]
        })
    }

    pub fn delete_skill() -> Value {
        get_skill()
    }

    pub fn update_playbook() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "description": { "type": "string" },
                "guide": { "type": "string", "description": "Markdown usage guide" },
                "visibility": { "type": "string", "enum": ["public", "private"] },
                "persona": {
                    "type": "object",
                    "description": "Primary persona; created when the playbook has none (name then required)",
                    "properties": {
                        "name": { "type": "string" },
                        "description": { "type": "string" },
                        "system_prompt": { "type": "string" }
                    }
                }
            }
        })
    }
}
