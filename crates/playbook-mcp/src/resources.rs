//! `playbook://<id>/<path>` resources.

use serde_json::{Value, json};
use url::Url;

use playbook_config::PlaybookConfig;
use playbook_core::{Playbook, PlaybookError, Result};
use playbook_store::Database;

use crate::registry::ToolEnv;

pub const SCHEME: &str = "playbook";

const JSON: &str = "application/json";
const MARKDOWN: &str = "text/markdown";

/// What a resource URI points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Guide,
    Memory,
    Personas,
    Skills,
    SkillAttachment {
        skill_id: String,
        attachment_id: String,
    },
    Canvas,
    CanvasDoc(String),
}

impl Resource {
    /// Parse `uri` for `playbook_id`. A URI for another playbook, a foreign
    /// scheme, or an unknown path is `ResourceNotFound`.
    pub fn parse(uri: &str, playbook_id: &str) -> Result<Self> {
        let missing = || PlaybookError::ResourceNotFound(uri.to_string());

        let url = Url::parse(uri).map_err(|_| missing())?;
        if url.scheme() != SCHEME || url.host_str() != Some(playbook_id) {
            return Err(missing());
        }
        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();

        Ok(match segments.as_slice() {
            ["guide"] => Resource::Guide,
            ["memory"] => Resource::Memory,
            ["personas"] => Resource::Personas,
            ["skills"] => Resource::Skills,
            ["skills", skill, "attachments", attachment] => Resource::SkillAttachment {
                skill_id: (*skill).to_string(),
                attachment_id: (*attachment).to_string(),
            },
            ["canvas"] => Resource::Canvas,
            ["canvas", slug] => Resource::CanvasDoc((*slug).to_string()),
            _ => return Err(missing()),
        })
    }
}

pub fn uri(playbook_id: &str, path: &str) -> String {
    format!("{SCHEME}://{playbook_id}/{path}")
}

fn descriptor(playbook_id: &str, path: &str, name: &str, description: &str, mime: &str) -> Value {
    json!({
        "uri": uri(playbook_id, path),
        "name": name,
        "description": description,
        "mimeType": mime,
    })
}

/// The fixed catalog plus one entry per skill attachment.
pub fn list(db: &Database, playbook: &Playbook) -> Result<Vec<Value>> {
    let id = &playbook.id;
    let mut resources = vec![
        descriptor(id, "guide", "Guide", "How to use this playbook", MARKDOWN),
        descriptor(id, "skills", "Skills", "Skills available in this playbook", JSON),
        descriptor(id, "memory", "Memory", "Stored memories, highest priority first", JSON),
        descriptor(id, "canvas", "Canvas", "Collaborative canvas documents", JSON),
        descriptor(id, "personas", "Personas", "Personas defined by this playbook", JSON),
    ];

    for skill in db.list_skills(id)? {
        for att in &skill.attachments {
            resources.push(descriptor(
                id,
                &format!("skills/{}/attachments/{}", skill.id, att.id),
                &att.filename,
                &format!("Attachment of skill '{}'", skill.name),
                &att.mime_type,
            ));
        }
    }
    Ok(resources)
}

/// Read one resource as `{contents: [{uri, mimeType, text}]}`.
pub fn read(
    db: &Database,
    playbook: &Playbook,
    config: &PlaybookConfig,
    uri: &str,
) -> Result<Value> {
    let env = ToolEnv {
        db,
        playbook,
        config,
    };
    let (mime, text) = match Resource::parse(uri, &playbook.id)? {
        Resource::Guide => (MARKDOWN.to_string(), playbook.guide.clone().unwrap_or_default()),
        Resource::Memory => {
            let memories = env.memory().list(None, config.memory.search_limit)?;
            (JSON.to_string(), serde_json::to_string_pretty(&memories)?)
        }
        Resource::Personas => {
            let personas = db.list_personas(&playbook.id)?;
            (JSON.to_string(), serde_json::to_string_pretty(&personas)?)
        }
        Resource::Skills => {
            let skills = db.list_skills(&playbook.id)?;
            (JSON.to_string(), serde_json::to_string_pretty(&skills)?)
        }
        Resource::SkillAttachment {
            skill_id,
            attachment_id,
        } => {
            let att = db
                .get_attachment(&playbook.id, &skill_id, &attachment_id)?
                .ok_or_else(|| PlaybookError::ResourceNotFound(uri.to_string()))?;
            (att.mime_type, att.content.unwrap_or_default())
        }
        Resource::Canvas => {
            let documents = env.canvas().list()?;
            (JSON.to_string(), serde_json::to_string_pretty(&documents)?)
        }
        Resource::CanvasDoc(slug) => {
            let doc = db
                .get_canvas(&playbook.id, &slug)?
                .ok_or_else(|| PlaybookError::ResourceNotFound(uri.to_string()))?;
            (MARKDOWN.to_string(), doc.content)
        }
    };

    Ok(json!({
        "contents": [{ "uri": uri, "mimeType": mime, "text": text }]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_paths() {
        let p = |u: &str| Resource::parse(u, "pb1");
        assert_eq!(p("playbook://pb1/guide").unwrap(), Resource::Guide);
        assert_eq!(p("playbook://pb1/canvas/").unwrap(), Resource::Canvas);
        assert_eq!(
            p("playbook://pb1/canvas/design").unwrap(),
            Resource::CanvasDoc("design".into())
        );
        assert_eq!(
            p("playbook://pb1/skills/sk/attachments/at").unwrap(),
            Resource::SkillAttachment {
                skill_id: "sk".into(),
                attachment_id: "at".into()
            }
        );
    }

    #[test]
    fn rejects_unknown_or_foreign() {
        for uri in [
            "playbook://pb1/nope",
            "playbook://pb2/guide",
            "https://pb1/guide",
            "playbook://pb1/skills/sk/attachments",
            "not a uri",
        ] {
            let err = Resource::parse(uri, "pb1").unwrap_err();
            assert_eq!(err.rpc_code(), -32002, "{uri}");
        }
    }
}
