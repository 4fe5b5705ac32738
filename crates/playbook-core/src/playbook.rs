use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PlaybookError;
use crate::tool::Tool;

/// Who may reach a playbook without a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = PlaybookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(PlaybookError::Validation(format!("unknown visibility '{other}'"))),
        }
    }
}

/// The owning container for personas, skills, memory, and canvas documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    /// Public guid used in URLs and resource URIs.
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Markdown usage guide served by the `guide` resource.
    pub guide: Option<String>,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Playbook {
    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub system_prompt: Option<String>,
}

/// A parameterless skill: instructions the calling agent interprets itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<SkillAttachment>,
    pub updated_at: DateTime<Utc>,
}

impl Skill {
    /// Tool-name-safe form of the skill name: lowercase, `_` for anything else.
    pub fn slug(&self) -> String {
        Self::slug_of(&self.name)
    }

    /// Slug a candidate name would get. Empty when it has no ASCII letters or digits.
    pub fn slug_of(name: &str) -> String {
        let mut slug = String::with_capacity(name.len());
        for c in name.trim().chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('_') {
                slug.push('_');
            }
        }
        slug.trim_matches('_').to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillAttachment {
    pub id: String,
    pub skill_id: String,
    pub filename: String,
    pub mime_type: String,
    /// Omitted from listings; present when read through a resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// An external MCP server linked to a playbook whose tools are re-exported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServer {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub tools: Vec<Tool>,
}
