use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A heading-delimited slice of a canvas document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasSection {
    /// `s1`, `s2`, … assigned in document order when the document is written.
    pub id: String,
    pub heading: String,
    /// Markdown heading level, 1-6.
    pub level: u8,
    pub content: String,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
}

impl CanvasSection {
    pub fn new(id: impl Into<String>, heading: impl Into<String>, level: u8, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            heading: heading.into(),
            level,
            content: content.into(),
            locked_by: None,
            locked_at: None,
        }
    }
}

/// A collaborative markdown document, unique per playbook by slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasDocument {
    pub slug: String,
    pub name: String,
    /// Always the rendering of `sections` in order.
    pub content: String,
    pub sections: Vec<CanvasSection>,
    #[serde(default)]
    pub metadata: Value,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing entry for `list_canvas` and the `canvas` resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasSummary {
    pub slug: String,
    pub name: String,
    pub section_count: usize,
    pub sort_order: i64,
    pub updated_at: DateTime<Utc>,
}
