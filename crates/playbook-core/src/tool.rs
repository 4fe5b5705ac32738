use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::playbook::Playbook;

/// Description of a tool advertised through `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Unique name, e.g. "write_memory", "skill_code_review", "search__web".
    pub name: String,
    /// Human-readable description for the calling agent.
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the arguments object.
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

impl Tool {
    /// A tool that takes no arguments.
    pub fn without_arguments(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: empty_schema(),
        }
    }
}

/// A `tools/call` request after envelope parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// The result of executing a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
    /// Structured data returned alongside the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    /// Wrap structured output; the text form is the pretty-printed JSON.
    pub fn json(data: Value) -> Self {
        let content = serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());
        Self {
            content,
            is_error: false,
            data: Some(data),
        }
    }

    /// Render in the MCP `tools/call` result shape.
    pub fn to_mcp(&self) -> Value {
        let mut out = json!({
            "content": [{ "type": "text", "text": self.content }],
            "isError": self.is_error,
        });
        if let Some(data) = &self.data {
            out["structuredContent"] = data.clone();
        }
        out
    }
}

/// Per-request context every tool call runs under.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub playbook: Playbook,
    /// Bearer credential forwarded verbatim to the authorizer; never parsed here.
    pub credential: Option<String>,
}

impl CallContext {
    pub fn new(playbook: Playbook, credential: Option<String>) -> Self {
        Self {
            playbook,
            credential,
        }
    }

    pub fn playbook_id(&self) -> &str {
        &self.playbook.id
    }
}

/// Trait implemented by anything that can execute tool calls for a playbook.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// List all tools this executor provides for the given playbook.
    async fn tools(&self, ctx: &CallContext) -> crate::Result<Vec<Tool>>;

    /// Execute a single tool call and return the result.
    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> crate::Result<ToolResult>;
}
