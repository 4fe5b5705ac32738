//! Forwarding `tools/call` to linked external MCP servers.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use playbook_core::{PlaybookError, Result, ToolResult, ToolServer};

/// Separator between a linked server's name and its tool's name.
pub const SEPARATOR: &str = "__";

#[derive(Clone, Default)]
pub struct ExternalClient {
    client: Client,
}

impl ExternalClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `tool` on `server` and translate its result. Transport failures,
    /// non-2xx statuses, and JSON-RPC errors all surface as tool execution errors.
    pub async fn call_tool(
        &self,
        server: &ToolServer,
        tool: &str,
        arguments: &Value,
        timeout: Duration,
    ) -> Result<ToolResult> {
        let failed = |reason: String| PlaybookError::ToolExecution {
            tool: format!("{}{SEPARATOR}{tool}", server.name),
            reason,
        };

        let url = Url::parse(&server.url).map_err(|e| failed(format!("bad server url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(failed(format!("unsupported url scheme '{}'", url.scheme())));
        }

        let body = json!({
            "jsonrpc": "2.0",
            "id": uuid::Uuid::new_v4().to_string(),
            "method": "tools/call",
            "params": { "name": tool, "arguments": arguments },
        });
        debug!(server = %server.name, tool, "forwarding tool call");

        let resp = self
            .client
            .post(url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {status}: {text}")));
        }

        let data: Value = resp.json().await.map_err(|e| failed(e.to_string()))?;
        if let Some(err) = data.get("error") {
            let message = err["message"].as_str().unwrap_or("remote error");
            return Err(failed(message.to_string()));
        }
        Ok(translate_result(&data["result"]))
    }
}

/// Map an MCP `tools/call` result onto a [`ToolResult`]: text blocks are
/// concatenated, `structuredContent` becomes the data payload.
fn translate_result(result: &Value) -> ToolResult {
    let content = result["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|b| b["type"] == "text")
                .filter_map(|b| b["text"].as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();
    let data = result.get("structuredContent").cloned();
    let content = match (&data, content.is_empty()) {
        (Some(data), true) => data.to_string(),
        _ => content,
    };
    ToolResult {
        content,
        is_error: result["isError"].as_bool().unwrap_or(false),
        data,
    }
}
