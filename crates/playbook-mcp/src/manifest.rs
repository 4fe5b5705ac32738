//! `initialize` result and the discovery manifest.

use serde_json::{Value, json};

use playbook_config::McpConfig;
use playbook_core::{Persona, Playbook, Tool};

pub fn server_info(config: &McpConfig) -> Value {
    json!({
        "name": config.server_name,
        "version": env!("CARGO_PKG_VERSION"),
    })
}

pub fn capabilities() -> Value {
    json!({
        "tools": { "listChanged": false },
        "resources": { "subscribe": false, "listChanged": false },
    })
}

pub fn initialize(config: &McpConfig) -> Value {
    json!({
        "protocolVersion": config.protocol_version,
        "serverInfo": server_info(config),
        "capabilities": capabilities(),
    })
}

/// Everything an agent needs to start using a playbook, in one document.
pub fn discovery(
    config: &McpConfig,
    playbook: &Playbook,
    persona: Option<&Persona>,
    tools: &[Tool],
    resources: &[Value],
) -> Value {
    json!({
        "protocolVersion": config.protocol_version,
        "serverInfo": server_info(config),
        "capabilities": capabilities(),
        "tools": tools,
        "resources": resources,
        "_playbook": {
            "guid": playbook.id,
            "name": playbook.name,
            "description": playbook.description,
            "persona": persona.map(|p| json!({
                "name": p.name,
                "description": p.description,
                "system_prompt": p.system_prompt,
            })),
        },
    })
}
