//! [`ToolExecutor`] for playbook tools.
//!
//! Names resolve in order: the built-in table, the skill prefix, then
//! `<server>__<tool>` on a linked external server.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use playbook_config::PlaybookConfig;
use playbook_core::{
    Authorizer, CallContext, PlaybookError, Result, Skill, Tool, ToolCall, ToolExecutor,
    ToolResult,
};
use playbook_store::Database;

use crate::external::{ExternalClient, SEPARATOR};
use crate::registry::{self, ToolEnv};

pub struct PlaybookToolExecutor {
    db: Database,
    authorizer: Arc<dyn Authorizer>,
    external: ExternalClient,
    config: Arc<RwLock<PlaybookConfig>>,
}

impl PlaybookToolExecutor {
    pub fn new(
        db: Database,
        authorizer: Arc<dyn Authorizer>,
        config: Arc<RwLock<PlaybookConfig>>,
    ) -> Self {
        Self {
            db,
            authorizer,
            external: ExternalClient::new(),
            config,
        }
    }

    fn skill_tool(prefix: &str, skill: &Skill) -> Tool {
        let description = skill
            .description
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Skill: {}", skill.name));
        Tool::without_arguments(format!("{prefix}{}", skill.slug()), description)
    }

    /// Skills run in the caller's own model; the server only hands back instructions.
    fn skill_placeholder(&self, ctx: &CallContext, prefix: &str, name: &str) -> Result<ToolResult> {
        let slug = &name[prefix.len()..];
        let skill = self
            .db
            .list_skills(ctx.playbook_id())?
            .into_iter()
            .find(|s| !slug.is_empty() && s.slug() == slug);

        let data = match skill {
            Some(skill) => json!({
                "skill": skill.name,
                "instructions": skill.content,
                "note": format!(
                    "Skill '{}' is not executed by this server. Your own AI system must \
                     interpret and carry out these instructions.",
                    skill.name
                ),
            }),
            None => json!({
                "skill": slug,
                "instructions": null,
                "note": format!(
                    "No skill matches '{name}' in this playbook. Skills are interpreted by \
                     the caller's own AI system; use list_skills to see what is available."
                ),
            }),
        };
        Ok(ToolResult::json(data))
    }

    async fn call_external(
        &self,
        ctx: &CallContext,
        server_name: &str,
        tool: &str,
        arguments: &Value,
        timeout: Duration,
    ) -> Result<Option<ToolResult>> {
        let Some(server) = self
            .db
            .list_tool_servers(ctx.playbook_id())?
            .into_iter()
            .find(|s| s.name == server_name)
        else {
            return Ok(None);
        };
        let result = self
            .external
            .call_tool(&server, tool, arguments, timeout)
            .await?;
        Ok(Some(result))
    }
}

#[async_trait]
impl ToolExecutor for PlaybookToolExecutor {
    async fn tools(&self, ctx: &CallContext) -> Result<Vec<Tool>> {
        let prefix = self.config.read().mcp.skill_tool_prefix.clone();
        let mut tools = registry::catalog();

        // First skill wins a slug; the placeholder resolves the same way.
        let mut slugs = HashSet::new();
        for skill in self.db.list_skills(ctx.playbook_id())? {
            let slug = skill.slug();
            if slug.is_empty() || !slugs.insert(slug) {
                warn!(playbook = %ctx.playbook_id(), skill = %skill.name, "skill has no unique tool slug; not listed");
                continue;
            }
            tools.push(Self::skill_tool(&prefix, &skill));
        }

        for server in self.db.list_tool_servers(ctx.playbook_id())? {
            tools.extend(server.tools.into_iter().map(|t| Tool {
                name: format!("{}{SEPARATOR}{}", server.name, t.name),
                ..t
            }));
        }
        Ok(tools)
    }

    async fn execute(&self, ctx: &CallContext, call: &ToolCall) -> Result<ToolResult> {
        let config = self.config.read().clone();

        if let Some(spec) = registry::find(&call.name) {
            if let Some(scope) = spec.permission {
                self.authorizer
                    .authorize(ctx.credential.as_deref(), ctx.playbook_id(), Some(scope))
                    .await?;
            }
            let env = ToolEnv {
                db: &self.db,
                playbook: &ctx.playbook,
                config: &config,
            };
            let data = (spec.handler)(&env, call.arguments.clone())?;
            debug!(tool = %call.name, playbook = %ctx.playbook_id(), "built-in tool executed");
            return Ok(ToolResult::json(data));
        }

        let prefix = config.mcp.skill_tool_prefix.as_str();
        if !prefix.is_empty() && call.name.starts_with(prefix) {
            return self.skill_placeholder(ctx, prefix, &call.name);
        }

        if let Some((server, tool)) = call.name.split_once(SEPARATOR) {
            let timeout = Duration::from_secs(config.mcp.external_timeout_secs);
            if let Some(result) = self
                .call_external(ctx, server, tool, &call.arguments, timeout)
                .await?
            {
                info!(server, tool, is_error = result.is_error, "external tool executed");
                return Ok(result);
            }
        }

        Err(PlaybookError::ToolNotFound(call.name.clone()))
    }
}
