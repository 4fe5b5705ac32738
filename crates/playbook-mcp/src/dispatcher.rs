//! JSON-RPC method routing for one playbook endpoint.

use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use playbook_config::PlaybookConfig;
use playbook_core::error::codes;
use playbook_core::{
    Authorizer, CallContext, Playbook, PlaybookError, Result, ToolCall, ToolExecutor,
};
use playbook_store::Database;

use crate::auth::ApiKeyAuthorizer;
use crate::executor::PlaybookToolExecutor;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::{manifest, resources};

/// What one RPC body produced. `response` is `None` for notifications.
#[derive(Debug, Clone)]
pub struct RpcOutcome {
    pub response: Option<JsonRpcResponse>,
    pub method: Option<String>,
    /// Tool name when the method was `tools/call`.
    pub tool: Option<String>,
}

impl RpcOutcome {
    fn reply(method: Option<String>, response: JsonRpcResponse) -> Self {
        Self {
            response: Some(response),
            method,
            tool: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.response.as_ref().is_some_and(JsonRpcResponse::is_error)
    }

    /// True when a `tools/call` failed, either as an RPC error or an `isError` result.
    pub fn tool_failed(&self) -> bool {
        self.tool.is_some()
            && self.response.as_ref().is_some_and(|r| {
                r.is_error()
                    || r.result
                        .as_ref()
                        .and_then(|v| v["isError"].as_bool())
                        .unwrap_or(false)
            })
    }
}

/// The protocol endpoint: resolves the playbook, then routes the method.
#[derive(Clone)]
pub struct McpServer {
    db: Database,
    authorizer: Arc<dyn Authorizer>,
    executor: Arc<dyn ToolExecutor>,
    config: Arc<RwLock<PlaybookConfig>>,
}

impl McpServer {
    /// Wire the API-key authorizer and the playbook tool executor over `db`.
    pub fn new(db: Database, config: Arc<RwLock<PlaybookConfig>>) -> Self {
        let authorizer: Arc<dyn Authorizer> = Arc::new(ApiKeyAuthorizer::new(db.clone()));
        let executor = Arc::new(PlaybookToolExecutor::new(
            db.clone(),
            authorizer.clone(),
            config.clone(),
        ));
        Self::with_parts(db, authorizer, executor, config)
    }

    pub fn with_parts(
        db: Database,
        authorizer: Arc<dyn Authorizer>,
        executor: Arc<dyn ToolExecutor>,
        config: Arc<RwLock<PlaybookConfig>>,
    ) -> Self {
        Self {
            db,
            authorizer,
            executor,
            config,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// A private playbook is reported missing unless the credential is bound to it.
    async fn resolve_playbook(&self, playbook_id: &str, credential: Option<&str>) -> Result<Playbook> {
        let not_found = || PlaybookError::PlaybookNotFound(playbook_id.to_string());
        let playbook = self.db.get_playbook(playbook_id)?.ok_or_else(not_found)?;
        if !playbook.is_public()
            && let Err(e) = self.authorizer.authorize(credential, playbook_id, None).await
        {
            debug!(playbook = %playbook_id, error = %e, "private playbook hidden");
            return Err(not_found());
        }
        Ok(playbook)
    }

    /// The discovery manifest for `GET /mcp/{playbook_id}`.
    pub async fn discover(&self, playbook_id: &str, credential: Option<&str>) -> Result<Value> {
        let playbook = self.resolve_playbook(playbook_id, credential).await?;
        let config = self.config.read().clone();
        let ctx = CallContext::new(playbook, credential.map(String::from));

        let tools = self.executor.tools(&ctx).await?;
        let resources = resources::list(&self.db, &ctx.playbook)?;
        let persona = self.db.primary_persona(playbook_id)?;
        Ok(manifest::discovery(
            &config.mcp,
            &ctx.playbook,
            persona.as_ref(),
            &tools,
            &resources,
        ))
    }

    /// Handle one raw JSON-RPC body for `playbook_id`.
    pub async fn handle(&self, playbook_id: &str, credential: Option<&str>, body: &[u8]) -> RpcOutcome {
        let req = match JsonRpcRequest::parse(body) {
            Ok(req) => req,
            Err(resp) => return RpcOutcome::reply(None, resp),
        };
        let method = Some(req.method.clone());

        if req.is_notification() {
            debug!(method = %req.method, "notification acknowledged");
            return RpcOutcome {
                response: None,
                method,
                tool: None,
            };
        }

        let playbook = match self.resolve_playbook(playbook_id, credential).await {
            Ok(p) => p,
            Err(e) => return RpcOutcome::reply(method, JsonRpcResponse::from_error(req.id, &e)),
        };
        let ctx = CallContext::new(playbook, credential.map(String::from));

        if req.method == "tools/call" {
            return self.call_tool(&ctx, req).await;
        }

        let response = match self.route(&ctx, &req).await {
            Ok(result) => JsonRpcResponse::success(req.id, result),
            Err(e) => {
                debug!(method = %req.method, error = %e, "rpc error");
                JsonRpcResponse::from_error(req.id, &e)
            }
        };
        RpcOutcome::reply(method, response)
    }

    async fn route(&self, ctx: &CallContext, req: &JsonRpcRequest) -> Result<Value> {
        let config = self.config.read().clone();
        match req.method.as_str() {
            "initialize" => {
                info!(playbook = %ctx.playbook_id(), "client initialized");
                Ok(manifest::initialize(&config.mcp))
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.executor.tools(ctx).await? })),
            "resources/list" => Ok(json!({ "resources": resources::list(&self.db, &ctx.playbook)? })),
            "resources/read" => {
                let uri = req.param_str("uri").unwrap_or_default();
                resources::read(&self.db, &ctx.playbook, &config, uri)
            }
            other => Err(PlaybookError::MethodNotFound(other.to_string())),
        }
    }

    async fn call_tool(&self, ctx: &CallContext, req: JsonRpcRequest) -> RpcOutcome {
        let method = Some(req.method.clone());
        let call: ToolCall = match serde_json::from_value(req.params) {
            Ok(call) => call,
            Err(e) => {
                let err = PlaybookError::InvalidRequest(format!("tools/call params: {e}"));
                return RpcOutcome::reply(method, JsonRpcResponse::from_error(req.id, &err));
            }
        };

        let response = match self.executor.execute(ctx, &call).await {
            Ok(result) => JsonRpcResponse::success(req.id, result.to_mcp()),
            Err(e) => {
                warn!(tool = %call.name, playbook = %ctx.playbook_id(), error = %e, "tool call failed");
                JsonRpcResponse::error(req.id, codes::TOOL_EXECUTION, e.to_string())
            }
        };
        RpcOutcome {
            response: Some(response),
            method,
            tool: Some(call.name),
        }
    }
}
