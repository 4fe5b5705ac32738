#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use parking_lot::RwLock;
    use playbook_config::PlaybookConfig;
    use playbook_core::{Playbook, Tool, Visibility};
    use playbook_mcp::{ApiKeyAuthorizer, JsonRpcResponse, McpServer, RpcOutcome};
    use playbook_store::{Database, SkillDraft};
    use serde_json::{Value, json};

    struct Fixture {
        db: Database,
        server: McpServer,
        public: Playbook,
        private: Playbook,
        /// Key bound to `public` with `memory:write`.
        writer: String,
    }

    fn setup() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let public = db
            .create_playbook("Ops", Some("ops"), Some("# Ops guide"), Visibility::Public, now)
            .unwrap();
        let private = db
            .create_playbook("Secret", None, None, Visibility::Private, now)
            .unwrap();
        let writer = ApiKeyAuthorizer::new(db.clone())
            .issue(&public.id, "agent", &["memory:write".to_string()])
            .unwrap()
            .secret;
        let config = Arc::new(RwLock::new(PlaybookConfig::default()));
        let server = McpServer::new(db.clone(), config);
        Fixture {
            db,
            server,
            public,
            private,
            writer,
        }
    }

    fn issue(db: &Database, playbook_id: &str, scopes: &[&str]) -> String {
        let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
        ApiKeyAuthorizer::new(db.clone())
            .issue(playbook_id, "test", &scopes)
            .unwrap()
            .secret
    }

    async fn send(
        server: &McpServer,
        playbook_id: &str,
        credential: Option<&str>,
        method: &str,
        params: Value,
    ) -> RpcOutcome {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        server
            .handle(playbook_id, credential, body.to_string().as_bytes())
            .await
    }

    async fn rpc(
        server: &McpServer,
        playbook_id: &str,
        credential: Option<&str>,
        method: &str,
        params: Value,
    ) -> JsonRpcResponse {
        send(server, playbook_id, credential, method, params)
            .await
            .response
            .unwrap()
    }

    async fn call(fx: &Fixture, credential: Option<&str>, name: &str, arguments: Value) -> JsonRpcResponse {
        rpc(
            &fx.server,
            &fx.public.id,
            credential,
            "tools/call",
            json!({ "name": name, "arguments": arguments }),
        )
        .await
    }

    fn code(resp: &JsonRpcResponse) -> i64 {
        resp.error.as_ref().unwrap().code
    }

    fn message(resp: &JsonRpcResponse) -> String {
        resp.error.as_ref().unwrap().message.clone()
    }

    fn data(resp: &JsonRpcResponse) -> Value {
        resp.result.as_ref().unwrap()["structuredContent"].clone()
    }

    // ── Envelope and routing ───────────────────────────────────

    mod routing {
        use super::*;

        #[tokio::test]
        async fn test_malformed_body_is_invalid_request() {
            let fx = setup();
            let out = fx.server.handle(&fx.public.id, None, b"{oops").await;
            assert!(out.method.is_none());
            assert_eq!(code(&out.response.unwrap()), -32600);
        }

        #[tokio::test]
        async fn test_unknown_method() {
            let fx = setup();
            let resp = rpc(&fx.server, &fx.public.id, None, "tools/destroy", json!({})).await;
            assert_eq!(code(&resp), -32601);
            assert_eq!(resp.id, json!(1));
        }

        #[tokio::test]
        async fn test_unknown_playbook() {
            let fx = setup();
            let resp = rpc(&fx.server, "no-such-playbook", None, "ping", json!({})).await;
            assert_eq!(code(&resp), -32001);
        }

        #[tokio::test]
        async fn test_private_playbook_needs_bound_key() {
            let fx = setup();
            let resp = rpc(&fx.server, &fx.private.id, None, "ping", json!({})).await;
            assert_eq!(code(&resp), -32001);

            // A key for another playbook does not reveal it either.
            let resp = rpc(&fx.server, &fx.private.id, Some(&fx.writer), "ping", json!({})).await;
            assert_eq!(code(&resp), -32001);

            let key = issue(&fx.db, &fx.private.id, &[]);
            let resp = rpc(&fx.server, &fx.private.id, Some(&key), "ping", json!({})).await;
            assert_eq!(resp.result, Some(json!({})));
        }

        #[tokio::test]
        async fn test_notification_has_no_response() {
            let fx = setup();
            let out = send(&fx.server, &fx.public.id, None, "notifications/initialized", Value::Null).await;
            assert!(out.response.is_none());
            assert_eq!(out.method.as_deref(), Some("notifications/initialized"));
        }

        #[tokio::test]
        async fn test_initialize() {
            let fx = setup();
            let resp = rpc(&fx.server, &fx.public.id, None, "initialize", json!({})).await;
            let result = resp.result.unwrap();
            assert_eq!(result["protocolVersion"], "2024-11-05");
            assert_eq!(result["serverInfo"]["name"], "playbook-mcp");
            assert!(result["capabilities"]["tools"].is_object());
            assert!(result["capabilities"]["resources"].is_object());
        }
    }

    // ── tools/list ─────────────────────────────────────────────

    mod listing {
        use super::*;

        #[tokio::test]
        async fn test_tools_list_merges_builtins_skills_and_servers() {
            let fx = setup();
            fx.db
                .create_skill(
                    &fx.public.id,
                    &SkillDraft {
                        name: "Code Review".into(),
                        description: Some("Review a diff".into()),
                        content: "Look for bugs.".into(),
                        tags: vec![],
                    },
                    Utc::now(),
                )
                .unwrap();
            fx.db
                .link_tool_server(
                    &fx.public.id,
                    "search",
                    "http://127.0.0.1:9/",
                    &[Tool::without_arguments("web", "Web search")],
                    Utc::now(),
                )
                .unwrap();

            let resp = rpc(&fx.server, &fx.public.id, None, "tools/list", json!({})).await;
            let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
            let find = |name: &str| tools.iter().find(|t| t["name"] == name).cloned();

            assert!(find("write_memory").is_some());
            assert!(find("patch_canvas_section").is_some());
            let skill = find("skill_code_review").unwrap();
            assert_eq!(skill["description"], "Review a diff");
            assert_eq!(skill["inputSchema"]["properties"], json!({}));
            assert!(find("search__web").is_some());
        }

        #[tokio::test]
        async fn test_stored_skills_never_list_duplicate_or_bare_tool_names() {
            let fx = setup();
            for name in ["Code Review", "code-review", "日本語"] {
                fx.db
                    .create_skill(
                        &fx.public.id,
                        &SkillDraft {
                            name: name.into(),
                            content: "x".into(),
                            ..Default::default()
                        },
                        Utc::now(),
                    )
                    .unwrap();
            }

            let resp = rpc(&fx.server, &fx.public.id, None, "tools/list", json!({})).await;
            let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
            let named = |name: &str| tools.iter().filter(|t| t["name"] == name).count();
            assert_eq!(named("skill_code_review"), 1);
            assert_eq!(named("skill_"), 0);
        }
    }

    // ── tools/call ─────────────────────────────────────────────

    mod calls {
        use super::*;

        #[tokio::test]
        async fn test_write_then_read_memory() {
            let fx = setup();
            let resp = call(
                &fx,
                Some(&fx.writer),
                "write_memory",
                json!({ "key": "goal", "value": { "text": "ship" }, "tier": "working" }),
            )
            .await;
            assert!(!resp.is_error());
            assert_eq!(data(&resp)["action"], "created");

            let resp = call(&fx, None, "read_memory", json!({ "key": "goal" })).await;
            let result = resp.result.as_ref().unwrap();
            assert_eq!(result["isError"], false);
            assert_eq!(result["content"][0]["type"], "text");
            let text = result["content"][0]["text"].as_str().unwrap();
            let parsed: Value = serde_json::from_str(text).unwrap();
            assert_eq!(parsed["value"]["text"], "ship");
            assert_eq!(data(&resp)["access_count"], 1);
        }

        #[tokio::test]
        async fn test_privileged_tool_without_key_writes_nothing() {
            let fx = setup();
            let resp = call(&fx, None, "write_memory", json!({ "key": "k", "value": 1 })).await;
            assert_eq!(code(&resp), -32000);
            assert!(message(&resp).contains("permission denied"));

            let resp = call(&fx, None, "read_memory", json!({ "key": "k" })).await;
            assert!(message(&resp).contains("not found"));
        }

        #[tokio::test]
        async fn test_key_without_scope_or_for_other_playbook() {
            let fx = setup();
            let skills_only = issue(&fx.db, &fx.public.id, &["skills:write"]);
            let resp = call(&fx, Some(&skills_only), "write_memory", json!({ "key": "k", "value": 1 })).await;
            assert!(message(&resp).contains("memory:write"));

            let foreign = issue(&fx.db, &fx.private.id, &["*"]);
            let resp = call(&fx, Some(&foreign), "write_memory", json!({ "key": "k", "value": 1 })).await;
            assert!(message(&resp).contains("permission denied"));
        }

        #[tokio::test]
        async fn test_wildcard_key_updates_playbook() {
            let fx = setup();
            let admin = issue(&fx.db, &fx.public.id, &["*"]);
            let resp = call(
                &fx,
                Some(&admin),
                "update_playbook",
                json!({ "guide": "# New guide", "persona": { "name": "Ops Bot" } }),
            )
            .await;
            let out = data(&resp);
            assert_eq!(out["playbook"]["guide"], "# New guide");
            assert_eq!(out["persona"]["name"], "Ops Bot");
        }

        #[tokio::test]
        async fn test_invalid_arguments() {
            let fx = setup();
            let resp = call(&fx, Some(&fx.writer), "write_memory", json!({ "key": "k" })).await;
            assert_eq!(code(&resp), -32000);
            assert!(message(&resp).contains("invalid arguments"));
        }

        #[tokio::test]
        async fn test_unknown_tool() {
            let fx = setup();
            let out = send(
                &fx.server,
                &fx.public.id,
                None,
                "tools/call",
                json!({ "name": "teleport", "arguments": {} }),
            )
            .await;
            assert!(out.tool_failed());
            assert!(message(out.response.as_ref().unwrap()).contains("tool not found"));
        }

        #[tokio::test]
        async fn test_canvas_lock_conflict_names_holder() {
            let fx = setup();
            call(
                &fx,
                Some(&fx.writer),
                "write_canvas",
                json!({ "slug": "plan", "content": "# A\nfoo\n## B\nbar" }),
            )
            .await;

            let lock = |agent: &str| json!({ "slug": "plan", "section_id": "s2", "locked_by": agent });
            let resp = call(&fx, Some(&fx.writer), "lock_canvas_section", lock("agentA")).await;
            assert_eq!(data(&resp)["locked_by"], "agentA");

            let resp = call(&fx, Some(&fx.writer), "lock_canvas_section", lock("agentB")).await;
            assert_eq!(code(&resp), -32000);
            assert_eq!(message(&resp), "Section is locked by agentA");

            let resp = call(
                &fx,
                Some(&fx.writer),
                "patch_canvas_section",
                json!({ "slug": "plan", "section_id": "s2", "content": "baz", "agent_id": "agentB" }),
            )
            .await;
            assert_eq!(message(&resp), "Section is locked by agentA");

            let resp = call(&fx, None, "get_canvas_toc", json!({ "slug": "plan" })).await;
            assert_eq!(data(&resp)["sections"][1]["locked_by"], "agentA");
        }

        #[tokio::test]
        async fn test_task_graph_completion_over_rpc() {
            let fx = setup();
            call(
                &fx,
                Some(&fx.writer),
                "create_task_graph",
                json!({ "plan_key": "p1", "plan_summary": "ship", "tasks": [{ "key": "a" }, { "key": "b" }] }),
            )
            .await;
            for key in ["p1/a", "p1/b"] {
                call(&fx, Some(&fx.writer), "update_task_status", json!({ "key": key, "status": "completed" })).await;
            }
            let resp = call(&fx, None, "read_memory", json!({ "key": "p1" })).await;
            let plan = data(&resp);
            assert_eq!(plan["status"], "completed");
            assert_eq!(plan["metadata"]["completed_tasks"], 2);
        }

        #[tokio::test]
        async fn test_skill_tool_returns_instructions() {
            let fx = setup();
            fx.db
                .create_skill(
                    &fx.public.id,
                    &SkillDraft {
                        name: "Code Review".into(),
                        content: "Look for bugs.".into(),
                        ..Default::default()
                    },
                    Utc::now(),
                )
                .unwrap();

            let resp = call(&fx, None, "skill_code_review", json!({})).await;
            let out = data(&resp);
            assert_eq!(out["instructions"], "Look for bugs.");
            assert!(out["note"].as_str().unwrap().contains("own AI system"));

            let resp = call(&fx, None, "skill_unknown", json!({})).await;
            assert!(!resp.is_error());
            assert!(data(&resp)["instructions"].is_null());
        }
    }

    // ── Skill management ───────────────────────────────────────

    mod skills {
        use super::*;

        #[tokio::test]
        async fn test_skill_names_must_map_to_unique_slugs() {
            let fx = setup();
            let editor = issue(&fx.db, &fx.public.id, &["skills:write"]);

            let resp = call(
                &fx,
                Some(&editor),
                "create_skill",
                json!({ "name": "Code Review", "content": "Look for bugs." }),
            )
            .await;
            assert!(!resp.is_error());
            let review_id = data(&resp)["id"].as_str().unwrap().to_string();

            let resp = call(
                &fx,
                Some(&editor),
                "create_skill",
                json!({ "name": "code-review", "content": "dup" }),
            )
            .await;
            assert_eq!(code(&resp), -32000);
            assert!(message(&resp).contains("already used by 'Code Review'"));

            let resp = call(
                &fx,
                Some(&editor),
                "create_skill",
                json!({ "name": "日本語", "content": "x" }),
            )
            .await;
            assert!(message(&resp).contains("invalid arguments"));

            let resp = call(
                &fx,
                Some(&editor),
                "create_skill",
                json!({ "name": "Deploy", "content": "Ship it." }),
            )
            .await;
            assert!(!resp.is_error());
            let resp = call(
                &fx,
                Some(&editor),
                "update_skill",
                json!({ "skill_id": "Deploy", "name": "Code  Review" }),
            )
            .await;
            assert!(message(&resp).contains("already used"));

            // Renaming a skill to another spelling of its own slug is fine.
            let resp = call(
                &fx,
                Some(&editor),
                "update_skill",
                json!({ "skill_id": review_id, "name": "code review" }),
            )
            .await;
            assert!(!resp.is_error());
            assert_eq!(data(&resp)["name"], "code review");
        }
    }

    // ── Resources and discovery ────────────────────────────────

    mod resources {
        use super::*;

        #[tokio::test]
        async fn test_list_includes_attachments() {
            let fx = setup();
            let skill = fx
                .db
                .create_skill(
                    &fx.public.id,
                    &SkillDraft {
                        name: "Deploy".into(),
                        content: "steps".into(),
                        ..Default::default()
                    },
                    Utc::now(),
                )
                .unwrap();
            let att = fx
                .db
                .add_attachment(&skill.id, "runbook.md", "text/markdown", "# Runbook", Utc::now())
                .unwrap();

            let resp = rpc(&fx.server, &fx.public.id, None, "resources/list", json!({})).await;
            let list = resp.result.unwrap()["resources"].as_array().unwrap().clone();
            assert_eq!(list.len(), 6);
            let uri = format!("playbook://{}/skills/{}/attachments/{}", fx.public.id, skill.id, att.id);
            assert!(list.iter().any(|r| r["uri"] == uri.as_str()));

            let resp = rpc(&fx.server, &fx.public.id, None, "resources/read", json!({ "uri": uri })).await;
            let contents = &resp.result.unwrap()["contents"][0];
            assert_eq!(contents["text"], "# Runbook");
            assert_eq!(contents["mimeType"], "text/markdown");
        }

        #[tokio::test]
        async fn test_read_guide_and_canvas() {
            let fx = setup();
            call(
                &fx,
                Some(&fx.writer),
                "write_canvas",
                json!({ "slug": "notes", "content": "# Notes\nhello" }),
            )
            .await;

            let guide = format!("playbook://{}/guide", fx.public.id);
            let resp = rpc(&fx.server, &fx.public.id, None, "resources/read", json!({ "uri": guide })).await;
            assert_eq!(resp.result.unwrap()["contents"][0]["text"], "# Ops guide");

            let doc = format!("playbook://{}/canvas/notes", fx.public.id);
            let resp = rpc(&fx.server, &fx.public.id, None, "resources/read", json!({ "uri": doc })).await;
            assert_eq!(resp.result.unwrap()["contents"][0]["text"], "# Notes\n\nhello");
        }

        #[tokio::test]
        async fn test_unresolvable_uris() {
            let fx = setup();
            let foreign = format!("playbook://{}/guide", fx.private.id);
            let missing_doc = format!("playbook://{}/canvas/nope", fx.public.id);
            for params in [json!({ "uri": foreign }), json!({ "uri": missing_doc }), json!({})] {
                let resp = rpc(&fx.server, &fx.public.id, None, "resources/read", params).await;
                assert_eq!(code(&resp), -32002);
            }
        }

        #[tokio::test]
        async fn test_discovery_manifest() {
            let fx = setup();
            fx.db
                .upsert_primary_persona(&fx.public.id, Some("Ops Bot"), None, Some("Be terse."), Utc::now())
                .unwrap();
            let manifest = fx.server.discover(&fx.public.id, None).await.unwrap();
            assert_eq!(manifest["_playbook"]["guid"], fx.public.id.as_str());
            assert_eq!(manifest["_playbook"]["persona"]["name"], "Ops Bot");
            assert!(!manifest["tools"].as_array().unwrap().is_empty());
            assert_eq!(manifest["resources"].as_array().unwrap().len(), 5);

            assert!(fx.server.discover(&fx.private.id, None).await.is_err());
        }
    }

    // ── Linked tool servers ────────────────────────────────────

    mod external {
        use super::*;
        use axum::{Json, Router, routing::post};

        async fn remote(Json(req): Json<Value>) -> Json<Value> {
            let query = req["params"]["arguments"]["q"].as_str().unwrap_or("").to_string();
            Json(json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "result": {
                    "content": [{ "type": "text", "text": format!("results for {query}") }],
                    "isError": false
                }
            }))
        }

        #[tokio::test]
        async fn test_forwards_to_linked_server() {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, Router::new().route("/", post(remote)))
                    .await
                    .unwrap();
            });

            let fx = setup();
            fx.db
                .link_tool_server(
                    &fx.public.id,
                    "search",
                    &format!("http://{addr}/"),
                    &[Tool::without_arguments("web", "Web search")],
                    Utc::now(),
                )
                .unwrap();

            let resp = call(&fx, None, "search__web", json!({ "q": "rust" })).await;
            let result = resp.result.unwrap();
            assert_eq!(result["content"][0]["text"], "results for rust");
            assert_eq!(result["isError"], false);
        }

        #[tokio::test]
        async fn test_unreachable_server_is_tool_error() {
            let fx = setup();
            fx.db
                .link_tool_server(&fx.public.id, "dead", "http://127.0.0.1:1/", &[], Utc::now())
                .unwrap();
            let resp = call(&fx, None, "dead__anything", json!({})).await;
            assert_eq!(code(&resp), -32000);
            assert!(message(&resp).contains("tool execution failed"));

            // Unlinked server names fall through to not-found.
            let resp = call(&fx, None, "ghost__anything", json!({})).await;
            assert!(message(&resp).contains("tool not found"));
        }
    }
}
