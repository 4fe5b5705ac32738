#[cfg(test)]
mod tests {
    use chrono::Utc;
    use playbook_config::MemoryConfig;
    use playbook_core::{MemoryType, PlaybookError, TaskStatus, Tier, Visibility};
    use playbook_memory::{
        ArchiveRequest, ConsolidateRequest, ContextRequest, MemoryEngine, SearchQuery,
        TaskGraphRequest, TaskSpec,
    };
    use playbook_store::{Database, MemoryWrite};
    use serde_json::json;

    fn engine() -> MemoryEngine {
        engine_with(MemoryConfig::default())
    }

    fn engine_with(config: MemoryConfig) -> MemoryEngine {
        let db = Database::open_in_memory().unwrap();
        let pb = db
            .create_playbook("Test", None, None, Visibility::Private, Utc::now())
            .unwrap();
        MemoryEngine::new(db, pb.id, config)
    }

    fn put(engine: &MemoryEngine, key: &str, write: MemoryWrite) {
        engine.write(key, write).unwrap();
    }

    fn value(v: serde_json::Value) -> MemoryWrite {
        MemoryWrite {
            value: Some(v),
            ..Default::default()
        }
    }

    // ── CRUD ───────────────────────────────────────────────────

    mod crud {
        use super::*;

        #[test]
        fn test_write_twice_is_one_row() {
            let e = engine();
            let first = e
                .write(
                    "k",
                    MemoryWrite {
                        value: Some(json!(1)),
                        tags: Some(vec!["t".into()]),
                        summary: Some("one".into()),
                        ..Default::default()
                    },
                )
                .unwrap();
            assert!(first.created);
            let second = e.write("k", value(json!(2))).unwrap();
            assert!(!second.created);
            assert_eq!(second.memory.value, json!(2));
            assert_eq!(second.memory.tags, vec!["t".to_string()]);
            assert_eq!(second.memory.summary.as_deref(), Some("one"));
            assert_eq!(e.search(&SearchQuery::default()).unwrap().len(), 1);
        }

        #[test]
        fn test_priority_clamped() {
            let e = engine();
            let high = e
                .write(
                    "high",
                    MemoryWrite {
                        priority: Some(500),
                        ..Default::default()
                    },
                )
                .unwrap();
            let low = e
                .write(
                    "low",
                    MemoryWrite {
                        priority: Some(-3),
                        ..Default::default()
                    },
                )
                .unwrap();
            assert_eq!(high.memory.priority, 100);
            assert_eq!(low.memory.priority, 1);
        }

        #[test]
        fn test_read_counts_access_and_missing_is_not_found() {
            let e = engine();
            put(&e, "k", value(json!("v")));
            e.read("k").unwrap();
            assert_eq!(e.read("k").unwrap().access_count, 2);
            assert!(matches!(e.read("nope"), Err(PlaybookError::NotFound { .. })));
        }

        #[test]
        fn test_delete() {
            let e = engine();
            put(&e, "k", value(json!("v")));
            e.delete("k").unwrap();
            assert!(matches!(e.delete("k"), Err(PlaybookError::NotFound { .. })));
        }

        #[test]
        fn test_empty_key_rejected() {
            let e = engine();
            assert!(matches!(
                e.write("", MemoryWrite::default()),
                Err(PlaybookError::Validation(_))
            ));
        }
    }

    // ── Parent links ───────────────────────────────────────────

    mod parent_links {
        use super::*;

        fn child_of(parent: &str) -> MemoryWrite {
            MemoryWrite {
                parent_key: Some(parent.into()),
                ..Default::default()
            }
        }

        #[test]
        fn test_self_parent_rejected() {
            let e = engine();
            assert!(matches!(
                e.write("a", child_of("a")),
                Err(PlaybookError::Validation(_))
            ));
        }

        #[test]
        fn test_cycle_rejected() {
            let e = engine();
            put(&e, "a", MemoryWrite::default());
            put(&e, "b", child_of("a"));
            put(&e, "c", child_of("b"));
            let err = e.write("a", child_of("c")).unwrap_err();
            assert!(err.to_string().contains("cycle"));
            assert!(e.read("a").unwrap().parent_key.is_none());
        }

        #[test]
        fn test_cycle_allowed_when_validation_disabled() {
            let e = engine_with(MemoryConfig {
                validate_parent_links: false,
                ..Default::default()
            });
            put(&e, "a", MemoryWrite::default());
            put(&e, "b", child_of("a"));
            e.write("a", child_of("b")).unwrap();

            // The repeated key is listed once more without expansion.
            let tree = e.tree(Some("a"), Some(usize::MAX), false).unwrap();
            let again = &tree[0].children[0].children[0];
            assert_eq!(again.key, "a");
            assert!(again.children.is_empty());
        }

        #[test]
        fn test_cycle_through_long_chain_is_rejected() {
            let e = engine();
            put(&e, "m0", MemoryWrite::default());
            for i in 1..=300 {
                put(&e, &format!("m{i}"), child_of(&format!("m{}", i - 1)));
            }
            let err = e.write("m0", child_of("m300")).unwrap_err();
            assert!(matches!(err, PlaybookError::Validation(_)));
            assert!(e.read("m0").unwrap().parent_key.is_none());
        }
    }

    // ── Search ─────────────────────────────────────────────────

    mod search {
        use super::*;

        #[test]
        fn test_roots_only_never_returns_children() {
            let e = engine();
            put(&e, "root", MemoryWrite::default());
            put(
                &e,
                "child",
                MemoryWrite {
                    parent_key: Some("root".into()),
                    ..Default::default()
                },
            );
            let hits = e
                .search(&SearchQuery {
                    tier: Some(Tier::Working),
                    include_children: Some(false),
                    ..Default::default()
                })
                .unwrap();
            assert_eq!(hits.len(), 1);
            assert!(hits.iter().all(|m| m.parent_key.is_none()));
        }

        #[test]
        fn test_query_matches_summary_case_insensitively() {
            let e = engine();
            put(
                &e,
                "x",
                MemoryWrite {
                    summary: Some("Quarterly Revenue".into()),
                    ..Default::default()
                },
            );
            put(&e, "y", MemoryWrite::default());
            let hits = e
                .search(&SearchQuery {
                    query: Some("revenue".into()),
                    ..Default::default()
                })
                .unwrap();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0].key, "x");
        }

        #[test]
        fn test_default_limit_from_config() {
            let e = engine_with(MemoryConfig {
                search_limit: 2,
                ..Default::default()
            });
            for k in ["a", "b", "c"] {
                put(&e, k, MemoryWrite::default());
            }
            assert_eq!(e.search(&SearchQuery::default()).unwrap().len(), 2);
        }
    }

    // ── Consolidation, promotion, archival ─────────────────────

    mod lifecycle {
        use super::*;

        #[test]
        fn test_consolidate() {
            let e = engine();
            put(
                &e,
                "n1",
                MemoryWrite {
                    tags: Some(vec!["a".into()]),
                    ..Default::default()
                },
            );
            put(
                &e,
                "n2",
                MemoryWrite {
                    tags: Some(vec!["b".into(), "a".into()]),
                    ..Default::default()
                },
            );

            let out = e
                .consolidate(&ConsolidateRequest {
                    memory_keys: vec!["n1".into(), "n2".into(), "ghost".into()],
                    parent_key: "digest".into(),
                    summary: "two notes".into(),
                    parent_tags: Some(vec!["digest".into()]),
                    archive_children: true,
                })
                .unwrap();

            assert_eq!(out.missing, vec!["ghost".to_string()]);
            assert_eq!(out.consolidated, vec!["n1".to_string(), "n2".to_string()]);
            assert_eq!(out.parent.tier, Tier::Contextual);
            assert_eq!(out.parent.priority, 75);
            assert_eq!(out.parent.value["type"], json!("consolidated"));
            assert_eq!(out.parent.value["child_count"], json!(2));
            assert_eq!(out.parent.tags, vec!["digest", "a", "b"]);

            let n1 = e.read("n1").unwrap();
            assert_eq!(n1.parent_key.as_deref(), Some("digest"));
            assert_eq!(n1.tier, Tier::Longterm);
        }

        #[test]
        fn test_consolidate_without_archiving_keeps_tier() {
            let e = engine();
            put(&e, "n1", MemoryWrite::default());
            e.consolidate(&ConsolidateRequest {
                memory_keys: vec!["n1".into()],
                parent_key: "p".into(),
                summary: "s".into(),
                parent_tags: None,
                archive_children: false,
            })
            .unwrap();
            assert_eq!(e.read("n1").unwrap().tier, Tier::Working);
        }

        #[test]
        fn test_consolidate_nothing_found_fails() {
            let e = engine();
            let err = e
                .consolidate(&ConsolidateRequest {
                    memory_keys: vec!["ghost".into()],
                    parent_key: "p".into(),
                    summary: "s".into(),
                    parent_tags: None,
                    archive_children: true,
                })
                .unwrap_err();
            assert!(matches!(err, PlaybookError::NotFound { .. }));
            assert!(e.read("p").is_err());
        }

        #[test]
        fn test_promote_never_lowers_tier() {
            let e = engine();
            put(&e, "k", MemoryWrite::default());
            let out = e.promote("k", Some(Tier::Longterm), None).unwrap();
            assert_eq!(out.memory.tier, Tier::Working);
            assert_eq!(out.memory.priority, 60);
            assert_eq!(out.previous_priority, 50);
        }

        #[test]
        fn test_promote_raises_tier_and_caps_boost() {
            let e = engine();
            put(
                &e,
                "k",
                MemoryWrite {
                    tier: Some(Tier::Longterm),
                    priority: Some(10),
                    ..Default::default()
                },
            );
            let out = e.promote("k", Some(Tier::Contextual), Some(80)).unwrap();
            assert_eq!(out.previous_tier, Tier::Longterm);
            assert_eq!(out.memory.tier, Tier::Contextual);
            assert_eq!(out.memory.priority, 60);
        }

        #[test]
        fn test_archive_respects_retention() {
            let e = engine();
            put(&e, "a", MemoryWrite::default());
            put(
                &e,
                "b",
                MemoryWrite {
                    tier: Some(Tier::Contextual),
                    ..Default::default()
                },
            );
            put(
                &e,
                "keep",
                MemoryWrite {
                    retention_policy: Some("permanent".into()),
                    ..Default::default()
                },
            );
            let archived = e
                .archive(&ArchiveRequest {
                    from_tier: Some(Tier::Working),
                    ..Default::default()
                })
                .unwrap();
            assert_eq!(archived, vec!["a".to_string()]);

            let archived = e.archive(&ArchiveRequest::default()).unwrap();
            assert_eq!(archived, vec!["b".to_string()]);
            assert_eq!(e.read("keep").unwrap().tier, Tier::Working);
        }

        #[test]
        fn test_archive_older_than_skips_recent() {
            let e = engine();
            put(&e, "fresh", MemoryWrite::default());
            let archived = e
                .archive(&ArchiveRequest {
                    older_than_hours: Some(1),
                    ..Default::default()
                })
                .unwrap();
            assert!(archived.is_empty());
        }

        #[test]
        fn test_archive_with_huge_age_selects_nothing() {
            let e = engine();
            put(&e, "old", MemoryWrite::default());
            for hours in [10_000_000_000, u64::MAX] {
                let archived = e
                    .archive(&ArchiveRequest {
                        older_than_hours: Some(hours),
                        ..Default::default()
                    })
                    .unwrap();
                assert!(archived.is_empty());
            }
            assert_eq!(e.read("old").unwrap().tier, Tier::Working);
        }
    }

    // ── Context view and tree ──────────────────────────────────

    mod views {
        use super::*;

        #[test]
        fn test_context_view_expands_working_only() {
            let e = engine();
            put(&e, "w", value(json!({"full": true})));
            put(
                &e,
                "c",
                MemoryWrite {
                    value: Some(json!("hidden")),
                    tier: Some(Tier::Contextual),
                    ..Default::default()
                },
            );
            put(
                &e,
                "c2",
                MemoryWrite {
                    value: Some(json!("shown")),
                    summary: Some("second".into()),
                    tier: Some(Tier::Contextual),
                    ..Default::default()
                },
            );
            put(
                &e,
                "l",
                MemoryWrite {
                    tier: Some(Tier::Longterm),
                    ..Default::default()
                },
            );

            let view = e
                .context_view(&ContextRequest {
                    expand_keys: vec!["c2".into()],
                    ..Default::default()
                })
                .unwrap();
            assert_eq!(view.total_items(), 3);
            let json = view.to_json();
            assert!(json.get("longterm").is_none());
            assert_eq!(json["working"][0]["value"], json!({"full": true}));

            let contextual = json["contextual"].as_array().unwrap();
            let c = contextual.iter().find(|i| i["key"] == "c").unwrap();
            assert_eq!(c["summary"], json!("[c]"));
            assert!(c.get("value").is_none());
            let c2 = contextual.iter().find(|i| i["key"] == "c2").unwrap();
            assert_eq!(c2["value"], json!("shown"));
        }

        #[test]
        fn test_context_view_max_items() {
            let e = engine();
            for k in ["a", "b", "c"] {
                put(&e, k, MemoryWrite::default());
            }
            let view = e
                .context_view(&ContextRequest {
                    include_tiers: Some(vec![Tier::Working]),
                    max_items: Some(2),
                    ..Default::default()
                })
                .unwrap();
            assert_eq!(view.total_items(), 2);
        }

        #[test]
        fn test_tree_depth_cutoff() {
            let e = engine();
            put(&e, "r", MemoryWrite::default());
            for (k, p) in [("c1", "r"), ("g1", "c1"), ("gg1", "g1")] {
                put(
                    &e,
                    k,
                    MemoryWrite {
                        parent_key: Some(p.into()),
                        ..Default::default()
                    },
                );
            }
            let tree = e.tree(None, Some(2), false).unwrap();
            assert_eq!(tree.len(), 1);
            let g1 = &tree[0].children[0].children[0];
            assert_eq!(g1.key, "g1");
            assert!(g1.children.is_empty());
            assert!(g1.value.is_none());
            assert_eq!(g1.summary, "[g1]");
        }

        #[test]
        fn test_tree_depth_is_capped_by_limit() {
            let e = engine_with(MemoryConfig {
                tree_max_depth_limit: 5,
                ..Default::default()
            });
            put(&e, "n0", MemoryWrite::default());
            for i in 1..=20 {
                put(
                    &e,
                    &format!("n{i}"),
                    MemoryWrite {
                        parent_key: Some(format!("n{}", i - 1)),
                        ..Default::default()
                    },
                );
            }
            let tree = e.tree(Some("n0"), Some(10_000_000), false).unwrap();
            let mut node = &tree[0];
            let mut depth = 0;
            while let Some(child) = node.children.first() {
                node = child;
                depth += 1;
            }
            assert_eq!(depth, 5);
            assert_eq!(node.key, "n5");
        }

        #[test]
        fn test_tree_missing_root() {
            let e = engine();
            assert!(matches!(
                e.tree(Some("nope"), None, true),
                Err(PlaybookError::NotFound { .. })
            ));
        }
    }

    // ── Task graphs ────────────────────────────────────────────

    mod task_graphs {
        use super::*;

        fn task(key: &str, deps: &[&str]) -> TaskSpec {
            TaskSpec {
                key: key.into(),
                description: format!("do {key}"),
                priority: None,
                depends_on: deps.iter().map(|d| d.to_string()).collect(),
            }
        }

        fn graph(e: &MemoryEngine) {
            e.create_task_graph(&TaskGraphRequest {
                plan_key: "p1".into(),
                plan_summary: "ship it".into(),
                tasks: vec![task("a", &[]), task("b", &["a"])],
                tags: Some(vec!["release".into()]),
            })
            .unwrap();
        }

        #[test]
        fn test_create_task_graph() {
            let e = engine();
            graph(&e);

            let plan = e.read("p1").unwrap();
            assert_eq!(plan.memory_type, MemoryType::Hierarchical);
            assert_eq!(plan.status, Some(TaskStatus::Pending));
            assert_eq!(plan.priority, 80);
            assert_eq!(plan.metadata["type"], json!("task_graph"));
            assert_eq!(plan.metadata["total_tasks"], json!(2));
            assert_eq!(plan.metadata["completed_tasks"], json!(0));

            let b = e.read("p1/b").unwrap();
            assert_eq!(b.parent_key.as_deref(), Some("p1"));
            assert_eq!(b.value, json!({"description": "do b", "result": null}));
            assert_eq!(b.metadata["depends_on"], json!(["p1/a"]));
            assert_eq!(b.tags, vec!["release".to_string()]);
        }

        #[test]
        fn test_duplicate_task_keys_write_nothing() {
            let e = engine();
            let err = e
                .create_task_graph(&TaskGraphRequest {
                    plan_key: "p1".into(),
                    plan_summary: "s".into(),
                    tasks: vec![task("a", &[]), task("a", &[])],
                    tags: None,
                })
                .unwrap_err();
            assert!(matches!(err, PlaybookError::Validation(_)));
            assert!(e.read("p1").is_err());
        }

        #[test]
        fn test_completing_all_tasks_completes_plan() {
            let e = engine();
            graph(&e);

            let out = e
                .update_task_status("p1/a", TaskStatus::Completed, Some(&json!("built")), None)
                .unwrap();
            assert!(out.parent_completed.is_none());
            assert_eq!(out.task.value["result"], json!("built"));
            let plan = e.read("p1").unwrap();
            assert_eq!(plan.status, Some(TaskStatus::Pending));
            assert_eq!(plan.metadata["completed_tasks"], json!(1));

            let out = e
                .update_task_status("p1/b", TaskStatus::Completed, None, Some("shipped"))
                .unwrap();
            assert_eq!(out.parent_completed.as_deref(), Some("p1"));
            assert_eq!(out.task.summary.as_deref(), Some("shipped"));

            let plan = e.read("p1").unwrap();
            assert_eq!(plan.status, Some(TaskStatus::Completed));
            assert_eq!(plan.metadata["completed_tasks"], json!(2));
            assert!(plan.metadata.get("completed_at").is_some());
        }

        #[test]
        fn test_failed_task_keeps_plan_open() {
            let e = engine();
            graph(&e);
            e.update_task_status("p1/a", TaskStatus::Completed, None, None)
                .unwrap();
            e.update_task_status("p1/b", TaskStatus::Failed, None, None)
                .unwrap();
            let plan = e.read("p1").unwrap();
            assert_eq!(plan.status, Some(TaskStatus::Pending));
            assert_eq!(plan.metadata["completed_tasks"], json!(1));
        }

        #[test]
        fn test_update_missing_task() {
            let e = engine();
            assert!(matches!(
                e.update_task_status("nope", TaskStatus::Running, None, None),
                Err(PlaybookError::NotFound { .. })
            ));
        }
    }
}
