#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use playbook_canvas::{CanvasEngine, parse_sections, render};
    use playbook_config::CanvasConfig;
    use playbook_core::{PlaybookError, Visibility};
    use playbook_store::Database;
    use serde_json::json;

    const DOC: &str = "Intro line\n\n# Goals\nShip v1\n\n## Risks\n- time\n- scope\n\n# Notes\nnone yet";

    fn engine_with(config: CanvasConfig) -> CanvasEngine {
        let db = Database::open_in_memory().unwrap();
        let pb = db
            .create_playbook("Canvas", None, None, Visibility::Public, Utc::now())
            .unwrap();
        CanvasEngine::new(db, pb.id, config)
    }

    fn engine() -> CanvasEngine {
        engine_with(CanvasConfig::default())
    }

    // ── Documents ──────────────────────────────────────────────

    mod documents {
        use super::*;

        #[test]
        fn test_write_stores_rendered_sections() {
            let e = engine();
            let doc = e.write("plan", Some("Plan"), DOC, None, None).unwrap();
            assert_eq!(doc.sections.len(), 4);
            assert_eq!(doc.sections[0].heading, "Introduction");
            assert_eq!(doc.content, render(&parse_sections(DOC)));

            let read = e.read("plan").unwrap();
            assert_eq!(read.content, doc.content);
            assert_eq!(read.name, "Plan");
        }

        #[test]
        fn test_rewrite_replaces_sections_and_keeps_sort_order() {
            let e = engine();
            e.write("plan", None, DOC, Some(&json!({"owner": "ops"})), Some(3))
                .unwrap();
            let doc = e.write("plan", None, "# Fresh\nstart", None, None).unwrap();
            assert_eq!(doc.sections.len(), 1);
            assert_eq!(doc.sections[0].id, "s1");
            assert_eq!(doc.sort_order, 3);
            assert_eq!(doc.metadata, json!({"owner": "ops"}));
            assert_eq!(doc.name, "plan");
        }

        #[test]
        fn test_list_order() {
            let e = engine();
            e.write("b", Some("Bravo"), "x", None, Some(1)).unwrap();
            e.write("a", Some("Alpha"), "x", None, Some(1)).unwrap();
            e.write("z", Some("Zulu"), "x", None, Some(0)).unwrap();
            let slugs: Vec<_> = e.list().unwrap().into_iter().map(|d| d.slug).collect();
            assert_eq!(slugs, vec!["z", "a", "b"]);
        }

        #[test]
        fn test_missing_document() {
            let e = engine();
            assert!(matches!(e.read("nope"), Err(PlaybookError::NotFound { .. })));
            assert!(matches!(e.toc("nope"), Err(PlaybookError::NotFound { .. })));
        }

        #[test]
        fn test_invalid_slug() {
            let e = engine();
            assert!(matches!(
                e.write("../etc", None, "x", None, None),
                Err(PlaybookError::Validation(_))
            ));
        }

        #[test]
        fn test_toc() {
            let e = engine();
            e.write("plan", None, DOC, None, None).unwrap();
            e.lock("plan", "s3", "agent-a").unwrap();
            let toc = e.toc("plan").unwrap();
            assert_eq!(toc.len(), 4);
            assert_eq!(toc[2].heading, "Risks");
            assert_eq!(toc[2].level, 2);
            assert_eq!(toc[2].locked_by.as_deref(), Some("agent-a"));
            assert!(toc[0].locked_by.is_none());
        }
    }

    // ── Patching ───────────────────────────────────────────────

    mod patching {
        use super::*;

        #[test]
        fn test_patch_leaves_other_sections_byte_identical() {
            let e = engine();
            let before = e.write("plan", None, "# A\nfoo\n## B\nbar", None, None).unwrap();
            let after = e
                .patch_section("plan", "s2", "baz\n", None, None)
                .unwrap();

            let s1 = "# A\n\nfoo";
            assert!(before.content.starts_with(s1));
            assert!(after.content.starts_with(s1));
            assert_eq!(after.content, "# A\n\nfoo\n\n## B\n\nbaz");
            assert_eq!(after.content, render(&after.sections));
        }

        #[test]
        fn test_patch_can_rename_heading() {
            let e = engine();
            e.write("plan", None, "# A\nfoo", None, None).unwrap();
            let doc = e
                .patch_section("plan", "s1", "foo", Some("Alpha"), None)
                .unwrap();
            assert_eq!(doc.content, "# Alpha\n\nfoo");
        }

        #[test]
        fn test_patch_rejects_multiline_heading() {
            let e = engine();
            e.write("plan", None, "# A\nfoo", None, None).unwrap();
            assert!(matches!(
                e.patch_section("plan", "s1", "foo", Some("Alpha\n# Injected"), None),
                Err(PlaybookError::Validation(_))
            ));
            let doc = e.read("plan").unwrap();
            assert_eq!(doc.content, "# A\n\nfoo");
            assert_eq!(parse_sections(&doc.content).len(), doc.sections.len());
        }

        #[test]
        fn test_patch_missing_section() {
            let e = engine();
            e.write("plan", None, "# A\nfoo", None, None).unwrap();
            assert!(matches!(
                e.patch_section("plan", "s9", "x", None, None),
                Err(PlaybookError::NotFound { .. })
            ));
        }

        #[test]
        fn test_patch_rejected_while_locked_by_other_agent() {
            let e = engine();
            e.write("plan", None, DOC, None, None).unwrap();
            let now = Utc::now();
            e.lock_at("plan", "s2", "agent-a", now).unwrap();

            let err = e
                .patch_section_at("plan", "s2", "hijack", None, Some("agent-b"), now)
                .unwrap_err();
            assert_eq!(err.to_string(), "Section is locked by agent-a");
            assert!(
                e.patch_section_at("plan", "s2", "hijack", None, None, now)
                    .is_err()
            );

            let own = e
                .patch_section_at("plan", "s2", "mine", None, Some("agent-a"), now)
                .unwrap();
            assert_eq!(own.sections[1].content, "mine");

            let later = now + Duration::seconds(301);
            let stale = e
                .patch_section_at("plan", "s2", "after expiry", None, Some("agent-b"), later)
                .unwrap();
            assert_eq!(stale.sections[1].content, "after expiry");
        }

        #[test]
        fn test_unenforced_locks_only_warn() {
            let e = engine_with(CanvasConfig {
                enforce_locks: false,
                ..Default::default()
            });
            e.write("plan", None, DOC, None, None).unwrap();
            e.lock("plan", "s2", "agent-a").unwrap();
            let doc = e
                .patch_section("plan", "s2", "overwrite", None, Some("agent-b"))
                .unwrap();
            assert_eq!(doc.sections[1].content, "overwrite");
        }
    }

    // ── Locks ──────────────────────────────────────────────────

    mod locks {
        use super::*;

        #[test]
        fn test_lock_conflict_then_expiry() {
            let e = engine();
            e.write("plan", None, DOC, None, None).unwrap();
            let now = Utc::now();

            e.lock_at("plan", "s1", "agentA", now).unwrap();
            let err = e
                .lock_at("plan", "s1", "agentB", now + Duration::seconds(10))
                .unwrap_err();
            assert!(err.to_string().contains("agentA"));

            let section = e
                .lock_at("plan", "s1", "agentB", now + Duration::minutes(5) + Duration::seconds(1))
                .unwrap();
            assert_eq!(section.locked_by.as_deref(), Some("agentB"));
        }

        #[test]
        fn test_relock_by_holder_refreshes() {
            let e = engine();
            e.write("plan", None, DOC, None, None).unwrap();
            let now = Utc::now();
            e.lock_at("plan", "s1", "agentA", now).unwrap();
            let refreshed = e
                .lock_at("plan", "s1", "agentA", now + Duration::seconds(200))
                .unwrap();
            assert!(refreshed.locked_at.unwrap() > now + Duration::seconds(199));

            // Refreshed lock is still fresh 200s after the original would have expired.
            assert!(
                e.lock_at("plan", "s1", "agentB", now + Duration::seconds(400))
                    .is_err()
            );
        }

        #[test]
        fn test_unlock_is_unconditional() {
            let e = engine();
            e.write("plan", None, DOC, None, None).unwrap();
            e.lock("plan", "s1", "agentA").unwrap();
            assert_eq!(e.unlock("plan", "s1").unwrap().as_deref(), Some("agentA"));
            assert_eq!(e.unlock("plan", "s1").unwrap(), None);
            e.lock("plan", "s1", "agentB").unwrap();
        }

        #[test]
        fn test_unrepresentable_ttl_keeps_locks_live() {
            let e = engine_with(CanvasConfig {
                lock_ttl_secs: u64::MAX,
                ..Default::default()
            });
            e.write("plan", None, DOC, None, None).unwrap();
            let now = Utc::now();
            e.lock_at("plan", "s1", "agentA", now).unwrap();
            let err = e
                .lock_at("plan", "s1", "agentB", now + Duration::days(3650))
                .unwrap_err();
            assert!(err.to_string().contains("agentA"));
        }

        #[test]
        fn test_lock_requires_agent() {
            let e = engine();
            e.write("plan", None, DOC, None, None).unwrap();
            assert!(matches!(
                e.lock("plan", "s1", " "),
                Err(PlaybookError::Validation(_))
            ));
        }

        #[test]
        fn test_rewrite_drops_locks() {
            let e = engine();
            e.write("plan", None, DOC, None, None).unwrap();
            e.lock("plan", "s1", "agentA").unwrap();
            let doc = e.write("plan", None, DOC, None, None).unwrap();
            assert!(doc.sections.iter().all(|s| s.locked_by.is_none()));
        }
    }
}
