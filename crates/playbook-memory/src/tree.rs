use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;

use playbook_core::{Memory, MemoryType, PlaybookError, Result, TaskStatus, Tier};
use playbook_store::MemoryFilter;

use crate::engine::MemoryEngine;

#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub key: String,
    /// The memory's summary, or `[key]` when it has none.
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub tier: Tier,
    pub priority: i64,
    pub memory_type: MemoryType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    pub children: Vec<TreeNode>,
}

impl MemoryEngine {
    /// Recursive view from `root_key`, or from every top-level memory.
    /// Expansion silently stops at `max_depth` (capped by `tree_max_depth_limit`).
    /// A key already on the current path is listed again without children.
    pub fn tree(
        &self,
        root_key: Option<&str>,
        max_depth: Option<usize>,
        include_values: bool,
    ) -> Result<Vec<TreeNode>> {
        let max_depth = max_depth
            .unwrap_or(self.config.tree_max_depth)
            .min(self.config.tree_max_depth_limit);
        let roots = match root_key {
            Some(key) => vec![self
                .db
                .get_memory(&self.playbook_id, key)?
                .ok_or_else(|| PlaybookError::not_found("Memory", key))?],
            None => self.db.search_memories(
                &self.playbook_id,
                &MemoryFilter {
                    roots_only: true,
                    ..Default::default()
                },
            )?,
        };

        roots
            .into_iter()
            .map(|m| self.build_node(m, 0, max_depth, include_values, &mut HashSet::new()))
            .collect()
    }

    fn build_node(
        &self,
        memory: Memory,
        depth: usize,
        max_depth: usize,
        include_values: bool,
        path: &mut HashSet<String>,
    ) -> Result<TreeNode> {
        let expand = depth < max_depth && path.insert(memory.key.clone());
        let children = if expand {
            let children = self
                .db
                .search_memories(
                    &self.playbook_id,
                    &MemoryFilter {
                        parent_key: Some(memory.key.clone()),
                        ..Default::default()
                    },
                )?
                .into_iter()
                .map(|child| self.build_node(child, depth + 1, max_depth, include_values, path))
                .collect::<Result<Vec<_>>>()?;
            path.remove(&memory.key);
            children
        } else {
            Vec::new()
        };

        Ok(TreeNode {
            summary: memory.summary_or_key(),
            value: include_values.then_some(memory.value),
            key: memory.key,
            tier: memory.tier,
            priority: memory.priority,
            memory_type: memory.memory_type,
            status: memory.status,
            children,
        })
    }
}
