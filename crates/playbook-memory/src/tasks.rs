//! Task graphs: a plan memory with one hierarchical child per task.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use tracing::info;

use playbook_core::memory::{DEFAULT_PRIORITY, clamp_priority};
use playbook_core::{Memory, MemoryType, PlaybookError, Result, TaskStatus, Tier};
use playbook_store::MemoryWrite;

use crate::engine::{MemoryEngine, validate_key};

/// Priority of a freshly created plan.
pub const PLAN_PRIORITY: i64 = 80;

#[derive(Debug, Clone, Deserialize)]
pub struct TaskSpec {
    pub key: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<i64>,
    /// Keys of sibling tasks, un-namespaced.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskGraphRequest {
    pub plan_key: String,
    pub plan_summary: String,
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskGraphOutcome {
    pub plan: Memory,
    pub task_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskUpdateOutcome {
    pub task: Memory,
    /// Set when the update completed the parent plan.
    pub parent_completed: Option<String>,
}

fn task_key(plan_key: &str, key: &str) -> String {
    format!("{plan_key}/{key}")
}

impl TaskGraphRequest {
    /// Checked before any write so a bad request leaves the store untouched.
    fn validate(&self) -> Result<()> {
        validate_key(&self.plan_key)?;
        if self.tasks.is_empty() {
            return Err(PlaybookError::Validation("tasks must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if task.key.trim().is_empty() {
                return Err(PlaybookError::Validation("task key must not be empty".into()));
            }
            if !seen.insert(task.key.as_str()) {
                return Err(PlaybookError::Validation(format!(
                    "duplicate task key '{}'",
                    task.key
                )));
            }
        }
        Ok(())
    }
}

impl MemoryEngine {
    /// Create a plan and its tasks in one batch.
    pub fn create_task_graph(&self, req: &TaskGraphRequest) -> Result<TaskGraphOutcome> {
        req.validate()?;

        let task_keys: Vec<String> = req
            .tasks
            .iter()
            .map(|t| task_key(&req.plan_key, &t.key))
            .collect();
        for key in &task_keys {
            self.check_parent_link(key, &req.plan_key)?;
        }

        let now = Utc::now();
        let tags = req.tags.clone().unwrap_or_default();
        let plan = self.db.upsert_memory(
            &self.playbook_id,
            &req.plan_key,
            &MemoryWrite {
                value: Some(json!({ "summary": req.plan_summary, "task_keys": task_keys })),
                tags: Some(tags.clone()),
                tier: Some(Tier::Working),
                priority: Some(PLAN_PRIORITY),
                summary: Some(req.plan_summary.clone()),
                memory_type: Some(MemoryType::Hierarchical),
                status: Some(TaskStatus::Pending),
                metadata: Some(json!({
                    "type": "task_graph",
                    "total_tasks": req.tasks.len(),
                    "completed_tasks": 0,
                })),
                ..Default::default()
            },
            now,
        )?;

        for (task, key) in req.tasks.iter().zip(&task_keys) {
            let depends_on: Vec<String> = task
                .depends_on
                .iter()
                .map(|d| task_key(&req.plan_key, d))
                .collect();
            self.db.upsert_memory(
                &self.playbook_id,
                key,
                &MemoryWrite {
                    value: Some(json!({ "description": task.description, "result": Value::Null })),
                    tags: Some(tags.clone()),
                    description: Some(task.description.clone()),
                    priority: Some(clamp_priority(task.priority.unwrap_or(DEFAULT_PRIORITY))),
                    parent_key: Some(req.plan_key.clone()),
                    summary: Some(task.description.clone()).filter(|d| !d.is_empty()),
                    memory_type: Some(MemoryType::Hierarchical),
                    status: Some(TaskStatus::Pending),
                    metadata: Some(json!({ "depends_on": depends_on })),
                    ..Default::default()
                },
                now,
            )?;
        }

        info!(playbook = %self.playbook_id, plan = %req.plan_key, tasks = task_keys.len(), "task graph created");
        Ok(TaskGraphOutcome { plan, task_keys })
    }

    /// Set a task's status. Completing the last unfinished child completes
    /// the parent, one level up only.
    pub fn update_task_status(
        &self,
        key: &str,
        status: TaskStatus,
        result: Option<&Value>,
        summary: Option<&str>,
    ) -> Result<TaskUpdateOutcome> {
        let now = Utc::now();
        let task = self
            .db
            .update_task(&self.playbook_id, key, status, result, summary, now)?
            .ok_or_else(|| PlaybookError::not_found("Memory", key))?;

        let mut parent_completed = None;
        if let Some(parent) = &task.parent_key {
            self.db.refresh_completed_count(&self.playbook_id, parent)?;
            if status == TaskStatus::Completed
                && self.db.complete_parent_if_done(&self.playbook_id, parent, now)?
            {
                info!(playbook = %self.playbook_id, parent = %parent, "all tasks completed, parent completed");
                parent_completed = Some(parent.clone());
            }
        }

        Ok(TaskUpdateOutcome {
            task,
            parent_completed,
        })
    }
}
