use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::PlaybookError;

/// Lowest and highest priority a memory can carry.
pub const MIN_PRIORITY: i64 = 1;
pub const MAX_PRIORITY: i64 = 100;
pub const DEFAULT_PRIORITY: i64 = 50;

/// Clamp a requested priority into the valid range.
pub fn clamp_priority(priority: i64) -> i64 {
    priority.clamp(MIN_PRIORITY, MAX_PRIORITY)
}

/// Memory tier: how close to the agent's active context a memory sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Working,
    Contextual,
    Longterm,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Working, Tier::Contextual, Tier::Longterm];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Working => "working",
            Tier::Contextual => "contextual",
            Tier::Longterm => "longterm",
        }
    }

    /// Ordering used by promotion: longterm (0) < contextual (1) < working (2).
    pub fn rank(&self) -> u8 {
        match self {
            Tier::Longterm => 0,
            Tier::Contextual => 1,
            Tier::Working => 2,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = PlaybookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "working" => Ok(Tier::Working),
            "contextual" => Ok(Tier::Contextual),
            "longterm" => Ok(Tier::Longterm),
            other => Err(PlaybookError::Validation(format!(
                "unknown tier '{other}' (expected working, contextual, or longterm)"
            ))),
        }
    }
}

/// Whether a memory is a plain entry or a node of a task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Flat,
    Hierarchical,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Flat => "flat",
            MemoryType::Hierarchical => "hierarchical",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = PlaybookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(MemoryType::Flat),
            "hierarchical" => Ok(MemoryType::Hierarchical),
            other => Err(PlaybookError::Validation(format!(
                "unknown memory_type '{other}' (expected flat or hierarchical)"
            ))),
        }
    }
}

/// Status of a task-graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Blocked => "blocked",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = PlaybookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "blocked" => Ok(TaskStatus::Blocked),
            other => Err(PlaybookError::Validation(format!(
                "unknown status '{other}' (expected pending, running, completed, failed, or blocked)"
            ))),
        }
    }
}

/// A single memory row, scoped to a playbook and unique by key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub tier: Tier,
    pub priority: i64,
    pub parent_key: Option<String>,
    pub summary: Option<String>,
    pub memory_type: MemoryType,
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub metadata: Value,
    /// `"permanent"` exempts the memory from archival.
    pub retention_policy: Option<String>,
    pub access_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// Summary if one was written, otherwise the bracketed key.
    pub fn summary_or_key(&self) -> String {
        match &self.summary {
            Some(s) if !s.is_empty() => s.clone(),
            _ => format!("[{}]", self.key),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.retention_policy.as_deref() == Some("permanent")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_rank_orders_longterm_lowest() {
        assert!(Tier::Longterm.rank() < Tier::Contextual.rank());
        assert!(Tier::Contextual.rank() < Tier::Working.rank());
    }

    #[test]
    fn parse_rejects_unknown_values() {
        assert!("archive".parse::<Tier>().is_err());
        assert!("done".parse::<TaskStatus>().is_err());
        assert_eq!("hierarchical".parse::<MemoryType>().unwrap(), MemoryType::Hierarchical);
    }

    #[test]
    fn priority_is_clamped() {
        assert_eq!(clamp_priority(0), 1);
        assert_eq!(clamp_priority(250), 100);
        assert_eq!(clamp_priority(42), 42);
    }
}
