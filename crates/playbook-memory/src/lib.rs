//! # playbook-memory
//!
//! The memory tier engine behind the `*_memory` tools and the `memory` resource.
//!
//! Memories live in three tiers:
//!
//! - **working**: what the agent is actively using; served with full values.
//! - **contextual**: consolidated or promoted background; served as summaries.
//! - **longterm**: archived material, excluded from the default context view.
//!
//! Memories may point at a parent to form a forest. A task graph is a plan
//! memory whose children are tasks; completing the last task completes the plan.

pub mod engine;
pub mod tasks;
pub mod tree;

pub use engine::{
    ArchiveRequest, ConsolidateOutcome, ConsolidateRequest, ContextItem, ContextRequest,
    ContextView, MemoryEngine, PromoteOutcome, SearchQuery, WriteOutcome,
};
pub use tasks::{TaskGraphOutcome, TaskGraphRequest, TaskSpec, TaskUpdateOutcome};
pub use tree::TreeNode;
