//! # playbook-core
//!
//! Core types, traits, and primitives for the playbook MCP server.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! memories and task graphs, canvas documents, playbooks and their skills, tool
//! descriptors, and the authorization seam.

pub mod auth;
pub mod canvas;
pub mod error;
pub mod memory;
pub mod playbook;
pub mod tool;

pub use auth::{Authorizer, Permission, Principal};
pub use canvas::{CanvasDocument, CanvasSection, CanvasSummary};
pub use error::{PlaybookError, Result};
pub use memory::{Memory, MemoryType, TaskStatus, Tier};
pub use playbook::{Persona, Playbook, Skill, SkillAttachment, ToolServer, Visibility};
pub use tool::{CallContext, Tool, ToolCall, ToolExecutor, ToolResult};
