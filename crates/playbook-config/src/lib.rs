//! # playbook-config
//!
//! Configuration for the playbook MCP server. Reads from `playbook.toml`, environment
//! variables, and CLI overrides, in that precedence order.
//!
//! Supports hot-reload via filesystem watcher.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::PlaybookConfig;
pub use schema::{CanvasConfig, ConfigWarning, McpConfig, MemoryConfig, WarningSeverity};
