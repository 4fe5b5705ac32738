//! # playbook-mcp
//!
//! The protocol core: everything between a parsed HTTP request and the engines.
//!
//! - [`dispatcher::McpServer`] routes JSON-RPC methods and builds the discovery manifest.
//! - [`executor::PlaybookToolExecutor`] resolves tool names (built-ins, skills,
//!   linked tool servers) and enforces per-tool permissions.
//! - [`registry`] is the static table of built-in tools.
//! - [`resources`] maps `playbook://` URIs to store reads.
//! - [`auth::ApiKeyAuthorizer`] checks hashed bearer keys.

pub mod auth;
pub mod dispatcher;
pub mod executor;
pub mod external;
pub mod handlers;
pub mod manifest;
pub mod protocol;
pub mod registry;
pub mod resources;

pub use auth::{ApiKeyAuthorizer, IssuedKey};
pub use dispatcher::{McpServer, RpcOutcome};
pub use executor::PlaybookToolExecutor;
pub use protocol::{JsonRpcRequest, JsonRpcResponse, RpcError};
pub use registry::{BUILTIN_TOOLS, ToolEnv, ToolSpec};
