//! # playbook-cli
//!
//! Command-line interface for the playbook MCP server.
//!
//! ## Commands
//!
//! - `playbook-mcp serve`: Run the HTTP protocol endpoint
//! - `playbook-mcp config`: Show the effective configuration
//! - `playbook-mcp playbook`: Create and list playbooks
//! - `playbook-mcp key`: Issue, list, and revoke API keys
//! - `playbook-mcp completions`: Generate shell completions

pub mod commands;

pub use commands::Cli;
