//! # playbook-store
//!
//! The persistent store behind the playbook server: one SQLite database holding
//! playbooks, personas, skills and their attachments, linked tool servers, API keys,
//! memories, and canvas documents.
//!
//! Every operation is a single statement or a short transaction on one connection.
//! Operations that must not race (section locks, lock-guarded patches, parent
//! auto-completion, promotion) are expressed as conditional statements so the
//! check and the write happen together.

pub mod canvas;
pub mod db;
pub mod keys;
pub mod memories;
pub mod playbooks;

pub use db::Database;
pub use canvas::LockGuard;
pub use keys::ApiKeyRow;
pub use memories::{ArchiveFilter, MemoryFilter, MemoryWrite};
pub use playbooks::{PlaybookUpdate, SkillDraft, SkillUpdate};
