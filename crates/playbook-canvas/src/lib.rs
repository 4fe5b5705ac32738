//! # playbook-canvas
//!
//! Canvas documents are markdown split into heading-delimited sections. Agents
//! patch one section at a time and may take a soft, expiring lock on a section
//! while they work on it. The stored document content is always the rendering
//! of its sections in order.

pub mod engine;
pub mod parser;

pub use engine::{CanvasEngine, TocEntry};
pub use parser::{parse_sections, render};
