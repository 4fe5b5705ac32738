//! Built-in tool handlers. Each submodule pairs typed argument structs and
//! handler functions with a `schemas` module holding the advertised input schemas.

pub mod canvas;
pub mod memory;
pub mod skills;
