use thiserror::Error;

/// JSON-RPC error codes surfaced by the protocol endpoint.
pub mod codes {
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const TOOL_EXECUTION: i64 = -32000;
    pub const PLAYBOOK_NOT_FOUND: i64 = -32001;
    pub const RESOURCE_NOT_FOUND: i64 = -32002;
}

/// Unified error type for the playbook server.
#[derive(Error, Debug)]
pub enum PlaybookError {
    // ── Protocol errors ────────────────────────────────────────
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    // ── Lookup errors ──────────────────────────────────────────
    #[error("playbook not found: {0}")]
    PlaybookNotFound(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    // ── Access errors ──────────────────────────────────────────
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    // ── Argument errors ────────────────────────────────────────
    #[error("invalid arguments: {0}")]
    Validation(String),

    // ── Canvas lock conflicts ──────────────────────────────────
    #[error("Section is locked by {holder}")]
    Locked { holder: String },

    // ── Tool errors ────────────────────────────────────────────
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool execution failed: {tool}: {reason}")]
    ToolExecution { tool: String, reason: String },

    // ── Store errors ───────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PlaybookError {
    /// Shorthand for a missing entity of the given kind.
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// The JSON-RPC error code this error maps to when it escapes the dispatcher
    /// directly. Errors raised inside `tools/call` are always reported as
    /// [`codes::TOOL_EXECUTION`] instead.
    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::InvalidRequest(_) => codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => codes::METHOD_NOT_FOUND,
            Self::PlaybookNotFound(_) => codes::PLAYBOOK_NOT_FOUND,
            Self::ResourceNotFound(_) => codes::RESOURCE_NOT_FOUND,
            _ => codes::TOOL_EXECUTION,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlaybookError>;
