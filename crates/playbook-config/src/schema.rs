use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration, maps to `playbook.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybookConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub mcp: McpConfig,
    pub memory: MemoryConfig,
    pub canvas: CanvasConfig,
    pub logging: LoggingConfig,
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP endpoint to.
    pub listen: String,
    /// Enable permissive CORS (browser-based agents).
    pub cors: bool,
    pub rate_limit: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3800".into(),
            cors: false,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Per-client token bucket applied to the protocol routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Maximum burst size (tokens in the bucket).
    pub burst: u32,
    /// Tokens refilled per second.
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            burst: 60,
            refill_per_sec: 10.0,
        }
    }
}

// ── Store ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".playbook")
                .join("playbook.db"),
        }
    }
}

// ── Protocol ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct McpConfig {
    /// Protocol version reported by `initialize` and discovery.
    pub protocol_version: String,
    /// `serverInfo.name`.
    pub server_name: String,
    /// Prefix of the generated per-skill tools.
    pub skill_tool_prefix: String,
    /// Timeout for proxied calls to linked external tool servers.
    pub external_timeout_secs: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            protocol_version: "2024-11-05".into(),
            server_name: "playbook-mcp".into(),
            skill_tool_prefix: "skill_".into(),
            external_timeout_secs: 30,
        }
    }
}

// ── Memory ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Default `max_items` per tier for `get_memory_context`.
    pub context_max_items: usize,
    /// Default `max_depth` for `get_memory_tree`.
    pub tree_max_depth: usize,
    /// Upper bound on any caller-supplied `max_depth`.
    pub tree_max_depth_limit: usize,
    /// Default result cap for `search_memory`.
    pub search_limit: usize,
    /// Reject `parent_key` writes that would close a cycle.
    pub validate_parent_links: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            context_max_items: 20,
            tree_max_depth: 3,
            tree_max_depth_limit: 32,
            search_limit: 50,
            validate_parent_links: true,
        }
    }
}

// ── Canvas ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    /// Seconds a section lock stays fresh.
    pub lock_ttl_secs: u64,
    /// Reject patches to sections freshly locked by another agent.
    /// When false, such patches only log a warning.
    pub enforce_locks: bool,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            lock_ttl_secs: 300,
            enforce_locks: true,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
    /// Log file path (None = stdout only).
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            file: None,
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "note",
        };
        write!(f, "{}: {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({})", h)?;
        }
        Ok(())
    }
}

impl PlaybookConfig {
    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Listen address ───
        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: format!("'{}' is not a socket address", self.server.listen),
                severity: WarningSeverity::Error,
                hint: Some("Use host:port, e.g. 127.0.0.1:3800".into()),
            });
        }

        // ── Rate limit ───
        if self.server.rate_limit.enabled && self.server.rate_limit.burst == 0 {
            warnings.push(ConfigWarning {
                field: "server.rate_limit.burst".into(),
                message: "burst is 0: every request would be rejected".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set burst >= 1 or disable rate limiting".into()),
            });
        }
        if self.server.rate_limit.refill_per_sec < 0.0 {
            warnings.push(ConfigWarning {
                field: "server.rate_limit.refill_per_sec".into(),
                message: "refill rate is negative".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        // ── Skill prefix ───
        let prefix = &self.mcp.skill_tool_prefix;
        if prefix.is_empty() {
            warnings.push(ConfigWarning {
                field: "mcp.skill_tool_prefix".into(),
                message: "prefix is empty: skill tools would shadow built-in names".into(),
                severity: WarningSeverity::Error,
                hint: Some("The default is 'skill_'".into()),
            });
        } else if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            warnings.push(ConfigWarning {
                field: "mcp.skill_tool_prefix".into(),
                message: format!("prefix '{}' contains characters not allowed in tool names", prefix),
                severity: WarningSeverity::Warning,
                hint: Some("Use letters, digits, '_' or '-'".into()),
            });
        }

        // ── Memory defaults ───
        if self.memory.context_max_items == 0 {
            warnings.push(ConfigWarning {
                field: "memory.context_max_items".into(),
                message: "0: get_memory_context will return nothing unless callers pass max_items".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }
        if self.memory.tree_max_depth > self.memory.tree_max_depth_limit {
            warnings.push(ConfigWarning {
                field: "memory.tree_max_depth".into(),
                message: format!(
                    "{} exceeds tree_max_depth_limit ({}); trees are cut at the limit",
                    self.memory.tree_max_depth, self.memory.tree_max_depth_limit
                ),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }
        if !self.memory.validate_parent_links {
            warnings.push(ConfigWarning {
                field: "memory.validate_parent_links".into(),
                message: "parent cycles are not rejected; tree traversal stops at repeated keys".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }

        // ── Canvas locks ───
        if self.canvas.lock_ttl_secs == 0 {
            warnings.push(ConfigWarning {
                field: "canvas.lock_ttl_secs".into(),
                message: "0: every section lock is immediately stale".into(),
                severity: WarningSeverity::Warning,
                hint: Some("The default is 300 (5 minutes)".into()),
            });
        }

        // ── Logging format ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        // ── Logging level ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
