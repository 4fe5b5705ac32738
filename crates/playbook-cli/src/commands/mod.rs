use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use playbook_config::{ConfigLoader, PlaybookConfig};
use playbook_core::{PlaybookError, Result};

mod admin;
mod serve;

/// Playbook MCP server: tiered memory, task graphs, and collaborative canvases for agents
#[derive(Parser)]
#[command(name = "playbook-mcp", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to playbook.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP HTTP endpoint
    Serve {
        /// Listen address, overriding server.listen (e.g. 0.0.0.0:8787)
        #[arg(long)]
        listen: Option<String>,
    },
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create and list playbooks
    Playbook {
        #[command(subcommand)]
        action: PlaybookAction,
    },
    /// Issue, list, and revoke API keys
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum PlaybookAction {
    /// Create a playbook and print its guid
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Markdown file served as the playbook's guide
        #[arg(long)]
        guide: Option<PathBuf>,
        /// Hide the playbook from callers without a key bound to it
        #[arg(long)]
        private: bool,
    },
    /// List all playbooks
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Issue a key bound to one playbook. The secret is printed once.
    Create {
        /// Playbook guid
        playbook_id: String,
        /// Label shown in listings
        #[arg(short, long, default_value = "default")]
        name: String,
        /// Scope to grant: memory:write, skills:write, playbook:write, or * (repeatable)
        #[arg(short = 'p', long = "permission")]
        permissions: Vec<String>,
    },
    /// List a playbook's keys
    List {
        playbook_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Revoke a key by id
    Revoke { key_id: String },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Load config first so logging can honor its format and file settings
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();
        self.init_logging(&config)?;

        match self.command {
            Commands::Serve { listen } => serve::cmd_serve(config_loader, listen).await,
            Commands::Config { json } => Self::cmd_config(&config, json),
            Commands::Playbook { action } => admin::cmd_playbook(&config, action),
            Commands::Key { action } => admin::cmd_key(&config, action),
            Commands::Completions { shell } => Self::cmd_completions(shell),
        }
    }

    /// `RUST_LOG` wins, then --verbose / --quiet / --log-level, then `logging.level`.
    fn init_logging(&self, config: &PlaybookConfig) -> Result<()> {
        let level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level
                .as_deref()
                .unwrap_or(config.logging.level.as_str())
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let writer = match &config.logging.file {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                BoxMakeWriter::new(Arc::new(file))
            }
            None => BoxMakeWriter::new(std::io::stderr),
        };

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer);
        match config.logging.format.as_str() {
            "json" => builder.json().with_target(true).init(),
            "compact" => builder.compact().with_target(false).init(),
            _ => builder.with_target(false).init(),
        }
        Ok(())
    }

    fn cmd_config(config: &PlaybookConfig, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(config).map_err(|e| PlaybookError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    fn cmd_completions(shell: Shell) -> Result<()> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "playbook-mcp", &mut std::io::stdout());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_create_with_scopes() {
        let cli = Cli::try_parse_from([
            "playbook-mcp",
            "key",
            "create",
            "pb-1",
            "-p",
            "memory:write",
            "--permission",
            "skills:write",
        ])
        .unwrap();
        match cli.command {
            Commands::Key {
                action:
                    KeyAction::Create {
                        playbook_id,
                        name,
                        permissions,
                    },
            } => {
                assert_eq!(playbook_id, "pb-1");
                assert_eq!(name, "default");
                assert_eq!(permissions, vec!["memory:write", "skills:write"]);
            }
            _ => panic!("expected key create"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["playbook-mcp", "serve", "--listen", "0.0.0.0:9000", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Serve { listen: Some(ref l) } if l == "0.0.0.0:9000"));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["playbook-mcp", "-v", "-q", "config"]).is_err());
    }
}
