use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use playbook_core::PlaybookError;

use crate::schema::PlaybookConfig;

/// Loads and optionally hot-reloads the server configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<PlaybookConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > PLAYBOOK_CONFIG env > ~/.playbook/playbook.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("PLAYBOOK_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".playbook")
            .join("playbook.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> playbook_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read_file(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            PlaybookConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(PlaybookError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    fn read_file(path: &Path) -> playbook_core::Result<PlaybookConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<PlaybookConfig>(&raw).map_err(|e| {
            PlaybookError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> PlaybookConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<PlaybookConfig>> {
        Arc::clone(&self.config)
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (PLAYBOOK_LISTEN, PLAYBOOK_DB_PATH, etc.)
    fn apply_env_overrides(mut config: PlaybookConfig) -> PlaybookConfig {
        if let Ok(v) = std::env::var("PLAYBOOK_LISTEN") {
            config.server.listen = v;
        }
        if let Ok(v) = std::env::var("PLAYBOOK_DB_PATH") {
            config.store.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("PLAYBOOK_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("PLAYBOOK_LOCK_TTL_SECS") {
            match v.parse::<u64>() {
                Ok(ttl) => config.canvas.lock_ttl_secs = ttl,
                Err(_) => warn!(value = %v, "ignoring non-numeric PLAYBOOK_LOCK_TTL_SECS"),
            }
        }
        config
    }

    /// Reload the config from disk.
    pub fn reload(&self) -> playbook_core::Result<()> {
        if !self.config_path.exists() {
            return Err(PlaybookError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read_file(&self.config_path)?);
        new_config.validate().map_err(PlaybookError::Config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    /// Start a background file watcher that swaps in the new config when the file changes.
    /// Returns a handle to the watcher (must be kept alive for watching to continue).
    pub fn watch(&self) -> playbook_core::Result<notify::RecommendedWatcher> {
        let config = Arc::clone(&self.config);
        let path_for_event = self.config_path.clone();

        info!(config_path = ?self.config_path, "starting config file watcher");

        let mut watcher =
            notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let is_our_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == path_for_event.file_name());
                    if !is_our_file {
                        return;
                    }

                    info!("config file changed, reloading");
                    match Self::read_file(&path_for_event) {
                        Ok(new_config) => {
                            let new_config = Self::apply_env_overrides(new_config);
                            if let Err(e) = new_config.validate() {
                                warn!(error = %e, "config file has errors, keeping current config");
                                return;
                            }
                            *config.write() = new_config;
                            info!("configuration hot-reloaded successfully");
                        }
                        Err(e) => {
                            warn!(error = %e, "config file has errors, keeping current config");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "file watcher error");
                }
            })
            .map_err(|e| PlaybookError::Config(format!("failed to create file watcher: {}", e)))?;

        // Watch the parent directory (some editors create temp files + rename)
        let watch_path = self.config_path.parent().unwrap_or(Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| {
                PlaybookError::Config(format!("failed to watch config directory: {}", e))
            })?;

        Ok(watcher)
    }
}
