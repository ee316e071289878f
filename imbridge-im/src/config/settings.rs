//! Settings configuration
//!
//! Manages user-configurable settings for the bridge.
//! Default values are defined in `config/default.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use directories::ProjectDirs;
use imbridge_core::DetectOptions;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default configuration TOML embedded from config/default.toml
const DEFAULT_CONFIG_TOML: &str = include_str!("../../config/default.toml");

/// Configuration settings for the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Context selection
    pub context: ContextSettings,
    /// Input method backend behaviour
    pub backend: BackendSettings,
    /// Surrounding text served to the input method
    pub surrounding: SurroundingSettings,
    /// Logging
    pub logging: LoggingSettings,
}

/// Context selection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Password fields and IME-disabled editors use the simple context
    /// instead of the dummy one
    pub use_simple_context_on_password_field: bool,
}

/// Backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSettings {
    /// uim consumes keys through a key snooper
    pub uim_uses_key_snooper: bool,
    /// Treat every backend as synchronous
    pub force_sync_mode: bool,
}

/// Surrounding text settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurroundingSettings {
    /// Characters served on each side of the caret
    pub max_paragraph_chars: usize,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        // The embedded file is covered by test_default_settings.
        toml::from_str(DEFAULT_CONFIG_TOML).unwrap_or_else(|e| {
            warn!("embedded default.toml is invalid: {}", e);
            Self {
                context: ContextSettings {
                    use_simple_context_on_password_field: true,
                },
                backend: BackendSettings {
                    uim_uses_key_snooper: true,
                    force_sync_mode: false,
                },
                surrounding: SurroundingSettings {
                    max_paragraph_chars: 1024,
                },
                logging: LoggingSettings {
                    filter: "warn".to_string(),
                },
            }
        })
    }
}

impl Settings {
    /// Backend detection options derived from these settings
    pub fn detect_options(&self) -> DetectOptions {
        DetectOptions {
            uim_uses_key_snooper: self.backend.uim_uses_key_snooper,
            force_sync_mode: self.backend.force_sync_mode,
        }
    }
}

/// Recursively merge `overlay` TOML values on top of `base`.
fn merge_toml(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(key) {
                    merge_toml(base_value, value);
                } else {
                    base_table.insert(key.clone(), value.clone());
                }
            }
        }
        (base, _) => {
            *base = overlay.clone();
        }
    }
}

/// Parse user TOML content merged on top of default.toml.
fn parse_with_defaults(user_content: &str) -> Result<Settings> {
    let mut base: toml::Value = toml::from_str(DEFAULT_CONFIG_TOML)?;
    let user: toml::Value = toml::from_str(user_content)?;
    merge_toml(&mut base, &user);
    let settings: Settings = base.try_into()?;
    Ok(settings)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "imbridge", "imbridge")
}

impl Settings {
    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load settings from the default configuration file.
    /// Falls back to embedded default.toml if the config file does not exist.
    pub fn load() -> Result<Self> {
        let Some(config_file) = Self::config_file() else {
            warn!("Could not determine config directory, using defaults");
            return Ok(Self::default());
        };

        if !config_file.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        debug!("Loading config from {:?}", config_file);
        let content = fs::read_to_string(&config_file)?;
        parse_with_defaults(&content)
    }

    /// Load settings from a specific file, merged on top of defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        parse_with_defaults(&content)
    }

    /// Save settings to the default configuration file
    pub fn save(&self) -> Result<()> {
        let Some(config_file) = Self::config_file() else {
            anyhow::bail!("Could not determine config directory");
        };
        debug!("Saving config to {:?}", config_file);
        self.save_to(&config_file)
    }

    /// Save settings to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
