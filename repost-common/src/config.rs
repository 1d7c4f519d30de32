//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration only: where the data lives and how loudly to log.
//! Engine tunables live in the database `settings` table (see `db::init`).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "REPOST_ROOT_FOLDER";

/// Database file name used when the TOML config does not name one
pub const DEFAULT_DATABASE_FILE: &str = "repost.db";

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. "info" or "repost_engine=debug"
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Contents of `config.toml`
///
/// Every field is optional; a missing file yields `TomlConfig::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub database_file: Option<String>,
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Parse a TOML document
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load from an explicit path, failing on unreadable or malformed files
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Load the TOML config, degrading to defaults when it is missing or broken
    ///
    /// A missing config file is normal (first run). A malformed one is
    /// reported and ignored so a typo never prevents startup. Nothing is
    /// logged here: callers that load config before installing a subscriber
    /// log the returned notice afterwards.
    pub fn load_with_notice(explicit: Option<&Path>) -> (Self, ConfigNotice) {
        let path = match explicit {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => return (Self::default(), ConfigNotice::NoConfigDir),
            },
        };

        if !path.exists() {
            return (Self::default(), ConfigNotice::Missing(path));
        }

        match Self::load(&path) {
            Ok(config) => (config, ConfigNotice::Loaded(path)),
            Err(e) => (
                Self::default(),
                ConfigNotice::Ignored {
                    path,
                    reason: e.to_string(),
                },
            ),
        }
    }

    /// `load_with_notice`, logging the notice immediately
    pub fn load_or_default(explicit: Option<&Path>) -> Self {
        let (config, notice) = Self::load_with_notice(explicit);
        notice.log();
        config
    }
}

/// How the TOML config was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigNotice {
    Loaded(PathBuf),
    Missing(PathBuf),
    NoConfigDir,
    Ignored { path: PathBuf, reason: String },
}

impl ConfigNotice {
    pub fn log(&self) {
        match self {
            ConfigNotice::Loaded(path) => info!("Loaded config from {}", path.display()),
            ConfigNotice::Missing(path) => {
                info!("No config file at {}, using defaults", path.display())
            }
            ConfigNotice::NoConfigDir => {
                warn!("Could not determine config directory, using defaults")
            }
            ConfigNotice::Ignored { path, reason } => {
                warn!("Ignoring config file {}: {}", path.display(), reason)
            }
        }
    }
}

/// Default location of `config.toml` for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("repost-engine").join("config.toml"))
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("repost-engine"))
        .unwrap_or_else(|| PathBuf::from("./repost_data"))
}

/// Root folder resolution, highest priority first:
/// 1. Command-line argument
/// 2. `REPOST_ROOT_FOLDER` environment variable
/// 3. TOML `root_folder`
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Database file inside the root folder
pub fn database_path(root_folder: &Path, toml_config: &TomlConfig) -> PathBuf {
    let file = toml_config
        .database_file
        .as_deref()
        .unwrap_or(DEFAULT_DATABASE_FILE);
    root_folder.join(file)
}

/// Create the root folder if it does not exist yet
pub fn ensure_root_folder(root_folder: &Path) -> Result<()> {
    if !root_folder.exists() {
        std::fs::create_dir_all(root_folder)?;
        info!("Created root folder: {}", root_folder.display());
    }
    Ok(())
}
