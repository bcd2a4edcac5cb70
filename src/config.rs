use barralibre_core::sync::DEFAULT_KEEP_REVISIONS;
use barralibre_core::ScalarPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Where backups are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncBackend {
    /// A local (or externally synced) directory
    Folder,
    /// Google Drive app data folder
    Drive,
}

impl std::fmt::Display for SyncBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncBackend::Folder => write!(f, "folder"),
            SyncBackend::Drive => write!(f, "drive"),
        }
    }
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Back up after writes and pull before reads (default: false)
    #[serde(default)]
    pub auto_sync: bool,
    /// Backup provider; inferred as `folder` when only `folder` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<SyncBackend>,
    /// Backup directory for the folder backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<PathBuf>,
    /// Seconds of quiet after a save before the backup runs
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    /// Which side provides program, phase and settings when merging
    #[serde(default)]
    pub scalar_policy: ScalarPolicy,
    /// OAuth client for the drive backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,
    /// Revisions kept by the folder backend
    #[serde(default = "default_keep_revisions")]
    pub keep_revisions: usize,
}

fn default_debounce_secs() -> u64 {
    3
}

fn default_keep_revisions() -> usize {
    DEFAULT_KEEP_REVISIONS
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync: false,
            backend: None,
            folder: None,
            debounce_secs: default_debounce_secs(),
            scalar_policy: ScalarPolicy::default(),
            client_id: None,
            client_secret: None,
            keep_revisions: default_keep_revisions(),
        }
    }
}

impl SyncConfig {
    /// The backend in use, if any is configured.
    pub fn effective_backend(&self) -> Option<SyncBackend> {
        match self.backend {
            Some(backend) => Some(backend),
            None if self.folder.is_some() => Some(SyncBackend::Folder),
            None => None,
        }
    }

    /// Returns true if a backend is selected and has what it needs.
    pub fn is_configured(&self) -> bool {
        match self.effective_backend() {
            Some(SyncBackend::Folder) => self.folder.is_some(),
            Some(SyncBackend::Drive) => self.client_id.is_some(),
            None => false,
        }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory holding the local document and OAuth tokens
    pub data_dir: ConfigValue<PathBuf>,
    /// Directory holding programs.json and the built-in programs
    pub programs_dir: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    /// Sync configuration
    pub sync: SyncConfig,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    data_dir: Option<PathBuf>,
    programs_dir: Option<PathBuf>,
    sync: Option<SyncConfig>,
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut data_dir = ConfigValue::new(Self::default_data_dir(), ConfigSource::Default);
        let mut programs_dir = None;
        let mut config_file = None;
        let mut sync = SyncConfig::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(dir) = file_config.data_dir {
                data_dir = ConfigValue::new(resolve(&path, dir), ConfigSource::File);
            }
            if let Some(dir) = file_config.programs_dir {
                programs_dir = Some(ConfigValue::new(resolve(&path, dir), ConfigSource::File));
            }
            if let Some(sync_config) = file_config.sync {
                sync = sync_config;
                sync.folder = sync.folder.map(|folder| resolve(&path, folder));
            }
        }

        // Environment overrides
        if let Ok(dir) = std::env::var("BARRA_DATA_DIR") {
            data_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }
        if let Ok(dir) = std::env::var("BARRA_PROGRAMS_DIR") {
            programs_dir = Some(ConfigValue::new(
                PathBuf::from(dir),
                ConfigSource::Environment,
            ));
        }
        if let Ok(folder) = std::env::var("BARRA_SYNC_FOLDER") {
            sync.folder = Some(PathBuf::from(folder));
        }
        if let Ok(value) = std::env::var("BARRA_AUTO_SYNC") {
            match parse_bool(&value) {
                Some(enabled) => sync.auto_sync = enabled,
                None => tracing::warn!("Ignoring invalid BARRA_AUTO_SYNC value '{}'", value),
            }
        }
        if let Ok(id) = std::env::var("BARRA_CLIENT_ID") {
            sync.client_id = Some(id);
        }
        if let Ok(secret) = std::env::var("BARRA_CLIENT_SECRET") {
            sync.client_secret = Some(secret);
        }

        // Programs live next to the data unless configured otherwise
        let programs_dir = programs_dir.unwrap_or_else(|| {
            ConfigValue::new(data_dir.value.join("programs"), ConfigSource::Default)
        });

        Ok(Self {
            data_dir,
            programs_dir,
            config_file,
            sync,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/barralibre/
    /// - macOS: ~/Library/Application Support/barralibre/
    /// - Windows: %APPDATA%/barralibre/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("barralibre")
    }

    /// Default data directory (platform-specific):
    /// - Linux: ~/.local/share/barralibre/
    /// - macOS: ~/Library/Application Support/barralibre/
    /// - Windows: %APPDATA%/barralibre/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("barralibre")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

/// Resolves relative paths against the config file's directory
fn resolve(config_path: &Path, value: PathBuf) -> PathBuf {
    if value.is_relative() {
        config_path
            .parent()
            .map(|p| p.join(&value))
            .unwrap_or(value)
    } else {
        value
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
