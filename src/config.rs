use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::DEFAULT_MAX_PERMANENT_FAILURES;

const APP_DIR: &str = "finca";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::Default => "default",
            ConfigSource::File => "file",
            ConfigSource::Environment => "environment",
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A setting together with where it came from.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    fn fallback(value: T) -> Self {
        Self::new(value, ConfigSource::Default)
    }

    fn override_with(&mut self, value: Option<T>, source: ConfigSource) {
        if let Some(value) = value {
            *self = Self::new(value, source);
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_max_permanent_failures() -> usize {
    DEFAULT_MAX_PERMANENT_FAILURES
}

/// Where and how records are mirrored. Without both `server_url` and
/// `api_key` the CLI runs offline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub server_url: Option<String>,
    pub api_key: Option<String>,
    /// Per-request timeout; also bounds the wait for background mirrors at exit.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Pause between sweeps in `sync --watch`.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Consecutive non-transient failures before a record is quarantined.
    #[serde(default = "default_max_permanent_failures")]
    pub max_permanent_failures: usize,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_permanent_failures: default_max_permanent_failures(),
        }
    }
}

impl RemoteConfig {
    pub fn is_configured(&self) -> bool {
        self.server_url.is_some() && self.api_key.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub database_path: ConfigValue<PathBuf>,
    /// Acting user recorded as `created_by` on new records.
    pub created_by: ConfigValue<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub remote: RemoteConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    created_by: Option<String>,
    remote: Option<RemoteConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: ConfigValue::fallback(Self::default_data_dir().join("finca.db")),
            created_by: ConfigValue::fallback("default".to_string()),
            config_file: None,
            remote: RemoteConfig::default(),
        }
    }
}

impl Config {
    /// Environment beats the config file, which beats built-in defaults.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;
            config.apply_file(&path, file);
        }
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path, file: ConfigFile) {
        // Relative database paths live next to the config file.
        let database_path = file.database_path.map(|db| match path.parent() {
            Some(dir) if db.is_relative() => dir.join(db),
            _ => db,
        });
        self.database_path
            .override_with(database_path, ConfigSource::File);
        self.created_by
            .override_with(file.created_by, ConfigSource::File);
        if let Some(remote) = file.remote {
            self.remote = remote;
        }
        self.config_file = Some(path.to_path_buf());
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        self.database_path.override_with(
            var("FINCA_DATABASE_PATH").map(PathBuf::from),
            ConfigSource::Environment,
        );
        self.created_by
            .override_with(var("FINCA_CREATED_BY"), ConfigSource::Environment);
        if let Some(url) = var("FINCA_REMOTE_URL") {
            self.remote.server_url = Some(url);
        }
        if let Some(key) = var("FINCA_REMOTE_API_KEY") {
            self.remote.api_key = Some(key);
        }
    }

    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
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

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError(_, e) => Some(e),
            ConfigError::ParseError(_, e) => Some(e),
        }
    }
}
