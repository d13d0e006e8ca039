//! Bootstrap configuration loading and config file resolution
//!
//! The bootstrap config is a small TOML file. Every field has a built-in
//! default, so a missing file yields a fully usable configuration.
//!
//! **Resolution order** for the config file path:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`CHANPLAY_CONFIG`)
//! 3. Platform config directory (`<config_dir>/chanplay/config.toml`)
//! 4. Built-in defaults (no file)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the bootstrap config file
pub const CONFIG_ENV_VAR: &str = "CHANPLAY_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    ///
    /// Default: 5750
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory receiving one `<channel>.pcm` file per channel
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Number of requests resolved ahead of the one currently playing
    #[serde(default = "default_preload_window")]
    pub preload_window: usize,

    /// Upper bound for draining the preloaded queue during a skip
    #[serde(default = "default_skip_drain_timeout_ms")]
    pub skip_drain_timeout_ms: u64,

    /// Per-channel event bus capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// ffmpeg binary used for transcoding
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// SQLite database holding stored files (optional)
    #[serde(default)]
    pub store_database: Option<PathBuf>,

    /// Accept `tone:` and `silence:` debug requests
    #[serde(default)]
    pub enable_debug_sources: bool,

    /// Pace sink writes at the PCM byte rate
    #[serde(default = "default_realtime_output")]
    pub realtime_output: bool,

    /// Restrict remote requests to these hosts (empty = any host)
    #[serde(default)]
    pub allowed_hosts: Vec<String>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            output_dir: default_output_dir(),
            preload_window: default_preload_window(),
            skip_drain_timeout_ms: default_skip_drain_timeout_ms(),
            event_capacity: default_event_capacity(),
            ffmpeg_path: default_ffmpeg_path(),
            store_database: None,
            enable_debug_sources: false,
            realtime_output: default_realtime_output(),
            allowed_hosts: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_port() -> u16 {
    5750
}

fn default_output_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("chanplay").join("channels"))
        .unwrap_or_else(|| PathBuf::from("./chanplay_channels"))
}

fn default_preload_window() -> usize {
    2
}

fn default_skip_drain_timeout_ms() -> u64 {
    1000
}

fn default_event_capacity() -> usize {
    100
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_realtime_output() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse a config from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve the config file path and load it, falling back to defaults
    ///
    /// An explicitly named file (CLI or environment) must exist. The platform
    /// default location is optional.
    pub fn load_resolved(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg) {
            ConfigSource::Explicit(path) => Self::load(&path),
            ConfigSource::Platform(path) if path.exists() => Self::load(&path),
            ConfigSource::Platform(path) => {
                debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            ConfigSource::Defaults => {
                debug!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.preload_window == 0 {
            return Err(Error::Config("preload_window must be at least 1".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Where the bootstrap config comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Named on the command line or via `CHANPLAY_CONFIG`
    Explicit(PathBuf),
    /// Platform config directory (may not exist)
    Platform(PathBuf),
    /// No file at all
    Defaults,
}

/// Resolve the config file location
pub fn resolve_config_path(cli_arg: Option<&Path>) -> ConfigSource {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return ConfigSource::Explicit(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return ConfigSource::Explicit(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    match dirs::config_dir() {
        Some(dir) => ConfigSource::Platform(dir.join("chanplay").join("config.toml")),
        None => ConfigSource::Defaults,
    }
}
