//! chanplay-ap specific configuration

use crate::error::{Error, Result};
use chanplay_common::config::TomlConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Bytes per copy step from a playback stream into the output sink (20 ms of PCM)
pub const DEFAULT_COPY_CHUNK_BYTES: usize = 3840;

/// Largest accepted lookahead; each slot may hold a fully cached item
pub const MAX_PRELOAD_WINDOW: usize = 64;

/// Per-worker runtime configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of resolved requests waiting ahead of the current one
    pub preload_window: usize,
    /// Upper bound on waiting for in-flight resolutions while a skip drains
    pub skip_drain_timeout: Duration,
    pub event_capacity: usize,
    pub copy_chunk_bytes: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            preload_window: 2,
            skip_drain_timeout: Duration::from_millis(1000),
            event_capacity: 100,
            copy_chunk_bytes: DEFAULT_COPY_CHUNK_BYTES,
        }
    }
}

impl WorkerConfig {
    pub fn with_preload_window(mut self, preload_window: usize) -> Self {
        self.preload_window = preload_window;
        self
    }

    pub fn with_skip_drain_timeout(mut self, timeout: Duration) -> Self {
        self.skip_drain_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.preload_window == 0 {
            return Err(Error::Config("preload_window must be at least 1".to_string()));
        }
        if self.preload_window > MAX_PRELOAD_WINDOW {
            return Err(Error::Config(format!(
                "preload_window must be at most {}, got {}",
                MAX_PRELOAD_WINDOW, self.preload_window
            )));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        if self.copy_chunk_bytes == 0 {
            return Err(Error::Config("copy_chunk_bytes must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Audio player service configuration, resolved from TOML plus CLI overrides
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub output_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub store_database: Option<PathBuf>,
    pub enable_debug_sources: bool,
    pub realtime_output: bool,
    pub allowed_hosts: Vec<String>,
    pub log_level: String,
    pub worker: WorkerConfig,
}

impl Config {
    pub fn from_toml(toml: TomlConfig) -> Self {
        Self {
            port: toml.port,
            output_dir: toml.output_dir,
            ffmpeg_path: toml.ffmpeg_path,
            store_database: toml.store_database,
            enable_debug_sources: toml.enable_debug_sources,
            realtime_output: toml.realtime_output,
            allowed_hosts: toml.allowed_hosts,
            log_level: toml.logging.level,
            worker: WorkerConfig {
                preload_window: toml.preload_window,
                skip_drain_timeout: Duration::from_millis(toml.skip_drain_timeout_ms),
                event_capacity: toml.event_capacity,
                copy_chunk_bytes: DEFAULT_COPY_CHUNK_BYTES,
            },
        }
    }
}
