//! Runtime configuration
//!
//! Loaded from TOML. Every section has defaults, so an empty file (or no file
//! at all) yields a working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{BUFFER_HEADER_TYPICAL, MAX_INSTANCE};
use crate::error::{Error, Result};

/// Top-level runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub engine: EngineConfig,
    pub buffer_queue: BufferQueueConfig,
    pub logging: LoggingConfig,
}

/// Per-engine limits and worker pool sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum concurrently live child objects (1..=32)
    pub max_instances: usize,
    /// Worker threads executing asynchronous lifecycle work
    pub worker_threads: usize,
    /// Pending asynchronous requests the pool accepts before refusing more
    pub work_queue_capacity: usize,
    /// Worker thread name prefix
    pub thread_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_instances: MAX_INSTANCE,
            worker_threads: 2,
            work_queue_capacity: 16,
            thread_name: "sles-worker".to_string(),
        }
    }
}

/// Buffer queue defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferQueueConfig {
    /// Capacity used when the data locator does not specify one
    pub default_capacity: usize,
}

impl Default for BufferQueueConfig {
    fn default() -> Self {
        Self {
            default_capacity: BUFFER_HEADER_TYPICAL,
        }
    }
}

/// Logging configuration (used by binaries)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: RuntimeConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Load `runtime.toml` from the platform config directory, falling back
    /// to defaults when it does not exist
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => {
                tracing::debug!("Loading runtime config from {}", path.display());
                Self::load(path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Platform config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "sles", "sles-runtime")
            .map(|dirs| dirs.config_dir().join("runtime.toml"))
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.engine.max_instances == 0 || self.engine.max_instances > MAX_INSTANCE {
            return Err(Error::Config(format!(
                "engine.max_instances must be in 1..={}, got {}",
                MAX_INSTANCE, self.engine.max_instances
            )));
        }
        if self.engine.worker_threads == 0 {
            return Err(Error::Config("engine.worker_threads must be at least 1".into()));
        }
        if self.engine.work_queue_capacity == 0 {
            return Err(Error::Config(
                "engine.work_queue_capacity must be at least 1".into(),
            ));
        }
        if self.buffer_queue.default_capacity == 0 {
            return Err(Error::Config(
                "buffer_queue.default_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
