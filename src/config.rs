//! Configuration System
//!
//! Persistence behaviour options plus the TOML-backed configuration file
//! consumed by the CLI. Options are immutable after construction; every
//! field carries a serde default so partial configuration files work.

use crate::error::EngineError;
use crate::logging::LoggingConfig;
use crate::state::Snapshot;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Behaviour options for a persistence engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Leading-edge throttle window for change-triggered writes, in
    /// milliseconds. Zero disables throttling.
    #[serde(default = "default_write_delay_ms")]
    pub write_delay_ms: u64,

    /// Perform a bootstrap read and merge the stored tree into the shared
    /// state during engine construction.
    #[serde(default = "default_true")]
    pub invoke_initial_read: bool,

    /// Activate the change subscription before the bootstrap read completes,
    /// so mutations during the pending read are captured and flushed.
    #[serde(default)]
    pub pre_persist_read: bool,

    /// Opaque filter passed through to the backend's read operation only.
    #[serde(default)]
    pub filter: Option<Snapshot>,

    /// Write indented instead of compact serialized text (consumed by
    /// backends that render text, e.g. the file variant).
    #[serde(default)]
    pub pretty_print: bool,
}

fn default_write_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            write_delay_ms: default_write_delay_ms(),
            invoke_initial_read: true,
            pre_persist_read: false,
            filter: None,
            pretty_print: false,
        }
    }
}

/// Which storage backend variant to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Sled,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::File
    }
}

/// Root configuration structure for the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Engine behaviour options
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Storage backend selection
    #[serde(default)]
    pub backend: BackendKind,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MirrorConfig {
    /// Default config file location: `<platform config dir>/statemirror/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "statemirror")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration from an explicit path or the default location,
    /// with `STATEMIRROR_*` environment variables layered on top. A missing
    /// file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let mut builder = config::Config::builder();

        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }
        builder = builder.add_source(
            config::Environment::with_prefix("STATEMIRROR").separator("__"),
        );

        let settings = builder
            .build()
            .map_err(|e| EngineError::Configuration(format!("failed to load configuration: {}", e)))?;
        settings
            .try_deserialize()
            .map_err(|e| EngineError::Configuration(format!("invalid configuration: {}", e)))
    }
}
