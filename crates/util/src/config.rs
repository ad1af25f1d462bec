//! Engine configuration.
//!
//! Configuration is a small YAML (or JSON) document. The file is looked up at
//! the path named by [`CONFIG_PATH_ENV`] when set, otherwise at
//! `<config dir>/scopeflow/config.yaml` (`~/.config/scopeflow/config.yaml` on
//! most platforms). Every field has a default, so a missing file is not an error.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::{config_dir, home_dir};
use indexmap::IndexMap;
use scopeflow_types::TraceLevel;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Environment variable allowing callers to override the configuration file path.
pub const CONFIG_PATH_ENV: &str = "SCOPEFLOW_CONFIG";

/// Default filename for the configuration document.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Error surfaced when reading configuration fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure (for example, permissions).
    #[error("configuration I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The document is not valid YAML/JSON or does not match the schema.
    #[error("configuration parse error at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Whether error-intercepting nodes may intercept `FatalError`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatalPolicy {
    /// Fatal errors are matched like any other kind.
    #[default]
    Interceptable,
    /// Fatal errors always propagate past TryExcept, TryUntil and CaptureErrors.
    Propagate,
}

/// Runtime options for a top-level execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fatal_policy: FatalPolicy,
    /// Keep emitted log records on the context for later inspection.
    pub capture_records: bool,
    /// Snapshot scopes and visited nodes at the point of failure.
    pub capture_trace: bool,
    /// Key fragments whose values are masked when a trace is rendered.
    pub sensitive_words: Vec<String>,
    /// Initial minimum level for context log output; `None` emits everything.
    pub default_log_level: Option<TraceLevel>,
    /// Named feature flags consulted by flag-gated branches.
    pub feature_flags: IndexMap<String, bool>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fatal_policy: FatalPolicy::default(),
            capture_records: true,
            capture_trace: true,
            sensitive_words: ["credential", "authorization", "token", "secret", "password"]
                .into_iter()
                .map(String::from)
                .collect(),
            default_log_level: None,
            feature_flags: IndexMap::new(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the default location, falling back to defaults
    /// when the file is missing or unreadable.
    pub fn load() -> Self {
        let path = default_config_path();
        match Self::from_path(&path) {
            Ok(config) => config,
            Err(error) => {
                warn!(path = %path.display(), error = %error, "Failed to load configuration; using defaults");
                Self::default()
            }
        }
    }

    /// Loads configuration from `path`. A missing file yields the defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(data) if data.trim().is_empty() => Ok(Self::default()),
            Ok(data) => serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Returns true when `FatalError` may be intercepted.
    pub fn fatal_interceptable(&self) -> bool {
        self.fatal_policy == FatalPolicy::Interceptable
    }

    /// State of the feature flag `flag`, or `default` when it is not configured.
    pub fn feature_enabled(&self, flag: &str, default: bool) -> bool {
        self.feature_flags.get(flag).copied().unwrap_or(default)
    }
}

/// Resolves the configuration path from the environment or the platform config directory.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return expand_home(trimmed);
        }
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scopeflow")
        .join(CONFIG_FILE_NAME)
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => home_dir().map(|home| home.join(rest)).unwrap_or_else(|| PathBuf::from(path)),
        None if path == "~" => home_dir().unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
