//! Configuration loading for Fidelity.
//!
//! Configuration is optional: every field has a default, and a missing or
//! unreadable file degrades to defaults with a logged warning.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use toml::de;

use fidelity_types::UnhandledRejections;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "FIDELITY_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config: {source}")]
    Parse {
        #[from]
        source: de::Error,
    },
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct FidelityConfig {
    pub dispatch: Option<DispatchConfig>,
    pub diagnostics: Option<DiagnosticsConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of jobs a single microtask drain runs before yielding.
    pub drain_budget: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct DiagnosticsConfig {
    pub unhandled_rejections: Option<UnhandledRejections>,
}

impl FidelityConfig {
    /// Load from `$FIDELITY_CONFIG` or `~/.fidelity/config.toml`.
    ///
    /// Returns `None` when no file exists or it cannot be read or parsed.
    pub fn load() -> Option<Self> {
        let path = config_path()?;
        if !path.exists() {
            return None;
        }

        match Self::load_from(&path) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!(path = %path.display(), "Ignoring config: {err}");
                None
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    #[must_use]
    pub fn drain_budget(&self) -> Option<usize> {
        self.dispatch.as_ref().and_then(|d| d.drain_budget)
    }

    #[must_use]
    pub fn unhandled_rejections(&self) -> UnhandledRejections {
        self.diagnostics
            .as_ref()
            .and_then(|d| d.unhandled_rejections)
            .unwrap_or_default()
    }
}

fn config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os(CONFIG_ENV_VAR)
        && !explicit.is_empty()
    {
        return Some(PathBuf::from(explicit));
    }
    dirs::home_dir().map(|home| home.join(".fidelity").join("config.toml"))
}
