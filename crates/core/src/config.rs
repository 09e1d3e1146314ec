//! Session configuration
//!
//! Identifiers used in frame headers come from a TOML file, optionally
//! overridden on the command line. Nothing here reads from stdin.
//!
//! ```toml
//! [session]
//! name = "alice"
//! sender_id = 1.0
//! receiver_id = 2.0
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::frame::validate_id;

/// Name used when neither the file nor the command line gives one
pub const DEFAULT_SENDER_NAME: &str = "anonymous";

const CONFIG_FILE_NAME: &str = "wirechat.toml";

/// Validated identifiers for one connection
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub sender_name: String,
    pub sender_id: f64,
    pub receiver_id: f64,
}

impl SessionConfig {
    /// Build a config, checking both identifiers fit the header columns
    pub fn new(
        sender_name: impl Into<String>,
        sender_id: f64,
        receiver_id: f64,
    ) -> Result<Self, ConfigError> {
        validate_id("sender id", sender_id)?;
        validate_id("receiver id", receiver_id)?;
        Ok(Self {
            sender_name: sender_name.into(),
            sender_id,
            receiver_id,
        })
    }
}

/// `[session]` table of the config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSection {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sender_id: Option<f64>,
    #[serde(default)]
    pub receiver_id: Option<f64>,
}

/// Config file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub session: SessionSection,
}

impl ConfigFile {
    /// Platform config location (`<config_dir>/wirechat.toml`)
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "onyx", "wirechat")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load from an explicit path; the file must exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml(&content)
    }

    /// Load from the default location, or an empty config if there is none
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides; any value set in `overrides` wins
    pub fn merge(mut self, overrides: SessionSection) -> Self {
        if overrides.name.is_some() {
            self.session.name = overrides.name;
        }
        if overrides.sender_id.is_some() {
            self.session.sender_id = overrides.sender_id;
        }
        if overrides.receiver_id.is_some() {
            self.session.receiver_id = overrides.receiver_id;
        }
        self
    }

    /// Resolve into a validated session config
    pub fn into_session(self) -> Result<SessionConfig, ConfigError> {
        let sender_id = self
            .session
            .sender_id
            .ok_or(ConfigError::Missing("sender_id"))?;
        let receiver_id = self
            .session
            .receiver_id
            .ok_or(ConfigError::Missing("receiver_id"))?;
        let name = self
            .session
            .name
            .unwrap_or_else(|| DEFAULT_SENDER_NAME.to_string());
        SessionConfig::new(name, sender_id, receiver_id)
    }
}
