//! Master configuration loaded from TOML.

use crate::master::{Authenticator, CredentialAuth, NoAuth};
use crate::reducer::DEFAULT_NUM_PLAYERS;
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// How actions are authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Every action is accepted.
    #[default]
    #[serde(rename = "none")]
    Disabled,
    /// Actions must carry the seat's credentials once any seat has them.
    Credentials,
}

/// Settings of a master process.
#[derive(Debug, Clone, PartialEq, Getters, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Authentication mode.
    #[serde(default)]
    auth: AuthMode,

    /// Seats created for matches that are synced before they exist.
    #[serde(default = "default_num_players")]
    num_players: usize,

    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    log_filter: String,

    /// Fixed PRNG seed for reproducible matches.
    #[serde(default)]
    seed: Option<u64>,
}

fn default_num_players() -> usize {
    DEFAULT_NUM_PLAYERS
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self::new(AuthMode::default(), default_num_players())
    }
}

impl MasterConfig {
    /// Creates a configuration with the default log filter and no fixed seed.
    #[instrument]
    pub fn new(auth: AuthMode, num_players: usize) -> Self {
        Self {
            auth,
            num_players,
            log_filter: default_log_filter(),
            seed: None,
        }
    }

    /// Fixes the PRNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml(&content)?;
        info!(auth = ?config.auth, num_players = config.num_players, "Config loaded successfully");
        Ok(config)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        if config.num_players == 0 {
            return Err(ConfigError::new("num_players must be at least 1".to_string()));
        }
        Ok(config)
    }

    /// Authenticator matching [`MasterConfig::auth`].
    pub fn authenticator(&self) -> Arc<dyn Authenticator> {
        match self.auth {
            AuthMode::Disabled => Arc::new(NoAuth),
            AuthMode::Credentials => Arc::new(CredentialAuth),
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
