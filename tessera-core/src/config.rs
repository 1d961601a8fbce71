//! Runtime configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! backlog_len = 5
//! poll_timeout_ms = 30000
//!
//! [endpoints]
//! mutate = "/callback"
//! sync = "/effects"
//! log = "/log"
//! reload = "/"
//! client_script = "/tessera.js"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of retained batches. A client falling further behind is
/// forced to reload.
pub const DEFAULT_BACKLOG_LEN: usize = 5;

/// Default bound on a single long-poll wait.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 30_000;

/// Locations the client runtime talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub mutate: String,
    pub sync: String,
    pub log: String,
    /// Page the client navigates to when told to reload.
    pub reload: String,
    pub client_script: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            mutate: String::from("/callback"),
            sync: String::from("/effects"),
            log: String::from("/log"),
            reload: String::from("/"),
            client_script: String::from("/tessera.js"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of batches retained in the backlog.
    pub backlog_len: usize,
    /// Longest time a caught-up poll waits before answering empty.
    pub poll_timeout_ms: u64,
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backlog_len: DEFAULT_BACKLOG_LEN,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backlog_len == 0 {
            return Err(Error::Config {
                reason: String::from("backlog_len must be at least 1"),
            });
        }
        if self.poll_timeout_ms == 0 {
            return Err(Error::Config {
                reason: String::from("poll_timeout_ms must be at least 1"),
            });
        }
        Ok(())
    }

    pub fn with_backlog_len(mut self, backlog_len: usize) -> Self {
        self.backlog_len = backlog_len;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}
