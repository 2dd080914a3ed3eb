//! Configuration for dfukeys
//!
//! Settings come from a TOML file; every field is optional. Command line
//! flags and their environment variables override the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapters::{DEFAULT_API_URL, DEFAULT_DFU_UTIL};
use crate::error::{ConfigError, DfuKeysResult};
use crate::ports::KeyStore;
use crate::use_cases::ServerKeys;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// DFU utility binary
    #[serde(default = "default_dfu_util")]
    pub dfu_util: String,

    /// Upper bound for a single DFU transfer
    #[serde(default = "default_timeout_secs")]
    pub dfu_timeout_secs: u64,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Replaces the bundled TCP server public key
    #[serde(default)]
    pub tcp_server_key: Option<PathBuf>,

    /// Replaces the bundled UDP server public key
    #[serde(default)]
    pub udp_server_key: Option<PathBuf>,
}

fn default_dfu_util() -> String {
    DEFAULT_DFU_UTIL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dfu_util: default_dfu_util(),
            dfu_timeout_secs: default_timeout_secs(),
            api_url: default_api_url(),
            access_token: None,
            http_timeout_secs: default_timeout_secs(),
            tcp_server_key: None,
            udp_server_key: None,
        }
    }
}

impl Settings {
    /// `config.toml` in the platform configuration directory
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("io", "particle", "dfukeys")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load `path`, or the default location when `None`
    ///
    /// An explicitly named file must exist; a missing default file means
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> DfuKeysResult<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !required && !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).map_err(|err| ConfigError::Read {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        let settings = toml::from_str(&content).map_err(|err| ConfigError::Parse {
            path: path.clone(),
            reason: err.to_string(),
        })?;
        debug!(path = %path.display(), "Loaded config");
        Ok(settings)
    }

    pub fn dfu_timeout(&self) -> Duration {
        Duration::from_secs(self.dfu_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Default server keys, with any configured overrides applied
    pub fn server_keys<S: KeyStore>(&self, store: &S) -> DfuKeysResult<ServerKeys> {
        let mut keys = ServerKeys::builtin()?;
        if let Some(path) = &self.tcp_server_key {
            keys.tcp = store.read_public_key(path)?;
        }
        if let Some(path) = &self.udp_server_key {
            keys.udp = store.read_public_key(path)?;
        }
        Ok(keys)
    }
}
