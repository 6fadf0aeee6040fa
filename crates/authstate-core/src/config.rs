//! Application configuration management.
//!
//! This module handles loading and saving the configuration: the backend
//! base URL, the session validation and logout paths, an optional request
//! timeout, and which persisted-storage backend holds the token.
//!
//! Configuration is stored at `~/.config/authstate/config.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/storage directory paths
pub const APP_NAME: &str = "authstate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend served by the development API server.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Session validation endpoint. Older backends expose it as `/user`.
pub const DEFAULT_CHECK_AUTH_PATH: &str = "/checkAuth";

pub const DEFAULT_LOGOUT_PATH: &str = "/logout";

const ENV_BASE_URL: &str = "AUTHSTATE_BASE_URL";
const ENV_CHECK_AUTH_PATH: &str = "AUTHSTATE_CHECK_AUTH_PATH";
const ENV_LOGOUT_PATH: &str = "AUTHSTATE_LOGOUT_PATH";

/// Where the token/user slots are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub check_auth_path: String,
    pub logout_path: String,
    /// No timeout unless set; the transport default applies.
    pub request_timeout_secs: Option<u64>,
    pub storage: StorageBackend,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            check_auth_path: DEFAULT_CHECK_AUTH_PATH.to_string(),
            logout_path: DEFAULT_LOGOUT_PATH.to_string(),
            request_timeout_secs: None,
            storage: StorageBackend::default(),
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Override fields from `AUTHSTATE_*` variables. Empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(path) = lookup(ENV_CHECK_AUTH_PATH) {
            self.check_auth_path = path;
        }
        if let Some(path) = lookup(ENV_LOGOUT_PATH) {
            self.logout_path = path;
        }
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the file-backed session slots.
    pub fn storage_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
