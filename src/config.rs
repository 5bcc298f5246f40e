use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::fetcher::DEFAULT_USER_AGENT;

const CONFIG_FILE_NAME: &str = ".gatorconfig.json";

/// Settings read from `~/.gatorconfig.json`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub current_user_name: String,
    pub data_dir: Option<String>,
    pub user_agent: String,
    pub fetch_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            current_user_name: "default".to_string(),
            data_dir: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            fetch_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Loads the config from `$GATOR_CONFIG` or `~/.gatorconfig.json`.
    pub fn load() -> Result<Self> {
        let path = match std::env::var("GATOR_CONFIG") {
            Ok(path) => PathBuf::from(shellexpand::tilde(&path).into_owned()),
            Err(_) => home_dir().join(CONFIG_FILE_NAME),
        };
        Self::load_from(&path)
    }

    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.resolve_data_dir(|key| std::env::var(key).ok())
    }

    /// `$GATOR_DATA_DIR`, then the configured `data_dir`, then the XDG data
    /// directory (`$XDG_DATA_HOME/gator`, falling back to `~/.local/share/gator`).
    fn resolve_data_dir(&self, env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(dir) = env("GATOR_DATA_DIR") {
            return PathBuf::from(dir);
        }

        if let Some(dir) = &self.data_dir {
            return PathBuf::from(shellexpand::tilde(dir).into_owned());
        }

        if let Some(xdg_data) = env("XDG_DATA_HOME") {
            return PathBuf::from(xdg_data).join("gator");
        }

        let home = env("HOME").unwrap_or_else(|| ".".to_string());
        PathBuf::from(home).join(".local/share/gator")
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
}
