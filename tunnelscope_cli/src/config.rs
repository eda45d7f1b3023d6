//! CLI configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tunnelscope_common::constants;

/// Get the configuration directory path
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tunnelscope")
    }

    #[cfg(not(target_os = "windows"))]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tunnelscope")
    }
}

/// Get the config file path
pub fn config_file() -> PathBuf {
    config_dir().join("config.yml")
}

/// Get the logs directory
pub fn logs_dir() -> PathBuf {
    config_dir().join("logs")
}

/// Ensure all config directories exist
pub fn ensure_dirs() -> Result<()> {
    let config = config_dir();
    let logs = logs_dir();

    fs::create_dir_all(&config).context("Failed to create config directory")?;
    fs::create_dir_all(&logs).context("Failed to create logs directory")?;

    Ok(())
}

/// Main configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Address of the tunnel client's inspection server
    #[serde(default = "default_inspect_addr")]
    pub inspect_addr: String,

    /// Pause between failed connect attempts, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Treat search text as a regular expression by default
    #[serde(default)]
    pub regex_search: bool,
}

fn default_inspect_addr() -> String {
    format!("localhost:{}", constants::DEFAULT_INSPECT_PORT)
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            inspect_addr: default_inspect_addr(),
            retry_delay_ms: default_retry_delay_ms(),
            regex_search: false,
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load() -> Result<Self> {
        let path = config_file();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_yaml(&content)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        // An empty file deserializes to null
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("Failed to parse config file")
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        ensure_dirs()?;
        let path = config_file();
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// URLs derived from the inspection server address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Base for the HTTP side channel, e.g. `http://localhost:4040`
    pub http_base: String,
    /// Event stream, e.g. `ws://localhost:4040/inspect/`
    pub ws_url: String,
}

impl Endpoints {
    /// Accepts a bare port, `host:port`, or an http(s)/ws(s) URL
    pub fn parse(addr: &str) -> Result<Self> {
        let addr = addr.trim();
        if !addr.is_empty() && addr.chars().all(|c| c.is_ascii_digit()) {
            let port: u16 = addr.parse().context("Invalid port")?;
            return Ok(Self::from_host(&format!("localhost:{}", port), false));
        }

        let (secure, rest) = if let Some(rest) = addr.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = addr.strip_prefix("wss://") {
            (true, rest)
        } else if let Some(rest) = addr.strip_prefix("http://") {
            (false, rest)
        } else if let Some(rest) = addr.strip_prefix("ws://") {
            (false, rest)
        } else {
            (false, addr)
        };

        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() {
            anyhow::bail!("Invalid inspector address: {:?}", addr);
        }

        Ok(Self::from_host(host, secure))
    }

    fn from_host(host: &str, secure: bool) -> Self {
        let (http, ws) = if secure { ("https", "wss") } else { ("http", "ws") };
        Self {
            http_base: format!("{}://{}", http, host),
            ws_url: format!("{}://{}{}", ws, host, constants::INSPECT_PATH),
        }
    }
}
