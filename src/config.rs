//! Configuration management for the TikTok research extractor.
//!
//! Credentials come from the process environment and are never written to
//! disk. Everything else lives in an optional JSONC file.

use crate::error::ExtractorError;
use anyhow::{Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable holding the research API client key.
pub const CLIENT_KEY_VAR: &str = "TIKTOK_CLIENT_KEY";
/// Environment variable holding the research API client secret.
pub const CLIENT_SECRET_VAR: &str = "TIKTOK_CLIENT_SECRET";

/// Client key/secret pair for the client-credentials grant.
#[derive(Clone)]
pub struct Credentials {
    pub client_key: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_key", &self.client_key)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Result<Self, ExtractorError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read credentials through an arbitrary variable lookup.
    ///
    /// # Details
    /// Unset and empty variables are both treated as missing. The error
    /// names every missing variable, not just the first.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ExtractorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let client_key = read(CLIENT_KEY_VAR);
        let client_secret = read(CLIENT_SECRET_VAR);

        match (client_key, client_secret) {
            (Some(client_key), Some(client_secret)) => Ok(Self {
                client_key,
                client_secret,
            }),
            (key, secret) => {
                let mut missing = Vec::new();
                if key.is_none() {
                    missing.push(CLIENT_KEY_VAR.to_string());
                }
                if secret.is_none() {
                    missing.push(CLIENT_SECRET_VAR.to_string());
                }
                Err(ExtractorError::MissingCredentials(missing))
            }
        }
    }
}

/// Application configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Research API host, without trailing slash
    pub base_url: String,
    /// HTTP timeout per request, in seconds
    pub timeout_secs: u64,
    /// Pause before every request after the first, in milliseconds
    pub request_delay_ms: u64,
    /// Directory receiving `<username>_FULL_DATA_<timestamp>.json` files
    pub output_dir: PathBuf,
    /// Daily request counter file
    pub usage_log_path: PathBuf,
    /// Daily request quota, only used for reporting
    pub daily_limit: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://open.tiktokapis.com".to_string(),
            timeout_secs: 30,
            request_delay_ms: 300,
            output_dir: PathBuf::from("."),
            usage_log_path: PathBuf::from("tiktok_api_usage_log.json"),
            daily_limit: 1000,
        }
    }
}

impl Config {
    /// Load configuration from file.
    ///
    /// # Arguments
    /// * `path` - Optional path to config file. If None, uses default location.
    ///
    /// # Details
    /// Missing files yield the default configuration. `//` line comments are
    /// stripped before parsing.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = serde_json::from_str(&strip_line_comments(&content))
            .with_context(|| format!("Failed to deserialize config: {}", config_path.display()))?;

        Ok(config)
    }

    /// Save configuration to file, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, json)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// `$XDG_CONFIG_HOME/tiktok-extract/config.jsonc` or the platform equivalent.
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir =
            config_dir().ok_or_else(|| anyhow::anyhow!("Failed to determine config directory"))?;
        Ok(config_dir.join("tiktok-extract").join("config.jsonc"))
    }
}

/// Remove `//` comments that are not inside a string literal.
fn strip_line_comments(content: &str) -> String {
    content
        .lines()
        .map(|line| {
            let mut in_string = false;
            let mut escaped = false;
            let bytes = line.as_bytes();
            for (i, &b) in bytes.iter().enumerate() {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' if in_string => escaped = true,
                    b'"' => in_string = !in_string,
                    b'/' if !in_string && bytes.get(i + 1) == Some(&b'/') => {
                        return line[..i].trim_end();
                    }
                    _ => {}
                }
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
