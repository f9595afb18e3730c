use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_TEXT_ENDPOINT: &str = "http://localhost:8000/search_question";
pub const DEFAULT_SUGGESTIONS_ENDPOINT: &str = "http://localhost:8000/suggestion";
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_APOLOGY: &str =
    "Sorry, I'm having trouble answering right now. Please try again in a moment.";

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Endpoint returning the newline-delimited answer stream
    pub text_endpoint: String,

    /// Endpoint returning `{ "suggestions": [...] }`
    pub suggestions_endpoint: String,

    /// Response length cap sent with every question
    pub max_tokens: u32,

    /// Whole-request timeout for suggestions, connect timeout for the stream
    pub request_timeout_secs: u64,

    /// Text shown in place of an answer that failed
    pub apology_text: String,

    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            text_endpoint: DEFAULT_TEXT_ENDPOINT.to_string(),
            suggestions_endpoint: DEFAULT_SUGGESTIONS_ENDPOINT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout_secs: 60,
            apology_text: DEFAULT_APOLOGY.to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load `~/.folio-chat/config.toml` if present, then apply environment
    /// overrides
    pub fn load() -> Result<Self> {
        let mut config = match Self::default_path() {
            Some(path) if path.exists() => Self::read_file(&path)?,
            _ => Config::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load an explicit config file, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Location of the per-user config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".folio-chat").join("config.toml"))
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = self.to_toml()?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Render as pretty TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("FOLIO_TEXT_ENDPOINT") {
            self.text_endpoint = url;
        }
        if let Some(url) = lookup("FOLIO_SUGGESTIONS_ENDPOINT") {
            self.suggestions_endpoint = url;
        }
        if let Some(raw) = lookup("FOLIO_MAX_TOKENS") {
            self.max_tokens = raw
                .trim()
                .parse()
                .with_context(|| format!("FOLIO_MAX_TOKENS is not a number: {raw}"))?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
