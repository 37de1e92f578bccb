//! Configuration management.
//!
//! Precedence, lowest first: compile-time defaults, `~/.linkshelf/config.json`,
//! `LINKSHELF_*` environment variables.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

const PLACEHOLDER_SUPABASE_URL: &str = "https://your-project.supabase.co";
const PLACEHOLDER_SUPABASE_ANON_KEY: &str = "your-anon-key";

/// Default Supabase URL (can be overridden at compile time via SUPABASE_URL env var).
pub const DEFAULT_SUPABASE_URL: &str = match option_env!("SUPABASE_URL") {
    Some(url) => url,
    None => PLACEHOLDER_SUPABASE_URL,
};

/// Default Supabase anon key (can be overridden at compile time via SUPABASE_ANON_KEY env var).
pub const DEFAULT_SUPABASE_ANON_KEY: &str = match option_env!("SUPABASE_ANON_KEY") {
    Some(key) => key,
    None => PLACEHOLDER_SUPABASE_ANON_KEY,
};

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Local port the OAuth redirect lands on. Must be in the project's redirect allow-list.
pub const DEFAULT_OAUTH_CALLBACK_PORT: u16 = 54321;

pub const DEFAULT_OAUTH_TIMEOUT_SECS: u64 = 180;

const ENV_SUPABASE_URL: &str = "LINKSHELF_SUPABASE_URL";
const ENV_SUPABASE_ANON_KEY: &str = "LINKSHELF_SUPABASE_ANON_KEY";
const ENV_LOG_LEVEL: &str = "LINKSHELF_LOG_LEVEL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Supabase project URL.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,
    /// Supabase anon key (public, row access is enforced server-side).
    #[serde(default = "default_supabase_anon_key")]
    pub supabase_anon_key: String,
    #[serde(default = "default_oauth_callback_port")]
    pub oauth_callback_port: u16,
    #[serde(default = "default_oauth_timeout_secs")]
    pub oauth_timeout_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_supabase_url() -> String {
    DEFAULT_SUPABASE_URL.to_string()
}

fn default_supabase_anon_key() -> String {
    DEFAULT_SUPABASE_ANON_KEY.to_string()
}

fn default_oauth_callback_port() -> u16 {
    DEFAULT_OAUTH_CALLBACK_PORT
}

fn default_oauth_timeout_secs() -> u64 {
    DEFAULT_OAUTH_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            supabase_url: default_supabase_url(),
            supabase_anon_key: default_supabase_anon_key(),
            oauth_callback_port: DEFAULT_OAUTH_CALLBACK_PORT,
            oauth_timeout_secs: DEFAULT_OAUTH_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from the config file (if present), then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply `LINKSHELF_*` overrides from a variable lookup. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = read(ENV_SUPABASE_URL) {
            self.supabase_url = url;
        }
        if let Some(key) = read(ENV_SUPABASE_ANON_KEY) {
            self.supabase_anon_key = key;
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
    }

    /// Check that the backend settings can actually reach a project.
    pub fn validate(&self) -> CoreResult<()> {
        if self.supabase_url.trim().is_empty() || self.supabase_url == PLACEHOLDER_SUPABASE_URL {
            return Err(CoreError::Config(format!(
                "supabase_url is not configured; set {ENV_SUPABASE_URL} or edit config.json"
            )));
        }
        if self.supabase_anon_key.trim().is_empty()
            || self.supabase_anon_key == PLACEHOLDER_SUPABASE_ANON_KEY
        {
            return Err(CoreError::Config(format!(
                "supabase_anon_key is not configured; set {ENV_SUPABASE_ANON_KEY} or edit config.json"
            )));
        }

        let url = self.supabase_url()?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CoreError::Config(format!(
                "supabase_url must use http or https, got {}",
                url.scheme()
            )));
        }
        Ok(())
    }

    pub fn supabase_url(&self) -> CoreResult<Url> {
        Url::parse(&self.supabase_url).map_err(CoreError::from)
    }

    pub fn oauth_timeout(&self) -> Duration {
        Duration::from_secs(self.oauth_timeout_secs)
    }
}
