use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use anyhow::{Result, anyhow};

use crate::client;
use crate::composer::Behavior;

/// Used when neither the command line, the environment nor the config file
/// names an endpoint.
pub const DEFAULT_BASE_URL: &str = "https://fastapi-chatapp-tlqz.onrender.com";

/// Environment variable read (once, at startup) for the base URL.
pub const BASE_URL_ENV: &str = "CARECHAT_API_BASE";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub last_behavior: Option<Behavior>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Records the chosen behavior, leaving the rest of the file untouched.
    /// A file that fails to parse is left as is and the error returned.
    pub fn save_last_behavior_to(path: &Path, behavior: Option<&Behavior>) -> Result<()> {
        let mut config = Self::load_from(path)?;
        config.last_behavior = behavior.cloned();
        config.save_to(path)
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("carechat"))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}

/// Where the active base URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlSource {
    Env,
    Config,
    Default,
}

impl UrlSource {
    pub fn badge(&self) -> &'static str {
        match self {
            UrlSource::Env => "ENV URL",
            UrlSource::Config => "CONFIG URL",
            UrlSource::Default => "DEFAULT URL",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            UrlSource::Env => "環境変数 CARECHAT_API_BASE を使用中",
            UrlSource::Config => "設定ファイルの base_url を使用中",
            UrlSource::Default => "CARECHAT_API_BASE が未設定（デフォルトURLを使用）",
        }
    }
}

/// The resolved chat endpoint, handed to the client and UI at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base_url: String,
    source: UrlSource,
}

impl Endpoint {
    /// Picks the base URL: an explicit value (flag or environment) first,
    /// then the config file, then [`DEFAULT_BASE_URL`]. Blank values count
    /// as absent.
    pub fn resolve(explicit: Option<&str>, config: &Config) -> Self {
        let non_blank = |value: &str| {
            let trimmed = value.trim().trim_end_matches('/');
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        };

        if let Some(base_url) = explicit.and_then(non_blank) {
            return Self { base_url, source: UrlSource::Env };
        }
        if let Some(base_url) = config.base_url.as_deref().and_then(non_blank) {
            return Self { base_url, source: UrlSource::Config };
        }
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            source: UrlSource::Default,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn chat_url(&self) -> String {
        client::chat_url(&self.base_url)
    }

    pub fn source(&self) -> UrlSource {
        self.source
    }
}
