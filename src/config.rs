use std::path::PathBuf;

use anyhow::{Context, Result};
use url::Url;

pub const APP_ID: &str = "cosmic-query";
pub const APP_NAME: &str = "CosmicQuery";

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

const CHAT_HISTORY_FILE: &str = "chat_history.db";
const PREFERENCES_FILE: &str = "user_preferences.db";
const EXPORTS_DIR: &str = "exports";

/// Resolved runtime configuration.
#[derive(Clone)]
pub struct Config {
    /// Empty when no key was supplied; the API then rejects requests inline.
    pub api_key: String,
    pub base_url: Url,
    pub data_dir: PathBuf,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"***")
            .field("base_url", &self.base_url.as_str())
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl Config {
    pub fn new(api_key: Option<String>, base_url: &str, data_dir: Option<PathBuf>) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid base URL: {}", base_url))?;
        let data_dir = match data_dir {
            Some(dir) => dir,
            None => default_data_dir()?,
        };

        Ok(Self {
            api_key: api_key.unwrap_or_default(),
            base_url,
            data_dir,
        })
    }

    pub fn chat_history_path(&self) -> PathBuf {
        self.data_dir.join(CHAT_HISTORY_FILE)
    }

    pub fn preferences_path(&self) -> PathBuf {
        self.data_dir.join(PREFERENCES_FILE)
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join(EXPORTS_DIR)
    }
}

fn default_data_dir() -> Result<PathBuf> {
    let data_dir = match std::env::var("XDG_DATA_HOME") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => {
            let home = std::env::var("HOME").context("Neither XDG_DATA_HOME nor HOME is set")?;
            PathBuf::from(home).join(".local/share")
        }
    };
    Ok(data_dir.join(APP_ID))
}
