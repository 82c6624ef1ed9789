use std::collections::HashMap;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::store::KvStore;
use crate::providers::GenerationParams;

const KEY_MODEL: &str = "groq_model";
const KEY_TEMPERATURE: &str = "temperature";
const KEY_MAX_TOKENS: &str = "max_tokens";
const KEY_TOP_P: &str = "top_p";
const KEY_USER_AVATAR: &str = "user_avatar";
const KEY_ASSISTANT_AVATAR: &str = "assistant_avatar";

pub const MIN_MAX_TOKENS: u32 = 256;
pub const MAX_MAX_TOKENS: u32 = 4096;
pub const MIN_TOP_P: f32 = 0.1;

pub const USER_AVATARS: &[&str] = &["👤", "👩‍💻", "👨‍💻", "🧑‍💻", "🙋‍♀️", "🙋‍♂️"];
pub const ASSISTANT_AVATARS: &[&str] = &["🤖", "🧠", "🦾", "🔮", "🧩", "💫"];

#[derive(Debug, Error, PartialEq)]
pub enum PreferenceError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unknown avatar: {0}")]
    UnknownAvatar(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Model {
    #[default]
    #[serde(rename = "llama-3.3-70b-versatile")]
    Llama33_70b,
    #[serde(rename = "llama-3.1-70b-versatile")]
    Llama31_70b,
    #[serde(rename = "llama-3.1-8b-versatile")]
    Llama31_8b,
    #[serde(rename = "mixtral-8x7b-32768")]
    Mixtral8x7b,
    #[serde(rename = "claude-3-5-sonnet")]
    Claude35Sonnet,
    #[serde(rename = "gemma-7b")]
    Gemma7b,
}

impl Model {
    pub const ALL: [Model; 6] = [
        Model::Llama33_70b,
        Model::Llama31_70b,
        Model::Llama31_8b,
        Model::Mixtral8x7b,
        Model::Claude35Sonnet,
        Model::Gemma7b,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Model::Llama33_70b => "llama-3.3-70b-versatile",
            Model::Llama31_70b => "llama-3.1-70b-versatile",
            Model::Llama31_8b => "llama-3.1-8b-versatile",
            Model::Mixtral8x7b => "mixtral-8x7b-32768",
            Model::Claude35Sonnet => "claude-3-5-sonnet",
            Model::Gemma7b => "gemma-7b",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Model::Llama33_70b => "Llama-3.3-70B",
            Model::Llama31_70b => "Llama-3.1-70B",
            Model::Llama31_8b => "Llama-3.1-8B",
            Model::Mixtral8x7b => "Mixtral-8x7B",
            Model::Claude35Sonnet => "Claude-3.5 Sonnet",
            Model::Gemma7b => "Gemma-7B",
        }
    }

    /// Match either the API id or the display name, ignoring case.
    pub fn lookup(s: &str) -> Result<Self, PreferenceError> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.id().eq_ignore_ascii_case(s) || m.display_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| PreferenceError::UnknownModel(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    pub model: Model,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub user_avatar: String,
    pub assistant_avatar: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            model: Model::default(),
            temperature: 0.7,
            max_tokens: 1024,
            top_p: 0.9,
            user_avatar: USER_AVATARS[0].to_string(),
            assistant_avatar: ASSISTANT_AVATARS[0].to_string(),
        }
    }
}

impl Preferences {
    pub fn set_temperature(&mut self, value: f32) {
        self.temperature = clamp_or(value, 0.0, 1.0, Self::default().temperature);
    }

    pub fn set_max_tokens(&mut self, value: u32) {
        self.max_tokens = value.clamp(MIN_MAX_TOKENS, MAX_MAX_TOKENS);
    }

    pub fn set_top_p(&mut self, value: f32) {
        self.top_p = clamp_or(value, MIN_TOP_P, 1.0, Self::default().top_p);
    }

    pub fn set_user_avatar(&mut self, symbol: &str) -> Result<(), PreferenceError> {
        self.user_avatar = pick_avatar(USER_AVATARS, symbol)?;
        Ok(())
    }

    pub fn set_assistant_avatar(&mut self, symbol: &str) -> Result<(), PreferenceError> {
        self.assistant_avatar = pick_avatar(ASSISTANT_AVATARS, symbol)?;
        Ok(())
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: Some(self.top_p),
        }
    }
}

fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

fn pick_avatar(choices: &[&str], symbol: &str) -> Result<String, PreferenceError> {
    choices
        .iter()
        .find(|c| **c == symbol.trim())
        .map(|c| c.to_string())
        .ok_or_else(|| PreferenceError::UnknownAvatar(symbol.to_string()))
}

/// Loads and saves `Preferences`, one key per field.
#[derive(Debug, Clone)]
pub struct PreferenceStore {
    store: KvStore,
}

impl PreferenceStore {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    /// Never fails: an unreadable store or field yields the default for it.
    pub async fn load(&self) -> Preferences {
        let entries = match self.store.snapshot().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to load preferences, using defaults: {:#}", e);
                return Preferences::default();
            }
        };

        let defaults = Preferences::default();
        let mut prefs = defaults.clone();

        prefs.model = field(&entries, KEY_MODEL).unwrap_or(defaults.model);
        prefs.set_temperature(field(&entries, KEY_TEMPERATURE).unwrap_or(defaults.temperature));
        prefs.set_max_tokens(field(&entries, KEY_MAX_TOKENS).unwrap_or(defaults.max_tokens));
        prefs.set_top_p(field(&entries, KEY_TOP_P).unwrap_or(defaults.top_p));

        if let Some(symbol) = field::<String>(&entries, KEY_USER_AVATAR) {
            if prefs.set_user_avatar(&symbol).is_err() {
                tracing::warn!("Ignoring stored user avatar {:?}", symbol);
            }
        }
        if let Some(symbol) = field::<String>(&entries, KEY_ASSISTANT_AVATAR) {
            if prefs.set_assistant_avatar(&symbol).is_err() {
                tracing::warn!("Ignoring stored assistant avatar {:?}", symbol);
            }
        }

        prefs
    }

    pub async fn save(&self, prefs: &Preferences) -> Result<()> {
        let entries = vec![
            (KEY_MODEL, serde_json::to_string(&prefs.model)?),
            (KEY_TEMPERATURE, serde_json::to_string(&prefs.temperature)?),
            (KEY_MAX_TOKENS, serde_json::to_string(&prefs.max_tokens)?),
            (KEY_TOP_P, serde_json::to_string(&prefs.top_p)?),
            (KEY_USER_AVATAR, serde_json::to_string(&prefs.user_avatar)?),
            (KEY_ASSISTANT_AVATAR, serde_json::to_string(&prefs.assistant_avatar)?),
        ];
        self.store.set_many(entries).await
    }
}

fn field<T: DeserializeOwned>(entries: &HashMap<String, String>, key: &str) -> Option<T> {
    let raw = entries.get(key)?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Ignoring unreadable preference {}: {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> PreferenceStore {
        PreferenceStore::new(KvStore::new(dir.path().join("user_preferences.db")))
    }

    #[tokio::test]
    async fn test_empty_store_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = store_in(&dir).load().await;

        assert_eq!(prefs.model.id(), "llama-3.3-70b-versatile");
        assert_eq!(prefs.temperature, 0.7);
        assert_eq!(prefs.max_tokens, 1024);
        assert_eq!(prefs.top_p, 0.9);
        assert_eq!(prefs.user_avatar, "👤");
        assert_eq!(prefs.assistant_avatar, "🤖");
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let mut prefs = Preferences::default();
        prefs.model = Model::Gemma7b;
        prefs.set_temperature(0.25);
        prefs.set_max_tokens(2048);
        prefs.set_top_p(0.5);
        prefs.set_user_avatar("🧑‍💻").unwrap();
        prefs.set_assistant_avatar("🔮").unwrap();
        store.save(&prefs).await.unwrap();

        assert_eq!(store.load().await, prefs);
    }

    #[tokio::test]
    async fn test_bad_fields_fall_back_individually() {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::new(dir.path().join("user_preferences.db"));
        kv.set_many(vec![
            (KEY_MODEL, "\"gpt-99\"".to_string()),
            (KEY_TEMPERATURE, "not json".to_string()),
            (KEY_MAX_TOKENS, "99999".to_string()),
            (KEY_USER_AVATAR, "\"🐙\"".to_string()),
            (KEY_ASSISTANT_AVATAR, "\"🧩\"".to_string()),
        ])
        .await
        .unwrap();

        let prefs = PreferenceStore::new(kv).load().await;
        assert_eq!(prefs.model, Model::default());
        assert_eq!(prefs.temperature, 0.7);
        assert_eq!(prefs.max_tokens, MAX_MAX_TOKENS);
        assert_eq!(prefs.user_avatar, "👤");
        assert_eq!(prefs.assistant_avatar, "🧩");
    }

    #[tokio::test]
    async fn test_unreadable_store_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = PreferenceStore::new(KvStore::new(dir.path())).load().await;
        assert_eq!(prefs, Preferences::default());
    }

    #[test]
    fn test_setters_clamp() {
        let mut prefs = Preferences::default();
        prefs.set_temperature(3.0);
        assert_eq!(prefs.temperature, 1.0);
        prefs.set_temperature(f32::NAN);
        assert_eq!(prefs.temperature, 0.7);
        prefs.set_max_tokens(10);
        assert_eq!(prefs.max_tokens, MIN_MAX_TOKENS);
        prefs.set_top_p(0.0);
        assert_eq!(prefs.top_p, MIN_TOP_P);
        assert!(prefs.set_user_avatar("🤖").is_err());
    }

    #[test]
    fn test_model_lookup() {
        assert_eq!(Model::lookup("gemma-7b"), Ok(Model::Gemma7b));
        assert_eq!(Model::lookup("claude-3.5 sonnet"), Ok(Model::Claude35Sonnet));
        assert!(Model::lookup("gpt-4").is_err());
    }
}
