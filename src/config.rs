//! Application configuration
//!
//! Every setting has a default. A TOML file passed with `--config` overrides
//! the defaults, and the provider credentials come from `OPENAI_API_KEY` and
//! `OPENAI_BASE_URL` when set.

use crate::coach::provider::{
    DEFAULT_BASE_URL as DEFAULT_API_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_TEMPERATURE,
};
use crate::coach::splitter::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::data::registry::DEFAULT_BASE_URL as DEFAULT_SURVEY_URL;
use crate::training::TrainingConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    /// Root of the survey file server
    pub survey_url: String,
    pub fetch_timeout_secs: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            processed_dir: PathBuf::from("data/processed"),
            survey_url: DEFAULT_SURVEY_URL.to_string(),
            fetch_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Trained model artifact
    pub path: PathBuf,
    /// Training medians written by the feature stage
    pub medians_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/hypertension_model.json"),
            medians_path: PathBuf::from("models/feature_medians.json"),
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachConfig {
    /// Directory of `.txt` knowledge-base documents
    pub kb_dir: PathBuf,
    pub index_path: PathBuf,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
    /// Chunks retrieved per question
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub request_timeout_secs: u64,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            kb_dir: PathBuf::from("data/kb"),
            index_path: PathBuf::from("models/kb_index.json"),
            base_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_k: 4,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            request_timeout_secs: 60,
        }
    }
}

impl std::fmt::Debug for CoachConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoachConfig")
            .field("kb_dir", &self.kb_dir)
            .field("index_path", &self.index_path)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("embedding_model", &self.embedding_model)
            .field("chat_model", &self.chat_model)
            .field("temperature", &self.temperature)
            .field("top_k", &self.top_k)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub coach: CoachConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    /// Defaults, overridden by an optional TOML file and then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {:?}", path))?;
                let config = Self::from_toml_str(&text)
                    .with_context(|| format!("Invalid config {:?}", path))?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Take provider credentials from the environment
    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.coach.api_key = Some(key);
        }
        if let Some(url) = lookup(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.coach.base_url = url;
        }
    }
}
