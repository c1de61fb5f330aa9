use crate::agents::generator::DEFAULT_GENERATIVE_BASE_URL;
use crate::agents::retriever::DEFAULT_SEARCH_BASE_URL;
use crate::feedback::DEFAULT_STORAGE_BASE_URL;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub log_level: String,

    pub gcp_project_id: String,
    /// Minified service-account JSON.
    pub gcp_service_account_key: String,
    pub vertex_search_engine_id: String,
    pub vertex_search_location: String,

    pub gemini_api_key: Option<String>,
    pub gemini_model: String,

    pub feedback_bucket: String,

    pub retrieval_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub max_context_chars: usize,

    pub search_base_url: String,
    pub generative_base_url: String,
    pub storage_base_url: String,

    /// Comma-separated; empty allows any origin.
    pub allowed_origins: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_environment(::config::Environment::default())
    }

    pub fn from_environment(environment: ::config::Environment) -> Result<Self> {
        let config: Config = ::config::Config::builder()
            .set_default("port", 8080)?
            .set_default("log_level", "info")?
            .set_default("vertex_search_location", "global")?
            .set_default("gemini_model", "gemini-2.0-flash")?
            .set_default("feedback_bucket", "chat-feedback-storage")?
            .set_default("retrieval_timeout_secs", 30)?
            .set_default("generation_timeout_secs", 120)?
            .set_default("max_context_chars", 12_000)?
            .set_default("search_base_url", DEFAULT_SEARCH_BASE_URL)?
            .set_default("generative_base_url", DEFAULT_GENERATIVE_BASE_URL)?
            .set_default("storage_base_url", DEFAULT_STORAGE_BASE_URL)?
            .set_default("allowed_origins", "")?
            .add_source(environment)
            .build()?
            .try_deserialize()
            .context("GCP_PROJECT_ID, GCP_SERVICE_ACCOUNT_KEY and VERTEX_SEARCH_ENGINE_ID are required")?;

        Ok(Config {
            gemini_api_key: config.gemini_api_key.clone().filter(|k| !k.trim().is_empty()),
            ..config
        })
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_timeout_secs)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}
