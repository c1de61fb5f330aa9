#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rag_orchestrator::agents::generator::{GeminiClient, GenerationOrchestrator, GenerativeModel};
use rag_orchestrator::agents::retriever::{SearchClient, SearchEngine};
use rag_orchestrator::api::AppState;
use rag_orchestrator::credentials::{AccessToken, CredentialManager, TokenSource};
use rag_orchestrator::error::AuthError;
use rag_orchestrator::feedback::GcsFeedbackStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const SEARCH_PATH: &str = "/v1alpha/projects/kb-project/locations/global/collections/default_collection/engines/kb-engine/servingConfigs/default_search:search";
pub const GEMINI_PATH: &str = "/v1beta/models/gemini-2.0-flash:streamGenerateContent";
pub const BUCKET: &str = "feedback-test";

/// Hands out one long-lived token without talking to an identity provider.
pub struct StaticTokenSource;

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        Ok(AccessToken::new(
            "test-token",
            Utc::now() + ChronoDuration::hours(1),
        ))
    }
}

/// An identity provider that refuses every exchange.
pub struct RejectingTokenSource;

#[async_trait]
impl TokenSource for RejectingTokenSource {
    async fn fetch_token(&self) -> Result<AccessToken, AuthError> {
        Err(AuthError::Exchange("invalid_grant".to_string()))
    }
}

pub fn credentials() -> Arc<CredentialManager> {
    Arc::new(CredentialManager::new(Arc::new(StaticTokenSource)))
}

/// Application state with every collaborator pointed at `base_url`.
pub fn state(base_url: &str, with_model: bool) -> AppState {
    state_with(base_url, with_model, credentials(), Duration::from_secs(5))
}

pub fn state_with(
    base_url: &str,
    with_model: bool,
    credentials: Arc<CredentialManager>,
    retrieval_timeout: Duration,
) -> AppState {
    let http = reqwest::Client::new();

    let search = Arc::new(SearchClient::new(
        SearchEngine {
            base_url: base_url.to_string(),
            project_id: "kb-project".to_string(),
            location: "global".to_string(),
            engine_id: "kb-engine".to_string(),
        },
        credentials.clone(),
        http.clone(),
        retrieval_timeout,
    ));

    let model = with_model.then(|| {
        Arc::new(GeminiClient::new(
            http.clone(),
            base_url,
            "test-api-key",
            "gemini-2.0-flash",
        )) as Arc<dyn GenerativeModel>
    });

    AppState {
        search,
        generator: GenerationOrchestrator::new(model, 12_000, Duration::from_secs(5)),
        feedback: Arc::new(GcsFeedbackStore::new(http, base_url, BUCKET, credentials)),
    }
}

/// Decode every `data:` event of an SSE body.
pub fn sse_frames(body: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(body)
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).expect("frame is JSON"))
        .collect()
}

/// One Gemini SSE event carrying `text`.
pub fn gemini_event(text: &str) -> String {
    let chunk = serde_json::json!({
        "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
    });
    format!("data: {chunk}\r\n\r\n")
}
