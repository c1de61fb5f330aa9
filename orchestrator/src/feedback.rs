//! Answer feedback persistence.
//!
//! Each submission is written as one NDJSON object twice: to a dated archive folder and to a
//! `latest/` folder that only ever holds the current UTC day.

use crate::credentials::CredentialManager;
use crate::error::FeedbackError;
use crate::models::{FeedbackKind, FeedbackRequest, FeedbackResponse};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_STORAGE_BASE_URL: &str = "https://storage.googleapis.com";

const ROOT_PREFIX: &str = "chat-feedback";
const LATEST_PREFIX: &str = "chat-feedback/latest/";
const CLEARED_MARKER: &str = "chat-feedback/latest/.last_cleared";

const MAX_MESSAGE_ID_CHARS: usize = 200;
const MAX_REASON_CHARS: usize = 500;
const MAX_CONTENT_CHARS: usize = 200;

pub const THANK_YOU_MESSAGE: &str = "ขอบคุณสำหรับคำติชมครับ! เราจะนำไปปรับปรุง AI ให้ดีขึ้น";

/// What gets persisted for one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub message_id: String,
    pub feedback: FeedbackKind,
    pub reason: Option<String>,
    pub message_content: Option<String>,
    pub client_timestamp: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredFeedback {
    pub feedback_id: String,
    pub stored_at: String,
}

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    async fn store(
        &self,
        record: &FeedbackRecord,
        now: DateTime<Utc>,
    ) -> Result<StoredFeedback, FeedbackError>;
}

/// Validate, timestamp and persist one submission.
pub async fn submit(
    store: &dyn FeedbackStore,
    request: FeedbackRequest,
) -> Result<FeedbackResponse, FeedbackError> {
    validate(&request)?;

    let now = Utc::now();
    let record = FeedbackRecord {
        message_id: request.message_id,
        feedback: request.feedback,
        reason: request.reason.filter(|r| !r.trim().is_empty()),
        message_content: request.message_content,
        client_timestamp: request.timestamp,
        created_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
    };

    let stored = store.store(&record, now).await?;
    info!(
        feedback = record.feedback.file_prefix(),
        feedback_id = %stored.feedback_id,
        "Feedback stored"
    );

    Ok(FeedbackResponse {
        success: true,
        message: THANK_YOU_MESSAGE.to_string(),
        feedback_id: Some(stored.feedback_id),
        stored_at: Some(stored.stored_at),
        error: None,
        code: None,
    })
}

fn validate(request: &FeedbackRequest) -> Result<(), FeedbackError> {
    let id_chars = request.message_id.trim().chars().count();
    if id_chars == 0 || id_chars > MAX_MESSAGE_ID_CHARS {
        return Err(FeedbackError::Invalid(format!(
            "messageId must be 1 to {MAX_MESSAGE_ID_CHARS} characters"
        )));
    }
    if request.timestamp.trim().is_empty() {
        return Err(FeedbackError::Invalid("timestamp must not be empty".into()));
    }
    if let Some(reason) = &request.reason {
        if reason.chars().count() > MAX_REASON_CHARS {
            return Err(FeedbackError::Invalid(format!(
                "reason must be at most {MAX_REASON_CHARS} characters"
            )));
        }
    }
    if let Some(content) = &request.message_content {
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(FeedbackError::Invalid(format!(
                "messageContent must be at most {MAX_CONTENT_CHARS} characters"
            )));
        }
    }
    Ok(())
}

/// Archive and latest object names for a submission made at `at`.
pub fn feedback_paths(kind: FeedbackKind, at: DateTime<Utc>) -> (String, String) {
    let filename = format!(
        "{}_{}_{:03}.json",
        kind.file_prefix(),
        at.format("%Y%m%d_%H%M%S"),
        at.timestamp_subsec_millis()
    );
    (
        format!("{ROOT_PREFIX}/{}/{filename}", at.format("%Y-%m-%d")),
        format!("{LATEST_PREFIX}{filename}"),
    )
}

/// Whether a feedback object name carries the UTC date of `day`.
fn written_on(name: &str, day: DateTime<Utc>) -> bool {
    name.contains(&format!("_{}_", day.format("%Y%m%d")))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ObjectEntry {
    name: String,
}

/// Cloud Storage JSON API store.
pub struct GcsFeedbackStore {
    client: reqwest::Client,
    base_url: String,
    bucket: String,
    credentials: Arc<CredentialManager>,
}

impl GcsFeedbackStore {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        credentials: Arc<CredentialManager>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            bucket: bucket.into(),
            credentials,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, FeedbackError> {
        let mut url = Url::parse(self.base_url.trim_end_matches('/'))
            .map_err(|e| FeedbackError::Storage(format!("invalid storage url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| FeedbackError::Storage("storage url cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, name: &str) -> Result<Url, FeedbackError> {
        self.url(&["storage", "v1", "b", &self.bucket, "o", name])
    }

    async fn bearer(&self) -> Result<String, FeedbackError> {
        Ok(self.credentials.get_valid_credential().await?.token)
    }

    async fn upload(&self, name: &str, body: String, content_type: &str) -> Result<(), FeedbackError> {
        let url = self.url(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        let response = self
            .client
            .post(url)
            .query(&[("uploadType", "media"), ("name", name)])
            .bearer_auth(self.bearer().await?)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| FeedbackError::Storage(e.to_string()))?;
        check(response, name).await
    }

    async fn read_marker(&self) -> Result<Option<String>, FeedbackError> {
        let response = self
            .client
            .get(self.object_url(CLEARED_MARKER)?)
            .query(&[("alt", "media")])
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| FeedbackError::Storage(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(FeedbackError::Storage(format!(
                "reading {CLEARED_MARKER}: status {}",
                response.status().as_u16()
            )));
        }
        let text = response
            .text()
            .await
            .map_err(|e| FeedbackError::Storage(e.to_string()))?;
        Ok(Some(text.trim().to_string()))
    }

    async fn list_latest(&self) -> Result<Vec<String>, FeedbackError> {
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(self.url(&["storage", "v1", "b", &self.bucket, "o"])?)
                .query(&[("prefix", LATEST_PREFIX)])
                .bearer_auth(self.bearer().await?);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = request
                .send()
                .await
                .map_err(|e| FeedbackError::Storage(e.to_string()))?;
            if !response.status().is_success() {
                return Err(FeedbackError::Storage(format!(
                    "listing {LATEST_PREFIX}: status {}",
                    response.status().as_u16()
                )));
            }
            let page: ObjectList = response
                .json()
                .await
                .map_err(|e| FeedbackError::Storage(e.to_string()))?;
            names.extend(page.items.into_iter().map(|item| item.name));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => return Ok(names),
            }
        }
    }

    async fn delete(&self, name: &str) -> Result<(), FeedbackError> {
        let response = self
            .client
            .delete(self.object_url(name)?)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| FeedbackError::Storage(e.to_string()))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response, name).await
    }

    /// Empty `latest/` the first time anything is stored on a new UTC day.
    ///
    /// Objects written today are kept: a concurrent first-of-day submission may already have
    /// stored its copy before this listing.
    async fn clear_latest_if_stale(&self, now: DateTime<Utc>) -> Result<usize, FeedbackError> {
        let today = now.format("%Y-%m-%d").to_string();
        if self.read_marker().await?.as_deref() == Some(today.as_str()) {
            return Ok(0);
        }

        let stale: Vec<String> = self
            .list_latest()
            .await?
            .into_iter()
            .filter(|name| name != CLEARED_MARKER && !written_on(name, now))
            .collect();
        for name in &stale {
            self.delete(name).await?;
        }
        self.upload(CLEARED_MARKER, today, "text/plain").await?;
        Ok(stale.len())
    }
}

async fn check(response: reqwest::Response, name: &str) -> Result<(), FeedbackError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(FeedbackError::Storage(format!(
        "{name}: status {}: {body}",
        status.as_u16()
    )))
}

#[async_trait]
impl FeedbackStore for GcsFeedbackStore {
    async fn store(
        &self,
        record: &FeedbackRecord,
        now: DateTime<Utc>,
    ) -> Result<StoredFeedback, FeedbackError> {
        let today = now.format("%Y-%m-%d").to_string();
        match self.clear_latest_if_stale(now).await {
            Ok(0) => {}
            Ok(cleared) => info!(cleared, day = %today, "Feedback: cleared latest folder"),
            Err(e) => warn!(error = %e, "Feedback: failed to clear latest folder"),
        }

        let (archive, latest) = feedback_paths(record.feedback, now);
        let line = serde_json::to_string(record)
            .map_err(|e| FeedbackError::Storage(e.to_string()))?;

        self.upload(&archive, line.clone(), "application/x-ndjson")
            .await?;
        self.upload(&latest, line, "application/x-ndjson").await?;

        Ok(StoredFeedback {
            feedback_id: archive,
            stored_at: record.created_at.clone(),
        })
    }
}
