// Generator: grounded answer streaming for the streaming path

use crate::citations::normalize;
use crate::error::GenerationError;
use crate::models::{Citation, RetrievedDocument};
use crate::translate::GenerationParams;
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use futures::{Stream, StreamExt};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn, Instrument, Span};

pub const DEFAULT_GENERATIVE_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Frames buffered between the generation task and the HTTP writer.
const EVENT_BUFFER: usize = 32;

/// Fragments of model output in arrival order.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Open one streaming generation call.
    async fn stream_generate(
        &self,
        prompt: String,
        params: &GenerationParams,
    ) -> Result<TextStream, GenerationError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<&'a GenerationParams>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ChunkError {
    #[serde(default)]
    message: String,
}

/// Finish reasons that end a normal answer. Anything else (`SAFETY`, `RECITATION`, ...) means
/// the model withheld the rest of it.
const CLEAN_FINISH_REASONS: &[&str] = &["STOP", "MAX_TOKENS", "FINISH_REASON_UNSPECIFIED"];

/// Splits an SSE byte stream into `data:` payloads.
///
/// Bytes are buffered until a full line arrives, so a multi-byte character split across network
/// chunks is decoded intact.
#[derive(Default)]
pub struct SseDecoder {
    buffer: BytesMut,
}

impl SseDecoder {
    /// Feed raw bytes, returning the text fragments of every completed event line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<String, GenerationError>> {
        self.buffer.extend_from_slice(chunk);

        let mut fragments = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);
            decode_line(&line, &mut fragments);
        }
        fragments
    }

    /// Decode whatever is left once the byte stream has ended, such as a last event line sent
    /// without its trailing newline.
    pub fn finish(&mut self) -> Vec<Result<String, GenerationError>> {
        let line = self.buffer.split();
        let mut fragments = Vec::new();
        decode_line(&line, &mut fragments);
        fragments
    }
}

fn decode_line(line: &[u8], fragments: &mut Vec<Result<String, GenerationError>>) {
    let line = match std::str::from_utf8(line) {
        Ok(line) => line.trim_end_matches('\r'),
        Err(e) => {
            fragments.push(Err(GenerationError::Stream(format!("invalid utf-8: {e}"))));
            return;
        }
    };
    let Some(payload) = line.strip_prefix("data:").map(str::trim) else {
        return;
    };
    if payload.is_empty() || payload == "[DONE]" {
        return;
    }

    let chunk: GenerateChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => {
            fragments.push(Err(GenerationError::Stream(format!("unreadable event: {e}"))));
            return;
        }
    };
    if let Some(error) = chunk.error {
        fragments.push(Err(GenerationError::Stream(error.message)));
        return;
    }
    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        fragments.push(Err(GenerationError::Blocked(reason)));
        return;
    }

    let mut text = String::new();
    let mut withheld = None;
    for candidate in chunk.candidates {
        text.extend(
            candidate
                .content
                .into_iter()
                .flat_map(|c| c.parts)
                .filter_map(|p| p.text),
        );
        if let Some(reason) = candidate.finish_reason {
            if !CLEAN_FINISH_REASONS.contains(&reason.as_str()) {
                withheld = Some(reason);
            }
        }
    }

    if !text.is_empty() {
        fragments.push(Ok(text));
    }
    if let Some(reason) = withheld {
        fragments.push(Err(GenerationError::Blocked(reason)));
    }
}

/// Gemini `streamGenerateContent` over server-sent events.
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    default_model: String,
}

impl GeminiClient {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            default_model: default_model.into(),
        }
    }

    /// The model name is one path segment; anything URL-significant in it is escaped.
    fn endpoint(&self, model: &str) -> Result<Url, GenerationError> {
        let mut url = Url::parse(self.base_url.trim_end_matches('/'))
            .map_err(|e| GenerationError::Request(format!("invalid generative url: {e}")))?;
        let action = format!("{model}:streamGenerateContent");
        url.path_segments_mut()
            .map_err(|_| GenerationError::Request("generative url cannot be a base".into()))?
            .pop_if_empty()
            .extend(["v1beta", "models", action.as_str()]);
        url.query_pairs_mut().append_pair("alt", "sse");
        Ok(url)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn stream_generate(
        &self,
        prompt: String,
        params: &GenerationParams,
    ) -> Result<TextStream, GenerationError> {
        let model = params.model.as_deref().unwrap_or(&self.default_model);
        let body = GenerateBody {
            contents: [Content {
                role: "user",
                parts: [Part { text: &prompt }],
            }],
            generation_config: (!params.is_backend_default()).then_some(params),
        };

        debug!(model, prompt_chars = prompt.chars().count(), "Generator: opening stream");

        let response = self
            .client
            .post(self.endpoint(model)?)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Request(format!("status {}: {}", status.as_u16(), text)));
        }

        let mut decoder = SseDecoder::default();
        let stream = response
            .bytes_stream()
            .map(Some)
            .chain(futures::stream::iter([None]))
            .map(move |item| match item {
                Some(Ok(bytes)) => decoder.push(&bytes),
                Some(Err(e)) => vec![Err(GenerationError::Stream(e.to_string()))],
                None => decoder.finish(),
            });

        Ok(Box::pin(stream.flat_map(futures::stream::iter)))
    }
}

/// Lifecycle of one streamed answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    ContextAssembled,
    Generating,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    Delta(String),
    Completed {
        citations: Vec<Citation>,
        elapsed: Duration,
    },
    Failed(GenerationError),
}

/// Concatenate document extracts into one grounding block of at most `max_chars` characters.
pub fn build_grounding(documents: &[RetrievedDocument], max_chars: usize) -> String {
    let mut block = String::new();
    let mut used = 0;

    for (index, doc) in documents.iter().enumerate() {
        let title = doc
            .title
            .as_deref()
            .unwrap_or_else(|| doc.source_type.label());
        let body = if doc.extracts.is_empty() {
            doc.snippet.clone().unwrap_or_default()
        } else {
            doc.extracts.join("\n")
        };
        if body.trim().is_empty() {
            continue;
        }

        let entry = format!("[{}] {}\n{}\n\n", index + 1, title, body.trim());
        let entry_chars = entry.chars().count();
        if used + entry_chars > max_chars {
            let remaining = max_chars - used;
            block.extend(entry.chars().take(remaining));
            break;
        }
        block.push_str(&entry);
        used += entry_chars;
    }

    block.trim_end().to_string()
}

pub fn build_prompt(query: &str, grounding: &str, language_code: &str) -> String {
    let context = if grounding.is_empty() {
        "(no documents were found)"
    } else {
        grounding
    };
    format!(
        "You are a knowledge-base assistant. Answer the question using only the context below.\n\
         If the context does not contain enough information to answer, say so explicitly instead of guessing.\n\
         Write the answer in the language with code \"{language_code}\".\n\n\
         Context:\n{context}\n\n\
         Question: {query}\n\n\
         Answer:"
    )
}

/// Drives one generative model call per request and reports it as [`GenerationEvent`]s.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    model: Option<Arc<dyn GenerativeModel>>,
    max_context_chars: usize,
    timeout: Duration,
}

impl GenerationOrchestrator {
    pub fn new(
        model: Option<Arc<dyn GenerativeModel>>,
        max_context_chars: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            model,
            max_context_chars,
            timeout,
        }
    }

    /// Stream an answer grounded on `documents`.
    ///
    /// The returned stream yields deltas in model order and ends with exactly one `Completed` or
    /// `Failed` event. Dropping it stops generation and releases the model stream.
    pub fn stream_answer(
        &self,
        query: String,
        language_code: String,
        documents: Vec<RetrievedDocument>,
        params: GenerationParams,
        started: Instant,
    ) -> ReceiverStream<GenerationEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let this = self.clone();

        tokio::spawn(
            async move {
                let state = this
                    .run(&tx, &query, &language_code, &documents, &params, started)
                    .await;
                debug!(?state, "Generator: finished");
            }
            .instrument(Span::current()),
        );

        ReceiverStream::new(rx)
    }

    async fn run(
        &self,
        tx: &mpsc::Sender<GenerationEvent>,
        query: &str,
        language_code: &str,
        documents: &[RetrievedDocument],
        params: &GenerationParams,
        started: Instant,
    ) -> GenerationState {
        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut state = GenerationState::Idle;

        let Some(model) = self.model.clone() else {
            return fail(tx, state, GenerationError::NotConfigured).await;
        };

        let grounding = build_grounding(documents, self.max_context_chars);
        let prompt = build_prompt(query, &grounding, language_code);
        state = transition(state, GenerationState::ContextAssembled);
        debug!(
            documents = documents.len(),
            grounding_chars = grounding.chars().count(),
            "Generator: context assembled"
        );

        let opened = tokio::time::timeout_at(deadline, model.stream_generate(prompt, params)).await;
        let mut stream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return fail(tx, state, e).await,
            Err(_) => return fail(tx, state, self.timed_out()).await,
        };
        state = transition(state, GenerationState::Generating);

        let mut fragments = 0usize;
        loop {
            let next = tokio::select! {
                _ = tx.closed() => {
                    info!(fragments, "Generator: client disconnected, stopping");
                    return transition(state, GenerationState::Failed);
                }
                next = tokio::time::timeout_at(deadline, stream.next()) => next,
            };

            match next {
                Ok(Some(Ok(text))) => {
                    if text.is_empty() {
                        continue;
                    }
                    fragments += 1;
                    if tx.send(GenerationEvent::Delta(text)).await.is_err() {
                        info!(fragments, "Generator: client disconnected, stopping");
                        return transition(state, GenerationState::Failed);
                    }
                }
                Ok(Some(Err(e))) => return fail(tx, state, e).await,
                Ok(None) if fragments == 0 => return fail(tx, state, GenerationError::Empty).await,
                Ok(None) => {
                    let citations = normalize(documents);
                    let elapsed = started.elapsed();
                    info!(
                        fragments,
                        citations = citations.len(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Generator: completed"
                    );
                    // Receiver may already be gone; nothing is left to report either way.
                    let _ = tx
                        .send(GenerationEvent::Completed { citations, elapsed })
                        .await;
                    return transition(state, GenerationState::Completed);
                }
                Err(_) => return fail(tx, state, self.timed_out()).await,
            }
        }
    }

    fn timed_out(&self) -> GenerationError {
        GenerationError::Timeout(self.timeout.as_secs())
    }
}

fn transition(from: GenerationState, to: GenerationState) -> GenerationState {
    debug!(?from, ?to, "Generator: state change");
    to
}

async fn fail(
    tx: &mpsc::Sender<GenerationEvent>,
    from: GenerationState,
    error: GenerationError,
) -> GenerationState {
    warn!(?from, error = %error, "Generator: failed");
    let _ = tx.send(GenerationEvent::Failed(error)).await;
    transition(from, GenerationState::Failed)
}
