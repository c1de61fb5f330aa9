// Retriever: one authenticated call to the managed search engine

use crate::citations::identify_source;
use crate::credentials::CredentialManager;
use crate::error::{OrchestratorError, RetrievalError};
use crate::models::{Facet, FacetValue, RetrievedDocument};
use crate::translate::{RetrievalRequest, SummaryRequest};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_SEARCH_BASE_URL: &str = "https://discoveryengine.googleapis.com";

/// Extractive content requested when generation happens locally.
const MAX_EXTRACTIVE_ANSWERS: u32 = 5;
const MAX_EXTRACTIVE_SEGMENTS: u32 = 1;

/// Where the engine lives.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    pub base_url: String,
    pub project_id: String,
    pub location: String,
    pub engine_id: String,
}

impl SearchEngine {
    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1alpha/projects/{}/locations/{}/collections/default_collection/engines/{}/servingConfigs/default_search:search",
            self.base_url.trim_end_matches('/'),
            self.project_id,
            self.location,
            self.engine_id
        )
    }
}

/// What one retrieval call produced.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub documents: Vec<RetrievedDocument>,
    /// Sources the engine's own summary cites; empty outside direct mode.
    pub references: Vec<RetrievedDocument>,
    pub summary: Option<String>,
    pub total_results: u64,
    pub facets: Vec<Facet>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchBody<'a> {
    #[serde(flatten)]
    retrieval: &'a RetrievalRequest,
    content_search_spec: ContentSearchSpec<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentSearchSpec<'a> {
    snippet_spec: SnippetSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary_spec: Option<&'a SummaryRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extractive_content_spec: Option<ExtractiveContentSpec>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnippetSpec {
    return_snippet: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractiveContentSpec {
    max_extractive_answer_count: u32,
    max_extractive_segment_count: u32,
}

// Response payload. Only the parts we read are modelled.

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
    #[serde(default)]
    total_size: Option<u64>,
    #[serde(default)]
    summary: Option<SummaryPayload>,
    #[serde(default)]
    facets: Vec<FacetPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    #[serde(default)]
    id: Option<String>,
    document: DocumentPayload,
    #[serde(default)]
    model_scores: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentPayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    derived_struct_data: Option<DerivedData>,
    #[serde(default)]
    struct_data: Option<Map<String, Value>>,
}

#[derive(Deserialize, Default)]
struct DerivedData {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippets: Vec<SnippetPayload>,
    #[serde(default)]
    extractive_answers: Vec<ContentPayload>,
}

#[derive(Deserialize)]
struct SnippetPayload {
    #[serde(default)]
    snippet: Option<String>,
}

#[derive(Deserialize)]
struct ContentPayload {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryPayload {
    #[serde(default)]
    summary_text: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    summary_with_metadata: Option<SummaryWithMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryWithMetadata {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    references: Vec<ReferencePayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferencePayload {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    document: Option<String>,
    #[serde(default)]
    chunk_contents: Vec<ContentPayload>,
}

#[derive(Deserialize)]
struct FacetPayload {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    values: Vec<FacetValuePayload>,
}

#[derive(Deserialize)]
struct FacetValuePayload {
    #[serde(default)]
    value: Option<String>,
    #[serde(default, deserialize_with = "count_from_string_or_number")]
    count: u64,
}

/// The API encodes int64 counts as JSON strings.
fn count_from_string_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("count is not a non-negative integer")),
        Value::String(s) => s.parse().map_err(serde::de::Error::custom),
        Value::Null => Ok(0),
        other => Err(serde::de::Error::custom(format!("unexpected count: {other}"))),
    }
}

pub struct SearchClient {
    engine: SearchEngine,
    credentials: Arc<CredentialManager>,
    client: reqwest::Client,
    timeout: Duration,
}

impl SearchClient {
    pub fn new(
        engine: SearchEngine,
        credentials: Arc<CredentialManager>,
        client: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        Self {
            engine,
            credentials,
            client,
            timeout,
        }
    }

    /// Run one retrieval. With a summary request the engine also writes the answer.
    pub async fn retrieve(
        &self,
        request: &RetrievalRequest,
        summary: Option<&SummaryRequest>,
    ) -> Result<RetrievalOutcome, OrchestratorError> {
        let token = self.credentials.get_valid_credential().await?;

        let extractive_content_spec = summary.is_none().then_some(ExtractiveContentSpec {
            max_extractive_answer_count: MAX_EXTRACTIVE_ANSWERS,
            max_extractive_segment_count: MAX_EXTRACTIVE_SEGMENTS,
        });
        let body = SearchBody {
            retrieval: request,
            content_search_spec: ContentSearchSpec {
                snippet_spec: SnippetSpec {
                    return_snippet: true,
                },
                summary_spec: summary,
                extractive_content_spec,
            },
        };

        info!(
            page_size = request.page_size,
            with_summary = summary.is_some(),
            "Retriever: searching"
        );

        let response = self
            .client
            .post(self.engine.endpoint())
            .bearer_auth(&token.token)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::timeout()
                } else {
                    RetrievalError::transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Retriever: search engine rejected request");
            return Err(RetrievalError::upstream(status.as_u16(), text).into());
        }

        let raw = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                RetrievalError::timeout()
            } else {
                RetrievalError::transport(e.to_string())
            }
        })?;
        let outcome = parse_search_response(&raw)?;

        debug!(
            documents = outcome.documents.len(),
            references = outcome.references.len(),
            total_results = outcome.total_results,
            "Retriever: search complete"
        );
        Ok(outcome)
    }
}

fn parse_search_response(raw: &[u8]) -> Result<RetrievalOutcome, RetrievalError> {
    let payload: SearchResponse = serde_json::from_slice(raw)
        .map_err(|e| RetrievalError::malformed(format!("unreadable search response: {e}")))?;

    let documents: Vec<RetrievedDocument> = payload
        .results
        .into_iter()
        .enumerate()
        .map(|(rank, result)| document_from_result(rank, result))
        .collect();

    let (summary, references) = match payload.summary {
        Some(summary) => {
            let (text, references) = match summary.summary_with_metadata {
                Some(meta) => (meta.summary, meta.references),
                None => (None, Vec::new()),
            };
            let text = text
                .or(summary.summary_text)
                .or(summary.summary)
                .filter(|s| !s.trim().is_empty());
            let references: Vec<RetrievedDocument> = references
                .into_iter()
                .enumerate()
                .map(|(index, reference)| document_from_reference(index, reference))
                .collect();
            (text, references)
        }
        None => (None, Vec::new()),
    };

    let facets = payload
        .facets
        .into_iter()
        .filter_map(|facet| {
            let key = facet.key?;
            let values: Vec<FacetValue> = facet
                .values
                .into_iter()
                .filter_map(|v| {
                    Some(FacetValue {
                        value: v.value?,
                        count: v.count,
                    })
                })
                .collect();
            (!values.is_empty()).then_some(Facet { key, values })
        })
        .collect();

    // Without a reported size, count whichever list the citations will be drawn from.
    let total_results = payload
        .total_size
        .unwrap_or(documents.len().max(references.len()) as u64);

    Ok(RetrievalOutcome {
        documents,
        references,
        summary,
        total_results,
        facets,
    })
}

fn document_from_result(rank: usize, result: SearchResult) -> RetrievedDocument {
    let doc = result.document;
    let derived = doc.derived_struct_data.unwrap_or_default();

    let snippets = derived.snippets.into_iter().filter_map(|s| s.snippet);
    let answers = derived.extractive_answers.into_iter().filter_map(|a| a.content);
    let extracts: Vec<String> = snippets
        .chain(answers)
        .filter(|text| !text.trim().is_empty())
        .collect();

    let engine_id = doc
        .id
        .or(result.id)
        .unwrap_or_else(|| format!("result-{rank}"));
    let raw_title = derived
        .title
        .or(doc.name)
        .unwrap_or_else(|| engine_id.clone());
    let url = derived.link.or(doc.uri);
    let source = identify_source(&raw_title, url.as_deref());

    let relevance_score = result
        .model_scores
        .as_ref()
        .and_then(|scores| scores.get("relevance_score"))
        .and_then(|score| score.get("values"))
        .and_then(|values| values.get(0))
        .and_then(Value::as_f64);

    RetrievedDocument {
        id: source.id.unwrap_or(engine_id),
        source_type: source.source_type,
        title: source.title,
        url,
        snippet: extracts.first().cloned(),
        extracts,
        relevance_score,
        metadata: doc.struct_data.unwrap_or_default(),
    }
}

fn document_from_reference(index: usize, reference: ReferencePayload) -> RetrievedDocument {
    let extracts: Vec<String> = reference
        .chunk_contents
        .into_iter()
        .filter_map(|c| c.content)
        .filter(|text| !text.trim().is_empty())
        .collect();
    let raw_title = reference.title.unwrap_or_else(|| "Untitled".to_string());
    let source = identify_source(&raw_title, reference.uri.as_deref());
    let fallback_id = reference
        .document
        .unwrap_or_else(|| format!("reference-{index}"));

    RetrievedDocument {
        id: source.id.unwrap_or(fallback_id),
        source_type: source.source_type,
        title: source.title,
        url: reference.uri,
        snippet: extracts.first().cloned(),
        extracts,
        relevance_score: None,
        metadata: Map::new(),
    }
}
