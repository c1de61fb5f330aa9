use serde::{Deserialize, Serialize};

// API Request/Response models

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Streaming,
    Direct,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Streaming => "streaming",
            Mode::Direct => "direct",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryExpansion {
    #[default]
    Auto,
    Disabled,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpellCorrection {
    #[default]
    Auto,
    Disabled,
    SuggestionOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelevanceThreshold {
    Lowest,
    Low,
    Medium,
    High,
    Highest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryModelVersion {
    #[default]
    Stable,
    Preview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionBoostSpec {
    pub condition: String,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreshnessBoostSpec {
    pub datetime_field: String,
    pub freshness_duration: String,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoostSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_boost_specs: Option<Vec<ConditionBoostSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness_boost_specs: Option<Vec<FreshnessBoostSpec>>,
}

impl BoostSpec {
    pub fn is_empty(&self) -> bool {
        self.condition_boost_specs.as_ref().map_or(true, Vec::is_empty)
            && self.freshness_boost_specs.as_ref().map_or(true, Vec::is_empty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetKey {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetSpec {
    pub facet_key: FacetKey,
    #[serde(default = "default_facet_limit")]
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_filter_keys: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub enable_dynamic_position: bool,
}

fn default_facet_limit() -> u32 {
    20
}

fn default_true() -> bool {
    true
}

/// Inbound search payload. Only `query` is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub mode: Mode,
    pub page_size: Option<u32>,
    pub model: Option<String>,

    pub query_expansion: Option<QueryExpansion>,
    pub spell_correction: Option<SpellCorrection>,

    pub filter: Option<String>,
    pub canonical_filter: Option<String>,
    pub boost_spec: Option<BoostSpec>,
    pub facet_specs: Option<Vec<FacetSpec>>,
    pub relevance_threshold: Option<RelevanceThreshold>,

    pub custom_system_prompt: Option<String>,
    pub use_semantic_chunks: Option<bool>,
    pub summary_result_count: Option<u32>,
    pub language_code: Option<String>,
    pub summary_model_version: Option<SummaryModelVersion>,

    pub return_relevance_score: Option<bool>,
    pub safe_search: Option<bool>,

    pub temperature: Option<f32>,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// Closed set of knowledge-base source categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Faq,
    Course,
    About,
    Promotion,
    Info,
    Unknown,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Faq => "faq",
            SourceType::Course => "course",
            SourceType::About => "about",
            SourceType::Promotion => "promotion",
            SourceType::Info => "info",
            SourceType::Unknown => "unknown",
        }
    }

    /// Display title used when a document carries none of its own.
    pub fn label(&self) -> &'static str {
        match self {
            SourceType::Faq => "คำถามที่พบบ่อย",
            SourceType::Course => "หลักสูตรอบรม",
            SourceType::About => "เกี่ยวกับเรา",
            SourceType::Promotion => "โปรโมชั่น",
            SourceType::Info => "ข้อมูลทั่วไป",
            SourceType::Unknown => "Untitled",
        }
    }

    /// FAQ entries live inside a single data file and have no page of their own.
    pub fn has_public_url(&self) -> bool {
        !matches!(self, SourceType::Faq)
    }
}

/// One search hit as returned by the search engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub id: String,
    pub source_type: SourceType,
    pub title: Option<String>,
    pub url: Option<String>,
    /// First snippet or extractive answer, used for citation previews.
    pub snippet: Option<String>,
    /// Every snippet and extractive answer, used to ground generation.
    pub extracts: Vec<String>,
    pub relevance_score: Option<f64>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub id: String,
    pub title: String,
    pub source_type: SourceType,
    pub url: Option<String>,
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetValue {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub key: String,
    pub values: Vec<FacetValue>,
}

/// Terminal payload of a direct-mode request, also used for JSON error bodies.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectResult {
    pub success: bool,
    pub mode: Mode,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<Vec<Facet>>,
    pub total_results: u64,
    pub response_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// One streamed event. `done` is true exactly once, on the last frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFrame {
    pub chunk: String,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citations: Option<Vec<Citation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Up,
    Down,
}

impl FeedbackKind {
    pub fn file_prefix(&self) -> &'static str {
        match self {
            FeedbackKind::Up => "positive",
            FeedbackKind::Down => "negative",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
    pub message_id: String,
    pub feedback: FeedbackKind,
    pub reason: Option<String>,
    pub timestamp: String,
    pub message_content: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    pub success: bool,
    pub message: String,
    pub feedback_id: Option<String>,
    pub stored_at: Option<String>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}
