//! Query configuration translation.
//!
//! Turns an inbound [`SearchRequest`] into a validated [`SearchConfiguration`] and then into the
//! backend request shapes for one of the two execution paths. This is the only place request
//! input is validated; everything downstream trusts the [`QueryPlan`] it produces.

use crate::error::ConfigurationError;
use crate::models::{
    BoostSpec, FacetSpec, Mode, QueryExpansion, RelevanceThreshold, SearchRequest,
    SpellCorrection, SummaryModelVersion,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::RangeInclusive;

pub const MAX_QUERY_CHARS: usize = 500;
pub const MAX_PROMPT_CHARS: usize = 2000;
pub const MAX_FACET_SPECS: usize = 100;

const PAGE_SIZE: RangeInclusive<u32> = 1..=50;
const SUMMARY_RESULT_COUNT: RangeInclusive<u32> = 1..=10;
const FACET_LIMIT: RangeInclusive<u32> = 1..=100;
const BOOST: RangeInclusive<f32> = -1.0..=1.0;
const TEMPERATURE: RangeInclusive<f32> = 0.0..=2.0;
const TOP_K: RangeInclusive<u32> = 1..=40;
const TOP_P: RangeInclusive<f32> = 0.0..=1.0;
const MAX_OUTPUT_TOKENS: RangeInclusive<u32> = 1..=8192;

const MAX_MODEL_NAME_LEN: usize = 100;

const DEFAULT_PAGE_SIZE: u32 = 5;
const DEFAULT_SUMMARY_RESULT_COUNT: u32 = 5;
const DEFAULT_LANGUAGE_CODE: &str = "th";

// Top-level request keys, checked in this order to name the field a decode error belongs to.
const REQUEST_FIELDS: &[&str] = &[
    "query",
    "mode",
    "pageSize",
    "model",
    "queryExpansion",
    "spellCorrection",
    "filter",
    "canonicalFilter",
    "boostSpec",
    "facetSpecs",
    "relevanceThreshold",
    "customSystemPrompt",
    "useSemanticChunks",
    "summaryResultCount",
    "languageCode",
    "summaryModelVersion",
    "returnRelevanceScore",
    "safeSearch",
    "temperature",
    "topK",
    "topP",
    "maxOutputTokens",
];

/// Validated, immutable search configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfiguration {
    pub query: String,
    pub page_size: u32,
    pub query_expansion: QueryExpansion,
    pub spell_correction: SpellCorrection,
    pub filter: Option<String>,
    pub canonical_filter: Option<String>,
    pub boost_spec: Option<BoostSpec>,
    pub facet_specs: Vec<FacetSpec>,
    pub relevance_threshold: Option<RelevanceThreshold>,
    pub return_relevance_score: bool,
    pub safe_search: bool,
    pub language_code: String,
    pub mode: ModeOptions,
}

/// Mode-specific options. Options belonging to the other mode are dropped at construction.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeOptions {
    Direct(SummaryOptions),
    Streaming(GenerationParams),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOptions {
    pub custom_prompt: Option<String>,
    pub use_semantic_chunks: bool,
    pub result_count: u32,
    pub model_version: SummaryModelVersion,
}

/// Generation parameters. `None` means "use the backend default"; nothing is filled in here.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip)]
    pub model: Option<String>,
}

impl GenerationParams {
    pub fn is_backend_default(&self) -> bool {
        self.temperature.is_none()
            && self.top_k.is_none()
            && self.top_p.is_none()
            && self.max_output_tokens.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryExpansionSpec {
    pub condition: QueryExpansion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpellCorrectionSpec {
    pub mode: SpellCorrection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevanceScoreSpec {
    pub return_relevance_score: bool,
}

/// Retrieval fields, identical in both modes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalRequest {
    pub query: String,
    pub page_size: u32,
    pub query_expansion_spec: QueryExpansionSpec,
    pub spell_correction_spec: SpellCorrectionSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boost_spec: Option<BoostSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facet_specs: Vec<FacetSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_threshold: Option<RelevanceThreshold>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub safe_search: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score_spec: Option<RelevanceScoreSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSpec {
    pub version: SummaryModelVersion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelPromptSpec {
    pub preamble: String,
}

/// Summary spec sent alongside retrieval in direct mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub summary_result_count: u32,
    pub include_citations: bool,
    pub ignore_adversarial_query: bool,
    pub ignore_jail_breaking_query: bool,
    pub model_spec: ModelSpec,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub use_semantic_chunks: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_prompt_spec: Option<ModelPromptSpec>,
    pub language_code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModePlan {
    Direct { summary: SummaryRequest },
    Streaming { generation: GenerationParams },
}

/// Everything the rest of a request needs, resolved once.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub query: String,
    pub language_code: String,
    pub retrieval: RetrievalRequest,
    pub mode: ModePlan,
}

impl QueryPlan {
    pub fn mode(&self) -> Mode {
        match self.mode {
            ModePlan::Direct { .. } => Mode::Direct,
            ModePlan::Streaming { .. } => Mode::Streaming,
        }
    }

    pub fn summary_request(&self) -> Option<&SummaryRequest> {
        match &self.mode {
            ModePlan::Direct { summary } => Some(summary),
            ModePlan::Streaming { .. } => None,
        }
    }

    pub fn generation_params(&self) -> Option<&GenerationParams> {
        match &self.mode {
            ModePlan::Direct { .. } => None,
            ModePlan::Streaming { generation } => Some(generation),
        }
    }
}

/// Decode a JSON request body. Shape errors (wrong types, unknown enum values, negative counts)
/// are configuration errors naming the offending top-level field.
pub fn decode_request(body: &Value) -> Result<SearchRequest, ConfigurationError> {
    let Value::Object(fields) = body else {
        return Err(ConfigurationError::new("body", "must be a JSON object"));
    };
    if !fields.contains_key("query") {
        return Err(ConfigurationError::new("query", "is required"));
    }

    SearchRequest::deserialize(body).map_err(|e| {
        let field = REQUEST_FIELDS
            .iter()
            .copied()
            .find(|name| rejects_field(name, fields))
            .unwrap_or("body");
        ConfigurationError::new(field, e.to_string())
    })
}

fn rejects_field(name: &str, fields: &Map<String, Value>) -> bool {
    let Some(value) = fields.get(name) else {
        return false;
    };
    let mut alone = Map::new();
    alone.insert("query".to_string(), Value::String(String::new()));
    alone.insert(name.to_string(), value.clone());
    SearchRequest::deserialize(&Value::Object(alone)).is_err()
}

/// Validate a request and resolve it into backend requests.
pub fn translate(request: SearchRequest) -> Result<QueryPlan, ConfigurationError> {
    let config = SearchConfiguration::try_from(request)?;
    Ok(plan(config))
}

/// Build the backend requests for an already validated configuration.
pub fn plan(config: SearchConfiguration) -> QueryPlan {
    let relevance_score_spec = config.return_relevance_score.then_some(RelevanceScoreSpec {
        return_relevance_score: true,
    });

    let retrieval = RetrievalRequest {
        query: config.query.clone(),
        page_size: config.page_size,
        query_expansion_spec: QueryExpansionSpec {
            condition: config.query_expansion,
        },
        spell_correction_spec: SpellCorrectionSpec {
            mode: config.spell_correction,
        },
        filter: config.filter,
        canonical_filter: config.canonical_filter,
        boost_spec: config.boost_spec,
        facet_specs: config.facet_specs,
        relevance_threshold: config.relevance_threshold,
        safe_search: config.safe_search,
        relevance_score_spec,
    };

    let mode = match config.mode {
        ModeOptions::Direct(options) => ModePlan::Direct {
            summary: SummaryRequest {
                summary_result_count: options.result_count,
                include_citations: true,
                ignore_adversarial_query: true,
                ignore_jail_breaking_query: true,
                model_spec: ModelSpec {
                    version: options.model_version,
                },
                use_semantic_chunks: options.use_semantic_chunks,
                model_prompt_spec: options
                    .custom_prompt
                    .map(|preamble| ModelPromptSpec { preamble }),
                language_code: config.language_code.clone(),
            },
        },
        ModeOptions::Streaming(generation) => ModePlan::Streaming { generation },
    };

    QueryPlan {
        query: config.query,
        language_code: config.language_code,
        retrieval,
        mode,
    }
}

impl TryFrom<SearchRequest> for SearchConfiguration {
    type Error = ConfigurationError;

    fn try_from(request: SearchRequest) -> Result<Self, Self::Error> {
        let query_chars = request.query.chars().count();
        if query_chars == 0 {
            return Err(ConfigurationError::new("query", "must not be empty"));
        }
        if query_chars > MAX_QUERY_CHARS {
            return Err(ConfigurationError::new(
                "query",
                format!("must be at most {MAX_QUERY_CHARS} characters, got {query_chars}"),
            ));
        }

        let page_size = in_range(
            "pageSize",
            request.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            PAGE_SIZE,
        )?;

        if let Some(prompt) = &request.custom_system_prompt {
            let prompt_chars = prompt.chars().count();
            if prompt_chars > MAX_PROMPT_CHARS {
                return Err(ConfigurationError::new(
                    "customSystemPrompt",
                    format!("must be at most {MAX_PROMPT_CHARS} characters, got {prompt_chars}"),
                ));
            }
        }

        let summary_result_count = in_range(
            "summaryResultCount",
            request
                .summary_result_count
                .unwrap_or(DEFAULT_SUMMARY_RESULT_COUNT),
            SUMMARY_RESULT_COUNT,
        )?;

        let language_code = match request.language_code {
            Some(code) if code.trim().is_empty() => {
                return Err(ConfigurationError::new(
                    "languageCode",
                    "must not be empty",
                ))
            }
            Some(code) => code.trim().to_string(),
            None => DEFAULT_LANGUAGE_CODE.to_string(),
        };

        let boost_spec = match request.boost_spec {
            Some(spec) => {
                validate_boosts(&spec)?;
                (!spec.is_empty()).then_some(spec)
            }
            None => None,
        };

        let facet_specs = request.facet_specs.unwrap_or_default();
        validate_facets(&facet_specs)?;

        let generation = GenerationParams {
            temperature: optional_in_range("temperature", request.temperature, TEMPERATURE)?,
            top_k: optional_in_range("topK", request.top_k, TOP_K)?,
            top_p: optional_in_range("topP", request.top_p, TOP_P)?,
            max_output_tokens: optional_in_range(
                "maxOutputTokens",
                request.max_output_tokens,
                MAX_OUTPUT_TOKENS,
            )?,
            model: model_name(request.model)?,
        };

        let mode = match request.mode {
            Mode::Direct => ModeOptions::Direct(SummaryOptions {
                custom_prompt: non_blank(request.custom_system_prompt),
                use_semantic_chunks: request.use_semantic_chunks.unwrap_or(true),
                result_count: summary_result_count,
                model_version: request.summary_model_version.unwrap_or_default(),
            }),
            Mode::Streaming => ModeOptions::Streaming(generation),
        };

        Ok(Self {
            query: request.query,
            page_size,
            query_expansion: request.query_expansion.unwrap_or_default(),
            spell_correction: request.spell_correction.unwrap_or_default(),
            filter: non_blank(request.filter),
            canonical_filter: non_blank(request.canonical_filter),
            boost_spec,
            facet_specs,
            relevance_threshold: request.relevance_threshold,
            return_relevance_score: request.return_relevance_score.unwrap_or(false),
            safe_search: request.safe_search.unwrap_or(false),
            language_code,
            mode,
        })
    }
}

fn in_range<T>(field: &'static str, value: T, range: RangeInclusive<T>) -> Result<T, ConfigurationError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigurationError::new(
            field,
            format!(
                "must be between {} and {}, got {value}",
                range.start(),
                range.end()
            ),
        ))
    }
}

fn optional_in_range<T>(
    field: &'static str,
    value: Option<T>,
    range: RangeInclusive<T>,
) -> Result<Option<T>, ConfigurationError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    value.map(|v| in_range(field, v, range)).transpose()
}

/// Model names are plain identifiers such as `gemini-2.0-flash`.
fn model_name(value: Option<String>) -> Result<Option<String>, ConfigurationError> {
    let Some(model) = non_blank(value) else {
        return Ok(None);
    };
    let model = model.trim();
    if model.len() > MAX_MODEL_NAME_LEN
        || !model
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(ConfigurationError::new(
            "model",
            "must contain only letters, digits, '.', '_' or '-'",
        ));
    }
    Ok(Some(model.to_string()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn validate_boosts(spec: &BoostSpec) -> Result<(), ConfigurationError> {
    for boost in spec.condition_boost_specs.iter().flatten() {
        if boost.condition.trim().is_empty() {
            return Err(ConfigurationError::new(
                "boostSpec.conditionBoostSpecs.condition",
                "must not be empty",
            ));
        }
        in_range("boostSpec.conditionBoostSpecs.boost", boost.boost, BOOST)?;
    }
    for boost in spec.freshness_boost_specs.iter().flatten() {
        if boost.datetime_field.trim().is_empty() {
            return Err(ConfigurationError::new(
                "boostSpec.freshnessBoostSpecs.datetimeField",
                "must not be empty",
            ));
        }
        in_range("boostSpec.freshnessBoostSpecs.boost", boost.boost, BOOST)?;
    }
    Ok(())
}

fn validate_facets(specs: &[FacetSpec]) -> Result<(), ConfigurationError> {
    if specs.len() > MAX_FACET_SPECS {
        return Err(ConfigurationError::new(
            "facetSpecs",
            format!("at most {MAX_FACET_SPECS} facet specs are allowed, got {}", specs.len()),
        ));
    }
    for spec in specs {
        if spec.facet_key.key.trim().is_empty() {
            return Err(ConfigurationError::new(
                "facetSpecs.facetKey.key",
                "must not be empty",
            ));
        }
        in_range("facetSpecs.limit", spec.limit, FACET_LIMIT)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConditionBoostSpec, FacetKey};
    use serde_json::json;

    fn request(query: &str, mode: Mode) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            mode,
            ..Default::default()
        }
    }

    #[test]
    fn direct_mode_never_prepares_generation() {
        let mut req = request("คอร์ส AI", Mode::Direct);
        req.temperature = Some(0.2);
        req.top_k = Some(10);
        req.model = Some("gemini-2.5-flash".into());

        let plan = translate(req).unwrap();
        assert_eq!(plan.mode(), Mode::Direct);
        assert!(plan.generation_params().is_none());
        let summary = plan.summary_request().unwrap();
        assert_eq!(summary.summary_result_count, 5);
        assert_eq!(summary.language_code, "th");
        assert!(summary.use_semantic_chunks);
    }

    #[test]
    fn streaming_mode_never_prepares_summary() {
        let mut req = request("What is Python?", Mode::Streaming);
        req.custom_system_prompt = Some("Be brief".into());
        req.summary_result_count = Some(3);

        let plan = translate(req).unwrap();
        assert!(plan.summary_request().is_none());
        assert!(plan.generation_params().is_some());
    }

    #[test]
    fn unset_generation_params_stay_unset() {
        let mut req = request("What is Python?", Mode::Streaming);
        req.temperature = Some(0.2);

        let plan = translate(req).unwrap();
        let params = plan.generation_params().unwrap();
        assert_eq!(params.temperature, Some(0.2));
        assert_eq!(params.top_k, None);
        assert_eq!(params.top_p, None);
        assert_eq!(params.max_output_tokens, None);
        assert_eq!(params.model, None);
        assert_eq!(serde_json::to_value(params).unwrap(), json!({ "temperature": 0.2f32 }));
    }

    #[test]
    fn defaults_follow_field_reference() {
        let plan = translate(request("hello", Mode::Direct)).unwrap();
        assert_eq!(plan.retrieval.page_size, 5);
        assert_eq!(plan.retrieval.query_expansion_spec.condition, QueryExpansion::Auto);
        assert_eq!(plan.retrieval.spell_correction_spec.mode, SpellCorrection::Auto);
        assert_eq!(
            plan.summary_request().unwrap().model_spec.version,
            SummaryModelVersion::Stable
        );

        let req: SearchRequest = serde_json::from_value(json!({ "query": "hello" })).unwrap();
        assert_eq!(translate(req).unwrap().mode(), Mode::Streaming);
    }

    #[test]
    fn retrieval_fields_do_not_depend_on_mode() {
        let build = |mode| {
            let mut req = request("python", mode);
            req.filter = Some("category: ANY(\"course\")".into());
            req.page_size = Some(8);
            req.relevance_threshold = Some(RelevanceThreshold::High);
            req.facet_specs = Some(vec![FacetSpec {
                facet_key: FacetKey {
                    key: "category".into(),
                    restricted_values: None,
                },
                limit: 10,
                excluded_filter_keys: None,
                enable_dynamic_position: true,
            }]);
            translate(req).unwrap().retrieval
        };
        assert_eq!(build(Mode::Direct), build(Mode::Streaming));
    }

    #[test]
    fn prompt_over_limit_names_the_field() {
        let mut req = request("hello", Mode::Streaming);
        req.custom_system_prompt = Some("a".repeat(2001));
        let err = translate(req).unwrap_err();
        assert_eq!(err.field, "customSystemPrompt");

        let mut req = request("hello", Mode::Direct);
        req.custom_system_prompt = Some("ก".repeat(2000));
        assert!(translate(req).is_ok());
    }

    #[test]
    fn query_length_bounds() {
        assert_eq!(translate(request("", Mode::Direct)).unwrap_err().field, "query");
        assert!(translate(request(" ", Mode::Direct)).is_ok());
        assert!(translate(request(&"ก".repeat(500), Mode::Direct)).is_ok());
        assert_eq!(
            translate(request(&"a".repeat(501), Mode::Direct)).unwrap_err().field,
            "query"
        );
    }

    #[test]
    fn model_name_must_be_an_identifier() {
        for model in ["gemini-2.0-flash:generateContent?x=", "../v1/files", "a b"] {
            let mut req = request("hello", Mode::Streaming);
            req.model = Some(model.into());
            assert_eq!(translate(req).unwrap_err().field, "model");
        }

        let mut req = request("hello", Mode::Streaming);
        req.model = Some(" gemini-2.5-pro ".into());
        let plan = translate(req).unwrap();
        assert_eq!(
            plan.generation_params().unwrap().model.as_deref(),
            Some("gemini-2.5-pro")
        );
    }

    #[test]
    fn decode_errors_name_the_field() {
        let field = |body: Value| decode_request(&body).unwrap_err().field;

        assert_eq!(
            field(json!({ "query": "hi", "mode": "direct", "queryExpansion": "SOMETIMES" })),
            "queryExpansion"
        );
        assert_eq!(field(json!({ "query": "hi", "topK": -3 })), "topK");
        assert_eq!(field(json!({ "query": "hi", "pageSize": "ten" })), "pageSize");
        assert_eq!(field(json!({ "query": "hi", "mode": "batch" })), "mode");
        assert_eq!(field(json!({ "query": 42 })), "query");
        assert_eq!(field(json!({ "mode": "direct" })), "query");
        assert_eq!(field(json!(["query"])), "body");

        let err = decode_request(&json!({ "query": "hi", "queryExpansion": "SOMETIMES" }))
            .unwrap_err();
        assert!(err.message.contains("SOMETIMES"));
    }

    #[test]
    fn decoded_request_ignores_unknown_keys_and_nulls() {
        let req = decode_request(&json!({
            "query": "hi",
            "mode": "direct",
            "temperature": null,
            "sessionId": "abc"
        }))
        .unwrap();
        assert_eq!(req.mode, Mode::Direct);
        assert_eq!(req.temperature, None);
    }

    #[test]
    fn numeric_ranges_are_enforced() {
        let mut req = request("hello", Mode::Streaming);
        req.temperature = Some(2.5);
        assert_eq!(translate(req).unwrap_err().field, "temperature");

        let mut req = request("hello", Mode::Streaming);
        req.top_k = Some(0);
        assert_eq!(translate(req).unwrap_err().field, "topK");

        let mut req = request("hello", Mode::Streaming);
        req.top_p = Some(1.5);
        assert_eq!(translate(req).unwrap_err().field, "topP");

        let mut req = request("hello", Mode::Streaming);
        req.max_output_tokens = Some(9000);
        assert_eq!(translate(req).unwrap_err().field, "maxOutputTokens");

        let mut req = request("hello", Mode::Direct);
        req.summary_result_count = Some(11);
        assert_eq!(translate(req).unwrap_err().field, "summaryResultCount");

        let mut req = request("hello", Mode::Direct);
        req.page_size = Some(0);
        assert_eq!(translate(req).unwrap_err().field, "pageSize");
    }

    #[test]
    fn boosts_must_stay_within_unit_range() {
        let mut req = request("hello", Mode::Direct);
        req.boost_spec = Some(BoostSpec {
            condition_boost_specs: Some(vec![ConditionBoostSpec {
                condition: "rating >= 4.5".into(),
                boost: 1.5,
            }]),
            freshness_boost_specs: None,
        });
        assert_eq!(
            translate(req).unwrap_err().field,
            "boostSpec.conditionBoostSpecs.boost"
        );
    }

    #[test]
    fn empty_boost_spec_is_dropped() {
        let mut req = request("hello", Mode::Direct);
        req.boost_spec = Some(BoostSpec::default());
        req.filter = Some("  ".into());
        let plan = translate(req).unwrap();
        assert!(plan.retrieval.boost_spec.is_none());
        assert!(plan.retrieval.filter.is_none());
    }

    #[test]
    fn summary_spec_serializes_backend_shape() {
        let mut req = request("hello", Mode::Direct);
        req.custom_system_prompt = Some("Answer politely".into());
        req.summary_model_version = Some(SummaryModelVersion::Preview);
        req.return_relevance_score = Some(true);
        let plan = translate(req).unwrap();

        let summary = serde_json::to_value(plan.summary_request().unwrap()).unwrap();
        assert_eq!(summary["modelPromptSpec"]["preamble"], "Answer politely");
        assert_eq!(summary["modelSpec"]["version"], "preview");
        assert_eq!(summary["ignoreJailBreakingQuery"], true);
        assert_eq!(summary["useSemanticChunks"], true);

        let retrieval = serde_json::to_value(&plan.retrieval).unwrap();
        assert_eq!(retrieval["queryExpansionSpec"]["condition"], "AUTO");
        assert_eq!(retrieval["relevanceScoreSpec"]["returnRelevanceScore"], true);
        assert!(retrieval.get("safeSearch").is_none());
        assert!(retrieval.get("facetSpecs").is_none());
    }
}
