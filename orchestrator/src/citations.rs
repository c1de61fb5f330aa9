//! Citation normalization.
//!
//! Converts retrieved documents into uniform [`Citation`]s. Order is retrieval order and is never
//! re-sorted; duplicate ids keep their first occurrence.

use crate::models::{Citation, RetrievedDocument, SourceType};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Maximum snippet length in characters, ellipsis included.
pub const SNIPPET_MAX_CHARS: usize = 200;
const ELLIPSIS: &str = "...";

static SOURCE_FILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/json/([^/]+)\.json").unwrap());

// Applied in order by `clean_snippet`, repeatedly until nothing changes.
static SNIPPET_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r#"^_""#, ""),
        (r#""_$"#, ""),
        (r#"\\""#, "\""),
        (r"\\n", " "),
        (r"<[^>]+>", ""),
        (r#""[\w_]+"\s*:\s*""#, ""),
        (r#"",\s*""#, " "),
        (r#"[{}\[\]"]"#, ""),
        (r"\s+", " "),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

/// Normalize documents into citations, preserving order and dropping repeated ids.
pub fn normalize(documents: &[RetrievedDocument]) -> Vec<Citation> {
    let mut seen = HashSet::new();
    documents
        .iter()
        .filter(|doc| seen.insert(doc.id.as_str()))
        .map(to_citation)
        .collect()
}

fn to_citation(doc: &RetrievedDocument) -> Citation {
    let title = doc
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| doc.source_type.label().to_string());

    Citation {
        id: doc.id.clone(),
        title,
        source_type: doc.source_type,
        url: public_url(doc.source_type, doc.url.as_deref()),
        snippet: doc
            .snippet
            .as_deref()
            .map(clean_snippet)
            .filter(|s| !s.is_empty()),
        relevance_score: doc.relevance_score,
    }
}

/// Internal storage URIs are never exposed, and some source types have no page at all.
fn public_url(source_type: SourceType, url: Option<&str>) -> Option<String> {
    url.filter(|u| source_type.has_public_url() && !u.is_empty() && !u.starts_with("gs://"))
        .map(str::to_string)
}

/// Strip markup and JSON debris from a raw snippet and bound its length.
///
/// Removing one artifact can expose another (dropping the bracket from `\[n` leaves `\n`), so
/// the rules run to a fixed point. A cleaned snippet therefore cleans to itself.
pub fn clean_snippet(raw: &str) -> String {
    let mut text = raw.to_string();
    loop {
        let next = apply_snippet_rules(&text);
        if next == text {
            break;
        }
        text = next;
    }
    truncate(text.trim(), SNIPPET_MAX_CHARS)
}

fn apply_snippet_rules(text: &str) -> String {
    SNIPPET_RULES
        .iter()
        .fold(text.to_string(), |text, (pattern, replacement)| {
            pattern.replace_all(&text, *replacement).into_owned()
        })
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let keep = max_chars - ELLIPSIS.len();
    let head: String = text.chars().take(keep).collect();
    let head = match head.rsplit_once(' ') {
        Some((before, _)) if !before.trim().is_empty() => before.trim_end(),
        _ => head.trim_end(),
    };
    format!("{head}{ELLIPSIS}")
}

/// Where a document came from, as far as its title and URI tell.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub id: Option<String>,
    pub source_type: SourceType,
    pub title: Option<String>,
}

/// Identify a source from a `[source-id]` title or a `.../json/<source-id>.json` URI.
pub fn identify_source(title: &str, uri: Option<&str>) -> SourceInfo {
    let title = title.trim();

    let source_id = if title.len() > 2 && title.starts_with('[') && title.ends_with(']') {
        Some(title[1..title.len() - 1].to_string())
    } else {
        uri.and_then(|u| SOURCE_FILE.captures(u))
            .map(|caps| caps[1].to_string())
    };

    let Some(id) = source_id else {
        return SourceInfo {
            id: None,
            source_type: SourceType::Unknown,
            title: (!title.is_empty()).then(|| title.to_string()),
        };
    };

    let lower = id.to_lowercase();
    let (source_type, title) = if lower.contains("faq") {
        (SourceType::Faq, SourceType::Faq.label().to_string())
    } else if lower.contains("course") {
        (SourceType::Course, SourceType::Course.label().to_string())
    } else if lower.contains("about") {
        (SourceType::About, SourceType::About.label().to_string())
    } else if lower.contains("promotion") {
        (SourceType::Promotion, SourceType::Promotion.label().to_string())
    } else if lower.contains("online") {
        (SourceType::Course, "คอร์สออนไลน์".to_string())
    } else if lower.contains("public") {
        (SourceType::Course, "คอร์สสาธารณะ".to_string())
    } else {
        (SourceType::Info, title_case(&id.replace('-', " ")))
    };

    SourceInfo {
        id: Some(id),
        source_type,
        title: Some(title),
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

impl Citation {
    /// Rebuild a document carrying exactly what this citation shows.
    pub fn into_document(self) -> RetrievedDocument {
        RetrievedDocument {
            id: self.id,
            source_type: self.source_type,
            title: Some(self.title),
            url: self.url,
            extracts: self.snippet.iter().cloned().collect(),
            snippet: self.snippet,
            relevance_score: self.relevance_score,
            metadata: serde_json::Map::new(),
        }
    }
}
