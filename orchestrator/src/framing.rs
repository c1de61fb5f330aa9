//! Response framing.
//!
//! Shape conversion only: direct answers become one [`DirectResult`], generation events become
//! [`ResponseFrame`]s, and errors become the matching error shape for each mode.

use crate::agents::generator::GenerationEvent;
use crate::error::OrchestratorError;
use crate::models::{Citation, DirectResult, Facet, Mode, ResponseFrame};
use futures::{Stream, StreamExt};
use std::time::Duration;

pub const NO_ANSWER_FALLBACK: &str = "No suitable answer was found in the knowledge base.";

pub fn frame_direct(
    query: String,
    summary: Option<String>,
    citations: Vec<Citation>,
    facets: Vec<Facet>,
    total_results: u64,
    elapsed: Duration,
) -> DirectResult {
    let summary = summary
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| NO_ANSWER_FALLBACK.to_string());

    DirectResult {
        success: true,
        mode: Mode::Direct,
        query,
        summary: Some(summary),
        citations,
        facets: (!facets.is_empty()).then_some(facets),
        total_results,
        response_time: elapsed.as_secs_f64(),
        error: None,
        code: None,
    }
}

/// Non-success JSON body for a request that failed before or instead of answering.
pub fn frame_direct_error(
    query: String,
    mode: Mode,
    error: &OrchestratorError,
    elapsed: Duration,
) -> DirectResult {
    DirectResult {
        success: false,
        mode,
        query,
        summary: None,
        citations: Vec::new(),
        facets: None,
        total_results: 0,
        response_time: elapsed.as_secs_f64(),
        error: Some(error.to_string()),
        code: Some(error.code().to_string()),
    }
}

pub fn frame_event(event: GenerationEvent) -> ResponseFrame {
    match event {
        GenerationEvent::Delta(chunk) => ResponseFrame {
            chunk,
            done: false,
            citations: None,
            response_time: None,
            error: None,
            code: None,
        },
        GenerationEvent::Completed { citations, elapsed } => ResponseFrame {
            chunk: String::new(),
            done: true,
            citations: Some(citations),
            response_time: Some(elapsed.as_secs_f64()),
            error: None,
            code: None,
        },
        GenerationEvent::Failed(error) => error_frame(&error.into(), None),
    }
}

/// Terminal frame reporting a failure. Text already sent stays sent.
pub fn error_frame(error: &OrchestratorError, elapsed: Option<Duration>) -> ResponseFrame {
    ResponseFrame {
        chunk: String::new(),
        done: true,
        citations: None,
        response_time: elapsed.map(|e| e.as_secs_f64()),
        error: Some(error.to_string()),
        code: Some(error.code().to_string()),
    }
}

pub fn frame_stream<S>(events: S) -> impl Stream<Item = ResponseFrame>
where
    S: Stream<Item = GenerationEvent>,
{
    events.map(frame_event)
}
