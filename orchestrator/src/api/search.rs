use crate::agents::retriever::{RetrievalOutcome, SearchClient};
use crate::api::AppState;
use crate::citations::normalize;
use crate::error::OrchestratorError;
use crate::framing::{error_frame, frame_direct, frame_direct_error, frame_stream};
use crate::metrics::{SEARCH_DURATION, SEARCH_REQUESTS};
use crate::models::{Mode, ResponseFrame};
use crate::translate::{decode_request, translate, GenerationParams, ModePlan, QueryPlan};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;
use warp::reply::Response;
use warp::{Rejection, Reply};

const RETRY_BACKOFF: Duration = Duration::from_millis(250);

type FrameStream = Pin<Box<dyn Stream<Item = ResponseFrame> + Send>>;

pub async fn handle_search(body: Value, state: AppState) -> Result<Response, Rejection> {
    let request_id = Uuid::new_v4();
    let mode = requested_mode(&body);
    let span = info_span!("search", %request_id, mode = mode.as_str());
    Ok(search(body, mode, state).instrument(span).await)
}

/// The mode to answer in, even when the rest of the body is invalid.
fn requested_mode(body: &Value) -> Mode {
    body.get("mode")
        .and_then(|mode| serde_json::from_value(mode.clone()).ok())
        .unwrap_or_default()
}

async fn search(body: Value, mode: Mode, state: AppState) -> Response {
    let started = Instant::now();
    let query = body
        .get("query")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    info!(query_chars = query.chars().count(), "Processing search");

    let plan = match decode_request(&body).and_then(translate) {
        Ok(plan) => plan,
        Err(e) => {
            warn!(field = e.field, error = %e, "Rejected search configuration");
            record(mode, "invalid", started);
            return json_error(query, mode, &e.into(), started);
        }
    };

    let outcome = retrieve_with_retry(&state.search, &plan).await;
    let QueryPlan {
        query,
        language_code,
        mode,
        ..
    } = plan;

    match mode {
        ModePlan::Direct { .. } => direct(query, outcome, started),
        ModePlan::Streaming { generation } => {
            streaming(&state, query, language_code, generation, outcome, started)
        }
    }
}

/// One retry for failures the search engine marks as transient.
async fn retrieve_with_retry(
    client: &SearchClient,
    plan: &QueryPlan,
) -> Result<RetrievalOutcome, OrchestratorError> {
    match client.retrieve(&plan.retrieval, plan.summary_request()).await {
        Err(e) if e.is_retryable() => {
            warn!(error = %e, "Search failed, retrying once");
            tokio::time::sleep(RETRY_BACKOFF).await;
            client.retrieve(&plan.retrieval, plan.summary_request()).await
        }
        other => other,
    }
}

fn direct(
    query: String,
    outcome: Result<RetrievalOutcome, OrchestratorError>,
    started: Instant,
) -> Response {
    match outcome {
        Ok(outcome) => {
            let citations = if outcome.references.is_empty() {
                normalize(&outcome.documents)
            } else {
                normalize(&outcome.references)
            };
            let result = frame_direct(
                query,
                outcome.summary,
                citations,
                outcome.facets,
                outcome.total_results,
                started.elapsed(),
            );
            info!(
                citations = result.citations.len(),
                total_results = result.total_results,
                "Direct search complete"
            );
            record(Mode::Direct, "success", started);
            warp::reply::json(&result).into_response()
        }
        Err(e) => {
            error!(code = e.code(), error = %e, "Direct search failed");
            record(Mode::Direct, "error", started);
            json_error(query, Mode::Direct, &e, started)
        }
    }
}

fn streaming(
    state: &AppState,
    query: String,
    language_code: String,
    generation: GenerationParams,
    outcome: Result<RetrievalOutcome, OrchestratorError>,
    started: Instant,
) -> Response {
    let frames: FrameStream = match outcome {
        Ok(outcome) => {
            info!(documents = outcome.documents.len(), "Context retrieved, generating");
            let events = state.generator.stream_answer(
                query,
                language_code,
                outcome.documents,
                generation,
                started,
            );
            Box::pin(frame_stream(events))
        }
        Err(e) => {
            error!(code = e.code(), error = %e, "Streaming search failed before generation");
            let frame = error_frame(&e, Some(started.elapsed()));
            Box::pin(futures::stream::iter([frame]))
        }
    };

    let events = frames.map(move |frame| {
        if frame.done {
            let outcome = if frame.error.is_some() { "error" } else { "success" };
            record(Mode::Streaming, outcome, started);
        }
        warp::sse::Event::default().json_data(&frame)
    });

    let reply = warp::sse::reply(warp::sse::keep_alive().stream(events));
    warp::reply::with_header(reply, "X-Accel-Buffering", "no").into_response()
}

fn json_error(query: String, mode: Mode, error: &OrchestratorError, started: Instant) -> Response {
    let body = frame_direct_error(query, mode, error, started.elapsed());
    warp::reply::with_status(warp::reply::json(&body), error.status_code()).into_response()
}

fn record(mode: Mode, outcome: &str, started: Instant) {
    SEARCH_REQUESTS
        .with_label_values(&[mode.as_str(), outcome])
        .inc();
    SEARCH_DURATION
        .with_label_values(&[mode.as_str()])
        .observe(started.elapsed().as_secs_f64());
}
