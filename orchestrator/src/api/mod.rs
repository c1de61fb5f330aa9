use crate::agents::generator::GenerationOrchestrator;
use crate::agents::retriever::SearchClient;
use crate::feedback::FeedbackStore;
use std::sync::Arc;
use warp::{Filter, Rejection, Reply};

pub mod feedback;
pub mod search;

/// Largest accepted JSON body.
const MAX_BODY_BYTES: u64 = 256 * 1024;

/// Shared collaborators handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<SearchClient>,
    pub generator: GenerationOrchestrator,
    pub feedback: Arc<dyn FeedbackStore>,
}

pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let api = warp::path("api").and(warp::path("v1"));

    let search_route = api
        .and(warp::path("search"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(search::handle_search);

    let feedback_route = api
        .and(warp::path("feedback"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(feedback::handle_feedback);

    search_route.or(feedback_route)
}

fn with_state(
    state: AppState,
) -> impl Filter<Extract = (AppState,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || state.clone())
}
