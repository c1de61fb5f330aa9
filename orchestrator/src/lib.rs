pub mod agents;
pub mod api;
pub mod citations;
pub mod config;
pub mod credentials;
pub mod error;
pub mod feedback;
pub mod framing;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod translate;

use warp::{Filter, Rejection, Reply};

/// Every route the service exposes, with logging, CORS and rejection handling applied.
pub fn app(
    state: api::AppState,
    allowed_origins: &[String],
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let api_routes = api::routes(state)
        .with(warp::log("api"))
        .with(middleware::cors(allowed_origins));

    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({"status": "healthy"})));

    let metrics = warp::path("metrics")
        .and(warp::get())
        .and_then(render_metrics);

    health
        .or(metrics)
        .or(api_routes)
        .recover(error::handle_rejection)
}

async fn render_metrics() -> Result<impl Reply, Rejection> {
    let (buffer, content_type) = metrics::render().map_err(|e| {
        warp::reject::custom(error::ApiError::InternalError(e.to_string()))
    })?;
    Ok(warp::reply::with_header(buffer, "Content-Type", content_type))
}
