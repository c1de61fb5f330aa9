// Process-wide prometheus metrics, registered on the default registry

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};

pub static SEARCH_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "search_requests_total",
        "Search requests by mode and outcome",
        &["mode", "outcome"]
    )
    .expect("search_requests_total registers once")
});

pub static SEARCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "search_duration_seconds",
        "Time to the final response or frame",
        &["mode"]
    )
    .expect("search_duration_seconds registers once")
});

pub static CREDENTIAL_REFRESHES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "credential_refreshes_total",
        "Calls made to the identity provider"
    )
    .expect("credential_refreshes_total registers once")
});

pub static FEEDBACK_SUBMISSIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feedback_submissions_total",
        "Feedback submissions by outcome",
        &["outcome"]
    )
    .expect("feedback_submissions_total registers once")
});

/// Force registration so every series shows up on the first scrape.
pub fn init() {
    Lazy::force(&SEARCH_REQUESTS);
    Lazy::force(&SEARCH_DURATION);
    Lazy::force(&CREDENTIAL_REFRESHES);
    Lazy::force(&FEEDBACK_SUBMISSIONS);
}

/// Default registry in the text exposition format.
pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}
