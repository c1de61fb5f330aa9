use crate::api::AppState;
use crate::error::{ApiError, FeedbackError};
use crate::feedback;
use crate::metrics::FEEDBACK_SUBMISSIONS;
use crate::models::{FeedbackRequest, FeedbackResponse};
use tracing::{error, info};
use warp::http::StatusCode;
use warp::{Rejection, Reply};

pub async fn handle_feedback(
    request: FeedbackRequest,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    info!(
        message_id = %request.message_id,
        feedback = request.feedback.file_prefix(),
        "Receiving feedback"
    );

    match feedback::submit(state.feedback.as_ref(), request).await {
        Ok(response) => {
            FEEDBACK_SUBMISSIONS.with_label_values(&["success"]).inc();
            Ok(warp::reply::with_status(
                warp::reply::json(&response),
                StatusCode::OK,
            ))
        }
        Err(FeedbackError::Invalid(reason)) => {
            FEEDBACK_SUBMISSIONS.with_label_values(&["invalid"]).inc();
            Err(warp::reject::custom(ApiError::Feedback(
                FeedbackError::Invalid(reason),
            )))
        }
        Err(e) => {
            error!(error = %e, "Failed to store feedback");
            FEEDBACK_SUBMISSIONS.with_label_values(&["error"]).inc();
            let body = FeedbackResponse {
                success: false,
                message: "Failed to store feedback".to_string(),
                feedback_id: None,
                stored_at: None,
                error: Some(e.to_string()),
                code: Some("feedback_failed".to_string()),
            };
            Ok(warp::reply::with_status(
                warp::reply::json(&body),
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}
