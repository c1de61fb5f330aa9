use serde::Serialize;
use thiserror::Error;
use warp::http::StatusCode;
use warp::{reject::Reject, Rejection, Reply};

/// Invalid or out-of-range request input. Raised before any network call.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid configuration for `{field}`: {message}")]
pub struct ConfigurationError {
    pub field: &'static str,
    pub message: String,
}

impl ConfigurationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Credential refresh against the identity provider failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Invalid service account key: {0}")]
    InvalidKey(String),

    #[error("Failed to sign token assertion: {0}")]
    Signing(String),

    #[error("Token exchange failed: {0}")]
    Exchange(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalErrorKind {
    /// Backend answered with a non-success status.
    Upstream,
    /// Transport failed before a response arrived.
    Transport,
    Timeout,
    /// Backend payload could not be parsed into documents.
    MalformedResponse,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Search engine request failed: {message}")]
pub struct RetrievalError {
    pub kind: RetrievalErrorKind,
    pub status: Option<u16>,
    pub retryable: bool,
    pub message: String,
}

impl RetrievalError {
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self {
            kind: RetrievalErrorKind::Upstream,
            status: Some(status),
            retryable: status == 429 || status >= 500,
            message: format!("status {status}: {}", body.into()),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: RetrievalErrorKind::Transport,
            status: None,
            retryable: true,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self {
            kind: RetrievalErrorKind::Timeout,
            status: None,
            retryable: false,
            message: "timed out waiting for the search engine".to_string(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: RetrievalErrorKind::MalformedResponse,
            status: None,
            retryable: false,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("Generative model is not configured")]
    NotConfigured,

    #[error("Generative model request failed: {0}")]
    Request(String),

    #[error("Generative model stream failed: {0}")]
    Stream(String),

    #[error("Generative model stream exceeded {0} seconds")]
    Timeout(u64),

    #[error("Generative model returned no text")]
    Empty,

    #[error("Generative model blocked the answer: {0}")]
    Blocked(String),
}

#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("Invalid feedback: {0}")]
    Invalid(String),

    #[error("Feedback storage failed: {0}")]
    Storage(String),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Everything a search request can fail with.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Authentication(#[from] AuthError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl OrchestratorError {
    /// Machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "invalid_configuration",
            Self::Authentication(_) => "authentication_failed",
            Self::Retrieval(e) if e.kind == RetrievalErrorKind::Timeout => "retrieval_timeout",
            Self::Retrieval(_) => "retrieval_failed",
            Self::Generation(GenerationError::Timeout(_)) => "generation_timeout",
            Self::Generation(_) => "generation_failed",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Configuration(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Retrieval(e) => match (e.kind, e.status) {
                (RetrievalErrorKind::Timeout, _) => StatusCode::GATEWAY_TIMEOUT,
                (_, Some(429)) => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Generation(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retrieval(e) if e.retryable)
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Feedback error: {0}")]
    Feedback(#[from] FeedbackError),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl Reject for ApiError {}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    details: String,
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Rejection> {
    let (code, message, details) = if let Some(api_err) = err.find::<ApiError>() {
        let (code, message) = match api_err {
            ApiError::BadRequest(_) | ApiError::Feedback(FeedbackError::Invalid(_)) => {
                (StatusCode::BAD_REQUEST, "Bad request")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };
        (code, message, api_err.to_string())
    } else if let Some(body_err) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "Bad request", body_err.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Resource not found", String::new())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "Method not allowed",
            String::new(),
        )
    } else {
        return Err(err);
    };

    let json = warp::reply::json(&ErrorBody {
        error: message,
        details,
    });

    Ok(warp::reply::with_status(json, code))
}
