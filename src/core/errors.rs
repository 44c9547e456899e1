use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

/// Failure talking to the key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store backend error: {0}")]
    Backend(String),

    /// A stored value could not be decoded.
    #[error("corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Error kinds surfaced by the core operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing or malformed input; shown to the user.
    #[error("{0}")]
    Validation(String),

    /// Lost a signup race on a username. Safe to retry.
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Deliberately vague so it never reveals whether the username exists.
    #[error("invalid username or password")]
    IncorrectPassword,

    #[error("{0} not found")]
    NotFound(String),

    /// Store unreachable or timed out; the write must be treated as not applied.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        ServiceError::Unavailable(err.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// HTTP-facing error; rendered as an HTML error page.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Service Unavailable: {0}")]
    Unavailable(String),
    #[error("Internal Error: {0}")]
    InternalError(String),
}

impl ApiError {
    /// Text shown to the browser. Internal details stay in the logs.
    pub fn public_message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg) => msg,
            ApiError::Unavailable(_) => "The service is temporarily unavailable, please try again.",
            ApiError::InternalError(_) => "Something went wrong.",
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => ApiError::BadRequest(msg),
            ServiceError::AlreadyExists(what) => {
                ApiError::Conflict(format!("{} was just taken, please try again", what))
            }
            ServiceError::IncorrectPassword => {
                ApiError::Unauthorized(ServiceError::IncorrectPassword.to_string())
            }
            ServiceError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            ServiceError::Unavailable(msg) => ApiError::Unavailable(msg),
            ServiceError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        HttpResponse::build(status)
            .content_type("text/html; charset=utf-8")
            .body(crate::templates::render_error(status, self.public_message()))
    }
}
