use crate::api::schemas::contact::ContactResponse;
use crate::services::transport::TransportError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

pub const VALIDATION_FAILED: &str = "Please correct the following errors:";
pub const RATE_LIMITED: &str = "Please wait before sending another message";
pub const SEND_FAILED: &str = "Failed to send message. Please try again later.";
pub const METHOD_NOT_ALLOWED: &str = "Method not allowed";
pub const REQUEST_TIMED_OUT: &str = "Request timed out. Please try again.";
pub const INTERNAL_ERROR: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Rate limit store error: {0}")]
    Store(#[source] anyhow::Error),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Request timed out")]
    RequestTimeout,
    #[error("Internal server error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => {
                tracing::debug!(errors = ?errors, "Submission rejected");
                (StatusCode::BAD_REQUEST, Json(ContactResponse::failure(VALIDATION_FAILED, Some(errors))))
                    .into_response()
            }
            Self::RateLimited { retry_after_secs } => {
                tracing::debug!(retry_after_secs, "Submission throttled");
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(ContactResponse::failure(RATE_LIMITED, Some(vec![RATE_LIMITED.to_string()]))),
                )
                    .into_response();
                response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            Self::Transport(e) => {
                tracing::error!(error = %e, "Mail transport failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ContactResponse::failure(SEND_FAILED, None))).into_response()
            }
            Self::Store(e) => {
                tracing::error!(error = ?e, "Rate limit store failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ContactResponse::failure(SEND_FAILED, None))).into_response()
            }
            Self::BadRequest(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, Json(ContactResponse::failure("Invalid request body", Some(vec![msg]))))
                    .into_response()
            }
            Self::MethodNotAllowed => {
                (StatusCode::METHOD_NOT_ALLOWED, Json(ContactResponse::failure(METHOD_NOT_ALLOWED, None)))
                    .into_response()
            }
            Self::RequestTimeout => {
                tracing::warn!("Request exceeded the server timeout");
                (StatusCode::REQUEST_TIMEOUT, Json(ContactResponse::failure(REQUEST_TIMED_OUT, None))).into_response()
            }
            Self::Internal => {
                tracing::error!("Internal server error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ContactResponse::failure(INTERNAL_ERROR, None)))
                    .into_response()
            }
        }
    }
}
