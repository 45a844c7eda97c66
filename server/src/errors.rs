use aide::OperationOutput;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use phonebook_models::{ErrorDetail, RateLimitError};

use crate::{contacts::DirectoryError, rate_limit::RateLimitExceeded};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Invalid authentication credentials")]
    InvalidCredentialsFormat,
    #[error("Could not validate credentials")]
    Forbidden,
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Rate limit exceeded: {}", .0.limit)]
    RateLimited(RateLimitExceeded),
    #[error("Database error: {0}")]
    Database(#[from] DirectoryError),
}

impl From<RateLimitExceeded> for AppError {
    fn from(exceeded: RateLimitExceeded) -> Self {
        AppError::RateLimited(exceeded)
    }
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorDetail {
        detail: message.into(),
    };
    (status, Json(body)).into_response()
}

fn basic_challenge(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic"));
    response
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotAuthenticated | AppError::InvalidCredentialsFormat => {
                basic_challenge(detail(StatusCode::UNAUTHORIZED, self.to_string()))
            }
            AppError::Forbidden => {
                tracing::warn!("Invalid API Key or Password");
                detail(StatusCode::FORBIDDEN, self.to_string())
            }
            AppError::BadRequest(msg) => detail(StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => detail(StatusCode::NOT_FOUND, msg),
            AppError::RateLimited(ref exceeded) => {
                let retry_after = exceeded.retry_after.as_secs_f64().ceil() as u64;
                let body = RateLimitError {
                    error: self.to_string(),
                };
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, retry_after.to_string())],
                    Json(body),
                )
                    .into_response()
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {err}");
                detail(StatusCode::INTERNAL_SERVER_ERROR, "Database error occurred.")
            }
        }
    }
}

impl OperationOutput for AppError {
    type Inner = ErrorDetail;
}
