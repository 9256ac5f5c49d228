use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::modules::chat::schema::ErrorResponse;
use crate::services::llm::LlmError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    ProviderMisconfigured(String),
    #[error("{0}")]
    Provider(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::ProviderMisconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorResponse { detail: self.to_string() })).into_response()
    }
}

/// Provider failures are logged in full by the adapter; clients only see these.
impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited(_) => {
                ApiError::RateLimited("AI provider rate limit exceeded. Please try again later.".to_string())
            }
            LlmError::MissingApiKey | LlmError::Unauthorized(_) => ApiError::ProviderMisconfigured(
                "AI provider is not configured correctly.".to_string(),
            ),
            LlmError::RequestError(_)
            | LlmError::ApiError(_)
            | LlmError::InvalidResponse(_)
            | LlmError::Stream(_) => {
                ApiError::Provider("AI provider failed to generate a response.".to_string())
            }
        }
    }
}
