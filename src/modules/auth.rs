use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::ApiError;
use crate::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Proof that the request carried a configured `X-API-Key`. Handlers that take
/// this extractor reject the request before the body is read.
#[derive(Debug, Clone, Copy)]
pub struct ApiKey;

impl FromRequestParts<AppState> for ApiKey {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path().to_string();

        let value = match parts.headers.get(API_KEY_HEADER) {
            Some(value) if !value.is_empty() => value,
            _ => {
                tracing::warn!(%path, "missing API key");
                return Err(ApiError::Unauthenticated(
                    "API key required. Please provide X-API-Key header.".to_string(),
                ));
            }
        };

        match value.to_str() {
            Ok(key) if state.settings.is_valid_api_key(key) => {
                tracing::debug!(%path, "API key accepted");
                Ok(ApiKey)
            }
            _ => {
                tracing::warn!(%path, "invalid API key");
                Err(ApiError::Forbidden("Invalid API key provided.".to_string()))
            }
        }
    }
}
