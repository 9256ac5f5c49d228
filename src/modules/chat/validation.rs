use axum::{extract::rejection::JsonRejection, Json};
use validator::{Validate, ValidationErrors};

use crate::error::ApiError;
use crate::modules::chat::schema::{ChatRequest, MAX_HISTORY_LENGTH, MAX_MESSAGE_LENGTH};

/// Turns the raw body extraction into a well-formed request, reporting only the
/// first problem found: the body shape, then the history length, then each
/// message in conversation order.
pub fn validate_chat_request(
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<ChatRequest, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))?;

    if let Err(errors) = request.validate() {
        return Err(ApiError::InvalidRequest(format!(
            "messages: {}, expected 1 to {} (got {})",
            first_message(&errors, "messages"),
            MAX_HISTORY_LENGTH,
            request.messages.len()
        )));
    }

    for (index, message) in request.messages.iter().enumerate() {
        if let Err(errors) = message.validate() {
            return Err(ApiError::InvalidRequest(format!(
                "messages[{}].content: {}, expected 1 to {} characters (got {})",
                index,
                first_message(&errors, "content"),
                MAX_MESSAGE_LENGTH,
                message.content.chars().count()
            )));
        }
    }

    Ok(request)
}

fn first_message(errors: &ValidationErrors, field: &str) -> String {
    errors
        .field_errors()
        .get(field)
        .and_then(|field_errors| field_errors.first())
        .and_then(|e| e.message.as_ref())
        .map(|m| m.to_string())
        .unwrap_or_else(|| errors.to_string())
}
