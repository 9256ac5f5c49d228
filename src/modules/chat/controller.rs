use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::{
        header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
        HeaderName,
    },
    response::{IntoResponse, Response},
    Json,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ApiError;
use crate::modules::auth::ApiKey;
use crate::modules::chat::{
    schema::{ChatRequest, ChatResponse},
    stream::{forward_chunks, FRAME_BUFFER},
    validation::validate_chat_request,
};
use crate::AppState;

pub async fn chat(
    State(state): State<AppState>,
    _key: ApiKey,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let request = validate_chat_request(payload)?;

    tracing::info!(
        messages = request.messages.len(),
        provider = state.provider.name(),
        "chat request"
    );

    let completion = state.provider.complete(&request.messages).await?;

    Ok(Json(ChatResponse {
        content: completion.content,
        model: completion.model,
    }))
}

pub async fn chat_stream(
    State(state): State<AppState>,
    _key: ApiKey,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = validate_chat_request(payload)?;

    tracing::info!(
        messages = request.messages.len(),
        provider = state.provider.name(),
        "streaming chat request"
    );

    // Anything failing here still gets a proper status code.
    let chunks = state.provider.stream(&request.messages).await?;

    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    tokio::spawn(forward_chunks(chunks, tx));

    let headers = [
        (CONTENT_TYPE, "text/plain"),
        (CACHE_CONTROL, "no-cache"),
        (CONNECTION, "keep-alive"),
        (HeaderName::from_static("x-accel-buffering"), "no"),
    ];

    Ok((headers, Body::from_stream(ReceiverStream::new(rx))).into_response())
}
