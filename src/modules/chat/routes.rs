use axum::{routing::post, Router};

use crate::modules::chat::controller;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/chat", post(controller::chat))
        .route("/api/v1/chat/stream", post(controller::chat_stream))
}
