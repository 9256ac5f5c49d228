use axum::Json;
use chrono::Utc;

use crate::modules::health::schema::{HealthResponse, RootResponse};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "AI Chatbot API".to_string(),
        version: VERSION.to_string(),
        status: "running".to_string(),
    })
}

pub async fn health() -> Json<HealthResponse> {
    tracing::debug!("health check");

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: VERSION.to_string(),
    })
}
