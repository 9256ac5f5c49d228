use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::settings::Settings;
use crate::services::llm::ChatProvider;

pub mod config;
pub mod error;
pub mod modules;
pub mod services;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub provider: Arc<dyn ChatProvider>,
}

impl AppState {
    pub fn new(settings: Settings, provider: Arc<dyn ChatProvider>) -> Self {
        Self {
            settings: Arc::new(settings),
            provider,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings);

    Router::new()
        .merge(modules::health::routes::routes())
        .merge(modules::chat::routes::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let cors = if settings.allows_any_origin() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = settings
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([
                header::CONTENT_TYPE,
                HeaderName::from_static(modules::auth::API_KEY_HEADER),
            ])
    };

    cors.max_age(Duration::from_secs(3600))
}
