use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use futures::stream::{BoxStream, StreamExt};
use thiserror::Error;

use crate::config::settings::{ProviderKind, Settings};
use crate::modules::chat::schema::Message;
use crate::services::echo::EchoProvider;
use crate::services::gemini::GeminiProvider;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Missing API key")]
    MissingApiKey,
    #[error("Authentication rejected: {0}")]
    Unauthorized(String),
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Stream interrupted: {0}")]
    Stream(String),
}

pub struct Completion {
    pub content: String,
    pub model: String,
}

/// Fragments in upstream order. Ends after the first `Err`.
pub type ChunkStream = BoxStream<'static, Result<String, LlmError>>;

#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn model(&self) -> &str;

    async fn complete(&self, messages: &[Message]) -> Result<Completion, LlmError>;

    /// Resolves once the upstream has accepted the request, so failures up to
    /// that point surface here rather than inside the stream.
    async fn stream(&self, messages: &[Message]) -> Result<ChunkStream, LlmError>;
}

/// Cuts a stream off right after its first error.
pub fn fuse_on_error(stream: ChunkStream) -> ChunkStream {
    let mut failed = false;
    stream
        .take_while(move |item| {
            let keep = !failed;
            failed |= item.is_err();
            future::ready(keep)
        })
        .boxed()
}

pub fn build_provider(settings: &Settings) -> Arc<dyn ChatProvider> {
    let provider: Arc<dyn ChatProvider> = match settings.model_provider {
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(settings)),
        ProviderKind::Echo => Arc::new(EchoProvider::new(settings.model_name.clone())),
    };

    tracing::info!(
        provider = provider.name(),
        model = provider.model(),
        "AI provider ready"
    );

    provider
}
