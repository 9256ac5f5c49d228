use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::modules::chat::schema::{Message, Role};
use crate::services::llm::{ChatProvider, ChunkStream, Completion, LlmError};

const GREETING: &str = "Hello! How can I help you today?";

/// Deterministic provider for local runs and tests. Selected with
/// `MODEL_PROVIDER=echo`; never performs network I/O.
#[derive(Clone)]
pub struct EchoProvider {
    model: String,
}

impl EchoProvider {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into() }
    }

    pub fn reply(messages: &[Message]) -> String {
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| format!("Echo: {}", m.content))
            .unwrap_or_else(|| GREETING.to_string())
    }
}

#[async_trait]
impl ChatProvider for EchoProvider {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<Completion, LlmError> {
        tracing::debug!(count = messages.len(), "echo completion");
        Ok(Completion {
            content: Self::reply(messages),
            model: self.model.clone(),
        })
    }

    async fn stream(&self, messages: &[Message]) -> Result<ChunkStream, LlmError> {
        let chunks: Vec<Result<String, LlmError>> = Self::reply(messages)
            .split_inclusive(' ')
            .map(|piece| Ok(piece.to_string()))
            .collect();

        Ok(stream::iter(chunks).boxed())
    }
}
