use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::settings::Settings;
use crate::modules::chat::schema::{Message, Role};
use crate::services::llm::{fuse_on_error, ChatProvider, ChunkStream, Completion, LlmError};

const TEMPERATURE: f32 = 0.7;
const MAX_OUTPUT_TOKENS: u32 = 2048;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl GeminiProvider {
    pub fn new(settings: &Settings) -> Self {
        if settings.model_api_key.is_none() {
            tracing::warn!("MODEL_API_KEY is not set; chat requests will fail until it is configured");
        }

        Self {
            client: Client::new(),
            base_url: settings.gemini_base_url.clone(),
            api_key: settings.model_api_key.clone(),
            model: settings.model_name.clone(),
        }
    }

    async fn send(&self, method: &str, query: Option<&str>, messages: &[Message]) -> Result<Response, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;

        let mut url = format!("{}/models/{}:{}", self.base_url, self.model, method);
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }

        tracing::debug!(count = messages.len(), method, "sending messages to Gemini");

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&build_request(messages))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &error_text));
        }

        Ok(response)
    }

    async fn generate(&self, messages: &[Message]) -> Result<Completion, LlmError> {
        let response: GenerateContentResponse =
            self.send("generateContent", None, messages).await?.json().await?;

        if let Some(reason) = response.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_ref()) {
            return Err(LlmError::InvalidResponse(format!("Prompt blocked: {}", reason)));
        }

        let content = response.text();
        if content.is_empty() {
            return Err(LlmError::InvalidResponse("No text in response".to_string()));
        }

        Ok(Completion {
            content,
            model: self.model.clone(),
        })
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[Message]) -> Result<Completion, LlmError> {
        self.generate(messages)
            .await
            .inspect_err(|e| log_failure(e, "completion"))
    }

    async fn stream(&self, messages: &[Message]) -> Result<ChunkStream, LlmError> {
        let response = self
            .send("streamGenerateContent", Some("alt=sse"), messages)
            .await
            .inspect_err(|e| log_failure(e, "stream setup"))?;

        let chunks = response
            .bytes_stream()
            .eventsource()
            .map(|event| match event {
                Ok(event) => parse_stream_event(&event.data),
                Err(e) => Err(LlmError::Stream(e.to_string())),
            })
            .filter_map(|item| async move {
                match item {
                    Ok(Some(text)) => Some(Ok(text)),
                    Ok(None) => None,
                    Err(e) => {
                        log_failure(&e, "stream");
                        Some(Err(e))
                    }
                }
            });

        Ok(fuse_on_error(require_text(chunks.boxed())))
    }
}

fn build_request(messages: &[Message]) -> GenerateContentRequest {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let mut contents: Vec<Content> = messages
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "model",
                Role::System => return None,
            };
            Some(Content {
                role: Some(role),
                parts: vec![Part { text: m.content.clone() }],
            })
        })
        .collect();

    let mut system_instruction = (!system.is_empty()).then(|| Content {
        role: None,
        parts: vec![Part { text: system.join("\n\n") }],
    });

    // Gemini refuses an empty `contents`; a system-only history becomes the user turn.
    if contents.is_empty() {
        if let Some(instruction) = system_instruction.take() {
            contents.push(Content {
                role: Some("user"),
                parts: instruction.parts,
            });
        }
    }

    GenerateContentRequest {
        contents,
        system_instruction,
        generation_config: GenerationConfig {
            temperature: TEMPERATURE,
            max_output_tokens: MAX_OUTPUT_TOKENS,
        },
    }
}

fn classify_error(status: StatusCode, body: &str) -> LlmError {
    let (message, upstream_status) = match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(parsed) => (parsed.error.message, parsed.error.status.unwrap_or_default()),
        Err(_) => (body.to_string(), String::new()),
    };

    let lowered = message.to_lowercase();

    if status == StatusCode::TOO_MANY_REQUESTS
        || upstream_status == "RESOURCE_EXHAUSTED"
        || lowered.contains("quota")
        || lowered.contains("rate limit")
    {
        LlmError::RateLimited(message)
    } else if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || upstream_status == "UNAUTHENTICATED"
        || upstream_status == "PERMISSION_DENIED"
        || lowered.contains("api key")
    {
        LlmError::Unauthorized(message)
    } else {
        LlmError::ApiError(format!("{}: {}", status, message))
    }
}

fn parse_stream_event(data: &str) -> Result<Option<String>, LlmError> {
    if data.trim().is_empty() {
        return Ok(None);
    }

    let event: GenerateContentResponse =
        serde_json::from_str(data).map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

    if let Some(error) = event.error {
        return Err(LlmError::Stream(error.message));
    }

    if let Some(reason) = event.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_ref()) {
        return Err(LlmError::InvalidResponse(format!("Prompt blocked: {}", reason)));
    }

    let text = event.text();
    Ok((!text.is_empty()).then_some(text))
}

/// Appends a terminal error when the upstream closes without producing any
/// text, matching what `generate` reports for the same response.
fn require_text(chunks: ChunkStream) -> ChunkStream {
    stream::unfold((chunks, false, false), |(mut chunks, produced, finished)| async move {
        if finished {
            return None;
        }

        match chunks.next().await {
            Some(item) => {
                let failed = item.is_err();
                Some((item, (chunks, produced || !failed, failed)))
            }
            None if produced => None,
            None => {
                let err = LlmError::InvalidResponse("No text in response".to_string());
                log_failure(&err, "stream");
                Some((Err(err), (chunks, produced, true)))
            }
        }
    })
    .boxed()
}

fn log_failure(err: &LlmError, stage: &str) {
    match err {
        LlmError::RateLimited(_) => tracing::warn!(error = %err, stage, "Gemini rate limit exceeded"),
        _ => tracing::error!(error = %err, stage, "Gemini request failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_roles_and_collects_system_instruction() {
        let request = build_request(&[
            Message::new(Role::System, "Be kind."),
            Message::new(Role::User, "Hi"),
            Message::new(Role::Assistant, "Hello"),
            Message::new(Role::System, "Be brief."),
            Message::new(Role::User, "Bye"),
        ]);

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body["contents"],
            json!([
                {"role": "user", "parts": [{"text": "Hi"}]},
                {"role": "model", "parts": [{"text": "Hello"}]},
                {"role": "user", "parts": [{"text": "Bye"}]},
            ])
        );
        assert_eq!(body["systemInstruction"], json!({"parts": [{"text": "Be kind.\n\nBe brief."}]}));
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn system_only_history_becomes_user_turn() {
        let body = serde_json::to_value(build_request(&[Message::new(Role::System, "Introduce yourself.")])).unwrap();

        assert_eq!(body["contents"], json!([{"role": "user", "parts": [{"text": "Introduce yourself."}]}]));
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn classifies_upstream_failures() {
        let throttled = r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, throttled),
            LlmError::RateLimited(_)
        ));

        let bad_key = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, bad_key),
            LlmError::Unauthorized(_)
        ));

        assert!(matches!(
            classify_error(StatusCode::SERVICE_UNAVAILABLE, "upstream unavailable"),
            LlmError::ApiError(_)
        ));
    }

    #[test]
    fn parses_stream_events() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"Hel"},{"text":"lo"}],"role":"model"}}]}"#;
        assert_eq!(parse_stream_event(data).unwrap().as_deref(), Some("Hello"));

        let finish = r#"{"candidates":[{"content":{"parts":[],"role":"model"},"finishReason":"STOP"}]}"#;
        assert!(parse_stream_event(finish).unwrap().is_none());

        let failure = r#"{"error":{"code":500,"message":"Internal error","status":"INTERNAL"}}"#;
        assert!(matches!(parse_stream_event(failure), Err(LlmError::Stream(_))));

        assert!(matches!(parse_stream_event("not json"), Err(LlmError::InvalidResponse(_))));

        let blocked = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        assert!(matches!(parse_stream_event(blocked), Err(LlmError::InvalidResponse(_))));
    }

    const SSE: &str = "text/event-stream";
    const JSON: &str = "application/json";

    /// Serves one canned response for every path on an ephemeral local port.
    async fn stub_upstream(status: StatusCode, content_type: &'static str, body: &'static str) -> GeminiProvider {
        let app = axum::Router::new().fallback(move || async move {
            (status, [(axum::http::header::CONTENT_TYPE, content_type)], body)
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let settings = Settings::from_lookup(|name| match name {
            "GEMINI_BASE_URL" => Some(base_url.clone()),
            "MODEL_API_KEY" => Some("stub-key".to_string()),
            "MODEL_NAME" => Some("stub-model".to_string()),
            _ => None,
        })
        .unwrap();

        GeminiProvider::new(&settings)
    }

    async fn collect_stream(provider: &GeminiProvider) -> Vec<Result<String, LlmError>> {
        provider
            .stream(&[Message::new(Role::User, "Hello!")])
            .await
            .unwrap()
            .collect()
            .await
    }

    #[tokio::test]
    async fn upstream_throttling_maps_to_rate_limited() {
        let provider = stub_upstream(
            StatusCode::TOO_MANY_REQUESTS,
            JSON,
            r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#,
        )
        .await;

        let messages = [Message::new(Role::User, "Hello!")];
        assert!(matches!(
            provider.complete(&messages).await.err(),
            Some(LlmError::RateLimited(_))
        ));
        assert!(matches!(
            provider.stream(&messages).await.err(),
            Some(LlmError::RateLimited(_))
        ));
    }

    #[tokio::test]
    async fn completion_reads_candidate_text() {
        let provider = stub_upstream(
            StatusCode::OK,
            JSON,
            r#"{"candidates":[{"content":{"parts":[{"text":"Hi "},{"text":"there"}],"role":"model"}}]}"#,
        )
        .await;

        let completion = provider.complete(&[Message::new(Role::User, "Hello!")]).await.unwrap();
        assert_eq!(completion.content, "Hi there");
        assert_eq!(completion.model, "stub-model");
    }

    #[tokio::test]
    async fn sse_events_stream_in_order() {
        let provider = stub_upstream(
            StatusCode::OK,
            SSE,
            concat!(
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Once \"}]}}]}\r\n\r\n",
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"upon \"}]}}]}\r\n\r\n",
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a time\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n",
            ),
        )
        .await;

        let chunks: Vec<String> = collect_stream(&provider)
            .await
            .into_iter()
            .map(|item| item.unwrap())
            .collect();
        assert_eq!(chunks, vec!["Once ", "upon ", "a time"]);
    }

    #[tokio::test]
    async fn blocked_stream_yields_a_single_error() {
        let provider = stub_upstream(
            StatusCode::OK,
            SSE,
            "data: {\"promptFeedback\":{\"blockReason\":\"SAFETY\"}}\r\n\r\n",
        )
        .await;

        let items = collect_stream(&provider).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Err(LlmError::InvalidResponse(reason)) if reason.contains("SAFETY")));
    }

    #[tokio::test]
    async fn textless_stream_ends_with_an_error() {
        let provider = stub_upstream(
            StatusCode::OK,
            SSE,
            "data: {\"candidates\":[{\"content\":{\"parts\":[]},\"finishReason\":\"STOP\"}]}\r\n\r\n",
        )
        .await;

        let items = collect_stream(&provider).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(&items[0], Err(LlmError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn stream_stops_after_in_band_error() {
        let provider = stub_upstream(
            StatusCode::OK,
            SSE,
            concat!(
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"partial\"}]}}]}\r\n\r\n",
                "data: {\"error\":{\"code\":500,\"message\":\"Internal error\",\"status\":\"INTERNAL\"}}\r\n\r\n",
                "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"late\"}]}}]}\r\n\r\n",
            ),
        )
        .await;

        let items = collect_stream(&provider).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().ok(), Some("partial"));
        assert!(matches!(&items[1], Err(LlmError::Stream(_))));
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_network() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        let provider = GeminiProvider::new(&settings);

        let err = provider
            .complete(&[Message::new(Role::User, "Hello!")])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LlmError::MissingApiKey));
    }
}
