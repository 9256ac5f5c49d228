use std::io::Write;
use std::time::Instant;

use futures::StreamExt;
use serde_json::json;

/// Streams one prompt through a running server and reports time to first chunk.
///
/// Usage: `cargo run --bin chat_client -- "your prompt"`
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let base_url = std::env::var("CHATBOT_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
    let api_key = std::env::var("API_KEY").unwrap_or_else(|_| "test-api-key".to_string());
    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Say hello in one sentence.".to_string());

    println!("\nPrompt: \"{}\"\n", prompt);

    let start = Instant::now();

    let response = reqwest::Client::new()
        .post(format!("{}/api/v1/chat/stream", base_url))
        .header("X-API-Key", api_key)
        .json(&json!({ "messages": [{ "role": "user", "content": prompt }] }))
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let error = response.text().await.unwrap_or_default();
        anyhow::bail!("request failed with {}: {}", status, error);
    }

    let mut first_chunk_ms = None;
    let mut buffer: Vec<u8> = Vec::new();
    let mut body = response.bytes_stream();
    let mut stdout = std::io::stdout();

    while let Some(bytes) = body.next().await {
        buffer.extend_from_slice(&bytes?);

        while let Some(frame) = take_frame(&mut buffer) {
            first_chunk_ms.get_or_insert_with(|| start.elapsed().as_millis());

            let payload = frame
                .lines()
                .filter_map(|line| line.strip_prefix("data: "))
                .collect::<Vec<_>>()
                .join("\n");

            if frame.starts_with("event: error") {
                println!("\n\nstream error: {}", payload);
            } else {
                print!("{}", payload);
                stdout.flush()?;
            }
        }
    }

    println!("\n\n{:-<60}", "");
    if let Some(ms) = first_chunk_ms {
        println!("First chunk: {}ms", ms);
    }
    println!("Total: {}ms", start.elapsed().as_millis());

    Ok(())
}

/// Removes the first complete frame from `buffer`. Frames are decoded only once
/// whole, since a multi-byte character may straddle two network reads.
fn take_frame(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.windows(2).position(|w| w == b"\n\n")?;
    let raw: Vec<u8> = buffer.drain(..end + 2).collect();
    Some(String::from_utf8_lossy(&raw).into_owned())
}
