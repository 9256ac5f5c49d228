use std::convert::Infallible;

use futures::StreamExt;
use tokio::sync::mpsc::Sender;

use crate::error::ApiError;
use crate::services::llm::ChunkStream;

/// Bounded: the forwarder never reads more than `FRAME_BUFFER` frames ahead of the client.
pub type FrameSender = Sender<Result<String, Infallible>>;

pub const FRAME_BUFFER: usize = 1;

/// One `data:` line per line of the chunk, then the blank separator line.
pub fn data_frame(chunk: &str) -> String {
    let mut frame = String::with_capacity(chunk.len() + 8);
    for line in chunk.split('\n') {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }
    frame.push('\n');
    frame
}

pub fn error_frame(message: &str) -> String {
    format!("event: error\ndata: {}\n\n", message.replace('\n', " "))
}

/// Pumps provider chunks into the response body channel until the provider
/// finishes, fails, or the client goes away. Dropping `chunks` on return
/// releases the upstream connection.
pub async fn forward_chunks(mut chunks: ChunkStream, tx: FrameSender) {
    let mut sent = 0usize;

    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                tracing::info!(chunks = sent, "client disconnected, abandoning stream");
                return;
            }
            next = chunks.next() => next,
        };

        match next {
            Some(Ok(chunk)) if chunk.is_empty() => continue,
            Some(Ok(chunk)) => {
                if tx.send(Ok(data_frame(&chunk))).await.is_err() {
                    tracing::info!(chunks = sent, "client disconnected, abandoning stream");
                    return;
                }
                sent += 1;
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, chunks = sent, "stream failed after it started");
                let _ = tx.send(Ok(error_frame(&ApiError::from(e).to_string()))).await;
                return;
            }
            None => {
                tracing::debug!(chunks = sent, "stream complete");
                return;
            }
        }
    }
}
