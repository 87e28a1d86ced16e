//! Streaming chat-completions client (OpenAI-compatible SSE)

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::{AnswerStreamer, FragmentStream};

/// Client for an OpenAI-compatible chat completions endpoint with SSE
/// streaming (Groq by default)
pub struct GroqClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: LlmConfig,
    /// Resolved API key
    api_key: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

impl GroqClient {
    /// Create a new client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl AnswerStreamer for GroqClient {
    async fn stream_answer(&self, prompt: &str) -> Result<FragmentStream> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let request = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "stream": true,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::generation(format!("Stream request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::generation(format!(
                "Generation failed: HTTP {} - {}",
                status, body
            )));
        }

        // SSE events can split across network chunks, so completed lines are
        // drained out of a carry-over buffer; whatever is left when the
        // connection closes is parsed as a final unterminated line.
        let buffer = Arc::new(Mutex::new(String::new()));
        let tail = Arc::clone(&buffer);
        let stream = response
            .bytes_stream()
            .map(move |chunk| {
                let bytes =
                    chunk.map_err(|e| Error::generation(format!("Stream error: {}", e)))?;
                let mut buffer = buffer.lock();
                buffer.push_str(&String::from_utf8_lossy(&bytes));
                Ok(drain_fragments(&mut buffer))
            })
            .chain(futures_util::stream::once(async move {
                Ok(flush_residual(&mut tail.lock()))
            }))
            .filter(|item: &Result<String>| {
                // Empty fragments carry no information and are never yielded
                futures_util::future::ready(!matches!(item, Ok(s) if s.is_empty()))
            });

        Ok(stream.boxed())
    }

    fn name(&self) -> &str {
        "groq"
    }
}

/// Drain complete SSE lines from the buffer and concatenate their content
/// deltas; an incomplete trailing line stays in the buffer for the next call
fn drain_fragments(buffer: &mut String) -> String {
    let mut output = String::new();

    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        let line = line.trim();

        let data = match line.strip_prefix("data:") {
            Some(data) => data.trim(),
            None => continue,
        };
        if data == "[DONE]" {
            continue;
        }

        if let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) {
            if let Some(content) = chunk
                .choices
                .first()
                .and_then(|choice| choice.delta.content.as_deref())
            {
                output.push_str(content);
            }
        }
    }

    output
}

/// Parse whatever remains in the buffer as one final unterminated line
fn flush_residual(buffer: &mut String) -> String {
    if buffer.is_empty() {
        return String::new();
    }
    buffer.push('\n');
    drain_fragments(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{}\"}}}}]}}\n\n",
            content
        )
    }

    #[test]
    fn drains_complete_events() {
        let mut buffer = format!("{}{}", event("Hello"), event(" world"));
        assert_eq!(drain_fragments(&mut buffer), "Hello world");
        assert!(buffer.is_empty());
    }

    #[test]
    fn keeps_incomplete_trailing_line() {
        let mut buffer = format!("{}data: {{\"choi", event("first"));
        assert_eq!(drain_fragments(&mut buffer), "first");
        assert_eq!(buffer, "data: {\"choi");

        buffer.push_str("ces\":[{\"delta\":{\"content\":\"second\"}}]}\n");
        assert_eq!(drain_fragments(&mut buffer), "second");
    }

    #[test]
    fn done_marker_and_missing_content_yield_nothing() {
        let mut buffer = String::from(
            "data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{}}]}\n\n: comment\n",
        );
        assert_eq!(drain_fragments(&mut buffer), "");
    }

    #[test]
    fn concatenation_preserves_exact_output() {
        let mut buffer = format!("{}{}{}", event("a"), event(""), event("b c"));
        assert_eq!(drain_fragments(&mut buffer), "ab c");
    }

    #[test]
    fn unterminated_final_line_is_flushed_at_stream_end() {
        let mut buffer =
            String::from("data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}");
        assert_eq!(drain_fragments(&mut buffer), "");
        assert_eq!(flush_residual(&mut buffer), "tail");
        assert!(buffer.is_empty());
    }

    #[test]
    fn empty_residual_flushes_to_nothing() {
        let mut buffer = String::new();
        assert_eq!(flush_residual(&mut buffer), "");
    }
}
