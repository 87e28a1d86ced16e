//! Hugging Face inference API embedding client

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

use super::EmbeddingProvider;

/// Embedding client for the Hugging Face feature-extraction endpoint
pub struct HfEmbedder {
    /// HTTP client
    client: Client,
    /// Configuration
    config: EmbeddingConfig,
    /// Resolved API key
    api_key: String,
}

impl HfEmbedder {
    /// Create a new embedder
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
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

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}/pipeline/feature-extraction",
            self.config.base_url, self.config.model
        )
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.config.max_retries {
                        let delay = Duration::from_secs(2u64.pow(attempt));
                        tracing::warn!(
                            "Embedding request failed (attempt {}/{}), retrying in {:?}",
                            attempt + 1,
                            self.config.max_retries + 1,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::embedding("Unknown error")))
    }

    async fn post_inputs(&self, inputs: Value) -> Result<Value> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&json!({ "inputs": inputs }))
            .send()
            .await
            .map_err(|e| Error::embedding(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::embedding(format!(
                "Embedding failed: HTTP {} - {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::embedding(format!("Failed to parse embedding response: {}", e)))
    }
}

#[async_trait]
impl EmbeddingProvider for HfEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let text = text.to_string();

        self.retry_request(|| {
            let text = text.clone();
            async move {
                let value = self.post_inputs(json!(text)).await?;
                parse_single_embedding(&value)
            }
        })
        .await
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let texts = texts.to_vec();

        self.retry_request(|| {
            let texts = texts.clone();
            async move {
                let value = self.post_inputs(json!(texts)).await?;
                parse_batch_embeddings(&value, texts.len())
            }
        })
        .await
    }

    fn name(&self) -> &str {
        "huggingface"
    }
}

/// Parse a single-input response
///
/// The endpoint returns a flat vector for a single string input; some model
/// deployments wrap it in an outer array, in which case the first row wins.
fn parse_single_embedding(value: &Value) -> Result<Vec<f32>> {
    if let Some(vector) = as_f32_vector(value) {
        return Ok(vector);
    }

    if let Some(rows) = value.as_array() {
        if let Some(first) = rows.first() {
            if let Some(vector) = as_f32_vector(first) {
                return Ok(vector);
            }
        }
    }

    Err(Error::embedding("Unexpected embedding response shape"))
}

/// Parse a batch response; each output position maps to the input at the
/// same position, zero-length rows become `None`
fn parse_batch_embeddings(value: &Value, expected: usize) -> Result<Vec<Option<Vec<f32>>>> {
    let rows = match value.as_array() {
        Some(rows) => rows,
        None => return Err(Error::embedding("Unexpected batch embedding response shape")),
    };

    if rows.len() != expected {
        return Err(Error::embedding(format!(
            "Batch embedding response has {} rows, expected {}",
            rows.len(),
            expected
        )));
    }

    Ok(rows
        .iter()
        .map(|row| as_f32_vector(row).filter(|v| !v.is_empty()))
        .collect())
}

/// Interpret a JSON value as a vector of floats, if it is one
fn as_f32_vector(value: &Value) -> Option<Vec<f32>> {
    let items = value.as_array()?;
    let mut vector = Vec::with_capacity(items.len());
    for item in items {
        vector.push(item.as_f64()? as f32);
    }
    Some(vector)
}
