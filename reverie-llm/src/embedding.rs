//! Remote embedding provider.
//!
//! Implements `reverie-core`'s [`EmbeddingProvider`] against the
//! `embedContent` endpoint.  The declared task type carries the
//! query/document asymmetry: `RETRIEVAL_QUERY` for search text,
//! `RETRIEVAL_DOCUMENT` for stored content.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tracing::warn;

use reverie_core::embedding::{EmbedIntent, EmbeddingProvider};
use reverie_core::error::{MemoryError, Result};
use reverie_core::types::Embedding;

use crate::error::LlmError;

/// HTTP embedding provider for the generative-language API.
#[derive(Debug)]
pub struct RemoteEmbeddingProvider {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
    dims: usize,
    timeout_ms: u64,
}

impl RemoteEmbeddingProvider {
    /// Create a new provider.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] if the API key is empty.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        dimensions: usize,
        timeout_ms: u64,
    ) -> std::result::Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LlmError::Config(
                "no API key configured for the embedding service".into(),
            ));
        }
        Ok(Self {
            http: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            dims: dimensions,
            timeout_ms,
        })
    }

    fn task_type(intent: EmbedIntent) -> &'static str {
        match intent {
            EmbedIntent::Query => "RETRIEVAL_QUERY",
            EmbedIntent::Document => "RETRIEVAL_DOCUMENT",
        }
    }
}

impl EmbeddingProvider for RemoteEmbeddingProvider {
    async fn embed(&self, text: &str, intent: EmbedIntent) -> Result<Embedding> {
        let url = format!("{}/models/{}:embedContent", self.base_url, self.model);
        let body = json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
            "taskType": Self::task_type(intent),
        });

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .timeout(Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let detail = resp.text().await.unwrap_or_default();
            warn!(%status, "Embedding service returned an error");
            return Err(MemoryError::Embedding(format!("HTTP {status}: {detail}")));
        }

        let payload: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;
        extract_values(&payload)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Pull the vector out of either response shape the service uses:
/// a single `embedding.values` object or a batch `embeddings[0].values`.
fn extract_values(payload: &serde_json::Value) -> Result<Embedding> {
    let values = payload["embedding"]["values"]
        .as_array()
        .or_else(|| payload["embeddings"][0]["values"].as_array())
        .ok_or_else(|| {
            MemoryError::Embedding("no embedding returned by the service".to_string())
        })?;

    let mut vector = Vec::with_capacity(values.len());
    for value in values {
        let number = value.as_f64().ok_or_else(|| {
            MemoryError::Embedding("non-numeric value in embedding vector".to_string())
        })?;
        vector.push(number as f32);
    }
    Ok(Embedding(vector))
}
