//! Text-to-vector providers for semantic scoring

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Embedder trait: one string in, one vector out
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Embedder for OpenAI-compatible `/embeddings` endpoints
pub struct HttpEmbedder {
    client: Client,
    config: ProviderConfig,
}

impl HttpEmbedder {
    /// Create a new embedder; fails without credentials
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if !config.is_configured() {
            return Err(ProviderError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ProviderError::Initialization(e.to_string()))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: text,
        };

        let mut last_error = None;
        for attempt in 0..self.config.max_retries.max(1) {
            if attempt > 0 {
                debug!("Retry attempt {} for embedding", attempt);
                tokio::time::sleep(Duration::from_millis(100 * (1 << attempt))).await;
            }

            let mut req = self.client.post(&self.config.endpoint).json(&request);
            if let Some(ref api_key) = self.config.api_key {
                req = req.bearer_auth(api_key.expose_secret());
            }

            match req.send().await {
                Ok(response) => {
                    if !response.status().is_success() {
                        let status = response.status();
                        let body = response.text().await.unwrap_or_default();
                        last_error = Some(ProviderError::Api(format!("HTTP {}: {}", status, body)));
                        continue;
                    }

                    match response.json::<EmbeddingResponse>().await {
                        Ok(resp) => {
                            return resp
                                .data
                                .into_iter()
                                .next()
                                .map(|d| d.embedding)
                                .filter(|v| !v.is_empty())
                                .ok_or_else(|| {
                                    ProviderError::InvalidResponse("No embedding in response".to_string())
                                });
                        }
                        Err(e) => {
                            last_error = Some(ProviderError::InvalidResponse(e.to_string()));
                        }
                    }
                }
                Err(e) => {
                    last_error = Some(ProviderError::Network(e.to_string()));
                }
            }
        }

        warn!("Embedding failed after {} attempts", self.config.max_retries.max(1));
        Err(last_error.unwrap_or(ProviderError::Api("no attempts made".to_string())))
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
