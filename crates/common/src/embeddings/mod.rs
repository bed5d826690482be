//! Embedding provider abstraction
//!
//! The semantic signal needs a fixed-length vector for arbitrary text. Two
//! providers are shipped:
//! - `OpenAiEmbedder`: remote API over reqwest, with bounded retry
//! - `HashEmbedder`: deterministic, offline token-hash vectors, used for
//!   tests and for running without credentials. Determinism matters here:
//!   scoring the same paper against the same profile must be reproducible.

use crate::config::EmbeddingConfig;
use crate::errors::{PipelineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed(text).await?);
        }
        Ok(embeddings)
    }

    /// Model name for logging and metrics labels
    fn model_name(&self) -> &str;

    /// Embedding dimension
    fn dimension(&self) -> usize;
}

/// OpenAI-compatible embedding client
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Configuration {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_retries: config.max_retries,
        })
    }

    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_error = None;

        // The first attempt always runs; max_retries counts additional tries.
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(100 * 2_u64.pow(attempt));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(texts).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Embedding request failed, retrying"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| PipelineError::EmbeddingUnavailable {
            message: "unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = EmbeddingRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::EmbeddingUnavailable {
                message: format!("request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::EmbeddingUnavailable {
                message: format!("API error {status}: {body}"),
            });
        }

        let result: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| PipelineError::EmbeddingUnavailable {
                    message: format!("failed to parse response: {e}"),
                })?;

        Ok(result.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.request_with_retry(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::EmbeddingUnavailable {
                message: "empty response".to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        const BATCH_SIZE: usize = 100;

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(BATCH_SIZE) {
            let embeddings = self.request_with_retry(chunk).await?;
            all_embeddings.extend(embeddings);
        }
        Ok(all_embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic offline embedder: each token hashes to a fixed pseudo-random
/// direction, the text embeds as the normalized sum. Identical texts always
/// produce bit-identical vectors; texts sharing tokens land near each other.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn token_vector(&self, token: &str) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.dimension);
        let mut counter: u32 = 0;
        let mut digest = Sha256::digest(token.as_bytes());

        while out.len() < self.dimension {
            for byte in digest.iter() {
                if out.len() == self.dimension {
                    break;
                }
                // Map each byte to [-1.0, 1.0]
                out.push((f32::from(*byte) / 127.5) - 1.0);
            }
            counter += 1;
            let mut hasher = Sha256::new();
            hasher.update(token.as_bytes());
            hasher.update(counter.to_le_bytes());
            digest = hasher.finalize();
        }
        out
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut sum = vec![0.0_f32; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            for (acc, v) in sum.iter_mut().zip(self.token_vector(token)) {
                *acc += v;
            }
        }

        let norm = sum.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut sum {
                *v /= norm;
            }
        }
        Ok(sum)
    }

    fn model_name(&self) -> &str {
        "hash-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config
                .api_key
                .clone()
                .ok_or_else(|| PipelineError::Configuration {
                    message: "embedding.api_key is required for the openai provider".to_string(),
                })?;
            Ok(Arc::new(OpenAiEmbedder::new(key, config)?))
        }
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dimension))),
        other => Err(PipelineError::Configuration {
            message: format!("unknown embedding provider: {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_embedder_dimension() {
        let embedder = HashEmbedder::new(384);
        let embedding = embedder.embed("sparse autoencoders").await.unwrap();
        assert_eq!(embedding.len(), 384);
    }

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed("attention is all you need").await.unwrap();
        let b = embedder.embed("attention is all you need").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_hash_embedder_is_normalized() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed("transformer circuits").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_hash_embedder_empty_text() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_openai_embedder_makes_a_request_with_zero_retries() {
        // Port 1 on loopback refuses the connection, so the request errors
        // without leaving the host. With max_retries = 0 the embedder must
        // still make one attempt and surface that request error.
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            api_key: Some("test-key".to_string()),
            api_base: Some("http://127.0.0.1:1".to_string()),
            model: "text-embedding-3-small".to_string(),
            dimension: 8,
            timeout_secs: 1,
            max_retries: 0,
        };
        let embedder = OpenAiEmbedder::new("test-key".to_string(), &config).unwrap();

        let err = embedder.embed("alpha").await.unwrap_err();
        match err {
            PipelineError::EmbeddingUnavailable { message } => {
                assert!(message.contains("request failed"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_default_batch_matches_single() {
        let embedder = HashEmbedder::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], embedder.embed("alpha").await.unwrap());
        assert_eq!(batch[1], embedder.embed("beta").await.unwrap());
    }
}
