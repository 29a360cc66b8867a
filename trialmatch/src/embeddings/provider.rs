use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::config::EmbeddingsConfig;
use crate::error::{MatchError, Result};

enum EmbeddingBackend {
    Remote {
        client: Client,
        endpoint: String,
        api_token: String,
    },
    /// Deterministic token-hash vectors; keeps the pipeline total when no
    /// embedding service is configured.
    Hash,
}

/// Embedding provider over an optional remote feature-extraction endpoint.
/// Embedding is total: a remote failure degrades to the hash backend for
/// that call rather than failing the matching cycle.
pub struct EmbeddingProvider {
    backend: EmbeddingBackend,
    dimensions: usize,
}

impl EmbeddingProvider {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        let backend = match (&config.endpoint, &config.api_token) {
            (Some(endpoint), Some(api_token))
                if !endpoint.is_empty() && !api_token.is_empty() =>
            {
                let client = Client::builder()
                    .timeout(Duration::from_secs(config.timeout_secs))
                    .build()
                    .map_err(|e| {
                        MatchError::Embedding(format!("Failed to create HTTP client: {e}"))
                    })?;
                EmbeddingBackend::Remote {
                    client,
                    endpoint: endpoint.clone(),
                    api_token: api_token.clone(),
                }
            }
            _ => EmbeddingBackend::Hash,
        };

        Ok(Self {
            backend,
            dimensions: config.dimensions,
        })
    }

    /// Hash-only provider for tests and offline runs.
    pub fn deterministic(dimensions: usize) -> Self {
        Self {
            backend: EmbeddingBackend::Hash,
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub async fn embed(&self, text: &str) -> Vec<f32> {
        let vector = match &self.backend {
            EmbeddingBackend::Remote {
                client,
                endpoint,
                api_token,
            } => match remote_embedding(client, endpoint, api_token, text).await {
                Ok(Some(vector)) => vector,
                Ok(None) => hash_vector(text, self.dimensions),
                Err(error) => {
                    tracing::warn!(error = %error, "Remote embedding failed, using hash fallback");
                    hash_vector(text, self.dimensions)
                }
            },
            EmbeddingBackend::Hash => hash_vector(text, self.dimensions),
        };

        fit_dimensions(vector, self.dimensions)
    }
}

async fn remote_embedding(
    client: &Client,
    endpoint: &str,
    api_token: &str,
    text: &str,
) -> Result<Option<Vec<f32>>> {
    let response = client
        .post(endpoint)
        .bearer_auth(api_token)
        .json(&serde_json::json!({ "inputs": text }))
        .send()
        .await?
        .error_for_status()?;

    let payload: Value = response.json().await?;

    // Feature-extraction endpoints return either a flat vector or one
    // vector per input.
    let vector = match payload {
        Value::Array(ref items) if items.first().map(Value::is_number).unwrap_or(false) => {
            parse_vector(items)
        }
        Value::Array(ref items) => match items.first() {
            Some(Value::Array(inner)) => parse_vector(inner),
            _ => None,
        },
        _ => None,
    };

    Ok(vector)
}

fn parse_vector(items: &[Value]) -> Option<Vec<f32>> {
    items
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

/// Stable per-token hash embedding. Each token contributes +/-1 at an index
/// derived from its SHA-256 digest; the result is L2-normalized.
fn hash_vector(text: &str, dimensions: usize) -> Vec<f32> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();
    if tokens.is_empty() {
        return vec![0.0; dimensions];
    }

    let mut vector = vec![0.0_f32; dimensions];
    for token in tokens {
        let digest = Sha256::digest(token.as_bytes());
        let idx = (u16::from_be_bytes([digest[0], digest[1]]) as usize) % dimensions;
        let sign = if digest[2] % 2 == 1 { -1.0 } else { 1.0 };
        vector[idx] += sign;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm = if norm == 0.0 { 1.0 } else { norm };
    vector.iter().map(|v| v / norm).collect()
}

fn fit_dimensions(mut vector: Vec<f32>, dimensions: usize) -> Vec<f32> {
    if vector.len() < dimensions {
        vector.resize(dimensions, 0.0);
    }
    vector.truncate(dimensions);
    vector
}
