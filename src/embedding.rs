//! Embedding/similarity client.
//!
//! Wraps a remote embeddings endpoint (OpenAI-compatible wire format) and
//! provides cosine ranking of candidate documents against a query. Calls log
//! model names and batch sizes, never payload contents or the API key.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::RemoteEndpoint;
use crate::error::ProviderError;
use crate::util::trunc_for_log;

/// Seam for the embedding service so retrieval can be tested without a
/// network.
#[async_trait]
pub trait Embedder: Send + Sync {
  /// Embed a batch of texts, one vector per input, in input order.
  async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

#[derive(Clone)]
pub struct RemoteEmbedder {
  client: reqwest::Client,
  api_key: String,
  base_url: String,
  model: String,
}

impl RemoteEmbedder {
  pub fn new(cfg: &RemoteEndpoint) -> Result<Self, String> {
    let client = reqwest::Client::builder()
      .timeout(cfg.timeout)
      .build()
      .map_err(|e| format!("failed to build embeddings HTTP client: {e}"))?;
    Ok(Self {
      client,
      api_key: cfg.api_key.clone(),
      base_url: cfg.base_url.trim_end_matches('/').to_string(),
      model: cfg.model.clone(),
    })
  }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
  #[instrument(level = "info", skip(self, inputs), fields(model = %self.model, batch = inputs.len()))]
  async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
    if inputs.is_empty() {
      return Ok(vec![]);
    }
    let url = format!("{}/embeddings", self.base_url);
    let req = EmbeddingRequest { model: self.model.clone(), input: inputs.to_vec() };

    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "quizcast-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await
      .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      return Err(ProviderError::InvalidResponse {
        reason: format!("embeddings HTTP {status}"),
        raw: trunc_for_log(&body, 200),
      });
    }

    let body: EmbeddingResponse = res
      .json()
      .await
      .map_err(|e| ProviderError::InvalidResponse {
        reason: format!("embeddings JSON decode failed: {e}"),
        raw: String::new(),
      })?;

    if body.data.len() != inputs.len() {
      return Err(ProviderError::InvalidResponse {
        reason: format!("expected {} vectors, got {}", inputs.len(), body.data.len()),
        raw: String::new(),
      });
    }

    let mut data = body.data;
    data.sort_by_key(|d| d.index);
    info!(target: "question_gen", vectors = data.len(), "Embedding batch complete");
    Ok(data.into_iter().map(|d| d.embedding).collect())
  }
}

/// Cosine similarity of two vectors; 0.0 for mismatched or zero-length input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() || a.is_empty() {
    return 0.0;
  }
  let mut dot = 0.0f32;
  let mut na = 0.0f32;
  let mut nb = 0.0f32;
  for (x, y) in a.iter().zip(b) {
    dot += x * y;
    na += x * x;
    nb += y * y;
  }
  if na == 0.0 || nb == 0.0 {
    return 0.0;
  }
  dot / (na.sqrt() * nb.sqrt())
}

// --- Wire DTOs ---

#[derive(Serialize)]
struct EmbeddingRequest {
  model: String,
  input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
  index: usize,
  embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cosine_of_identical_vectors_is_one() {
    let v = vec![0.5, -0.2, 0.8];
    assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
  }

  #[test]
  fn cosine_of_orthogonal_vectors_is_zero() {
    assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
  }

  #[test]
  fn cosine_handles_degenerate_input() {
    assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    assert_eq!(cosine_similarity(&[], &[]), 0.0);
  }
}
