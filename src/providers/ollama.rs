//! Local-model client (Ollama native chat API).
//!
//! Local models are slow to first token, so this client gets a multi-minute
//! request ceiling. It is also the one provider with a bounded internal retry
//! policy: up to 3 attempts with exponential backoff + jitter when the local
//! server reports a transient condition, before the orchestrator's fallback
//! chain ever sees the failure.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::{Prompts, RemoteEndpoint};
use crate::error::ProviderError;
use crate::providers::{
  build_user_prompt, parse_generation_reply, GenerationSpec, QuestionProvider, RawGeneration,
};
use crate::util::trunc_for_log;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 5_000;

fn backoff_delay(attempt: u32) -> Duration {
  let base = INITIAL_BACKOFF_MS * 2u64.pow(attempt);
  let jitter = rand::thread_rng().gen_range(0..100);
  Duration::from_millis(base.min(MAX_BACKOFF_MS) + jitter)
}

#[derive(Clone)]
pub struct OllamaProvider {
  client: reqwest::Client,
  base_url: String,
  model: String,
}

impl OllamaProvider {
  pub fn new(cfg: &RemoteEndpoint) -> Result<Self, String> {
    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(5))
      .timeout(cfg.timeout)
      .build()
      .map_err(|e| format!("failed to build Ollama HTTP client: {e}"))?;
    Ok(Self {
      client,
      base_url: cfg.base_url.trim_end_matches('/').to_string(),
      model: cfg.model.clone(),
    })
  }

  /// One request/response against /api/chat.
  async fn attempt(&self, payload: &ChatRequest) -> Result<(ChatResponse, u64), ProviderError> {
    let url = format!("{}/api/chat", self.base_url);
    let start = Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "quizcast-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(payload)
      .send()
      .await
      .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      if status.as_u16() == 429 || status.is_server_error() {
        return Err(ProviderError::Unavailable(format!(
          "HTTP {status}: {}",
          trunc_for_log(&body, 200)
        )));
      }
      return Err(ProviderError::InvalidResponse {
        reason: format!("HTTP {status}"),
        raw: trunc_for_log(&body, 200),
      });
    }

    let body: ChatResponse = res.json().await.map_err(|e| ProviderError::InvalidResponse {
      reason: format!("chat decode failed: {e}"),
      raw: String::new(),
    })?;
    Ok((body, start.elapsed().as_millis() as u64))
  }
}

#[async_trait]
impl QuestionProvider for OllamaProvider {
  fn name(&self) -> &'static str {
    "ollama"
  }

  #[instrument(level = "info", skip(self, spec, prompts), fields(model = %self.model, count = spec.count))]
  async fn generate(
    &self,
    spec: &GenerationSpec<'_>,
    prompts: &Prompts,
  ) -> Result<RawGeneration, ProviderError> {
    let payload = ChatRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessage { role: "system".into(), content: prompts.question_system.clone() },
        ChatMessage { role: "user".into(), content: build_user_prompt(spec, prompts) },
      ],
      stream: false,
      format: Some("json".into()),
    };

    let total = Instant::now();
    let mut last_unavailable = None;
    for attempt in 0..MAX_ATTEMPTS {
      if attempt > 0 {
        let delay = backoff_delay(attempt - 1);
        warn!(
          target: "question_gen",
          attempt,
          ?delay,
          "Ollama transiently unavailable; retrying"
        );
        tokio::time::sleep(delay).await;
      }

      match self.attempt(&payload).await {
        Ok((body, _)) => {
          let latency_ms = total.elapsed().as_millis() as u64;
          let (questions, summary) = parse_generation_reply(&body.message.content)?;
          info!(
            target: "question_gen",
            latency_ms,
            questions = questions.len(),
            "Ollama batch parsed"
          );
          return Ok(RawGeneration {
            questions,
            summary,
            model: self.model.clone(),
            latency_ms,
            prompt_tokens: body.prompt_eval_count,
            completion_tokens: body.eval_count,
          });
        }
        // Malformed replies are permanent for this attempt; retrying the
        // same prompt against the same model buys nothing.
        Err(e @ ProviderError::InvalidResponse { .. }) => return Err(e),
        Err(ProviderError::Unavailable(msg)) => last_unavailable = Some(msg),
      }
    }

    Err(ProviderError::Unavailable(format!(
      "gave up after {MAX_ATTEMPTS} attempts: {}",
      last_unavailable.unwrap_or_else(|| "unknown".into())
    )))
  }
}

// --- Ollama wire DTOs ---

#[derive(Serialize)]
struct ChatRequest {
  model: String,
  messages: Vec<ChatMessage>,
  stream: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  format: Option<String>,
}

#[derive(Serialize)]
struct ChatMessage {
  role: String,
  content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
  message: ChatMessageResp,
  #[serde(default)]
  prompt_eval_count: Option<u32>,
  #[serde(default)]
  eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct ChatMessageResp {
  content: String,
}
