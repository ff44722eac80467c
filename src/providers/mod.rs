//! Question-generation provider clients.
//!
//! Each client builds its own instruction prompt, sends one request to its
//! remote model, and parses that provider's reply shape into
//! `RawProviderQuestion`s. Clients never persist or notify; the orchestrator
//! owns everything after the raw batch comes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Prompts;
use crate::domain::{ContextItem, Difficulty, QuestionType, RawProviderQuestion};
use crate::error::ProviderError;
use crate::util::{extract_first_json, fill_template, trunc_for_log};

pub mod builtin;
pub mod groq;
pub mod ollama;
pub mod openai;

/// What one provider call needs to know. Borrowed from the orchestrator for
/// the duration of the attempt.
pub struct GenerationSpec<'a> {
  pub source_text: &'a str,
  pub count: usize,
  pub allowed_types: &'a [QuestionType],
  pub allowed_difficulties: &'a [Difficulty],
  pub context: &'a [ContextItem],
}

/// Raw batch plus generation metadata, as returned by one provider call.
#[derive(Debug)]
pub struct RawGeneration {
  pub questions: Vec<RawProviderQuestion>,
  pub summary: Option<String>,
  pub model: String,
  pub latency_ms: u64,
  pub prompt_tokens: Option<u32>,
  pub completion_tokens: Option<u32>,
}

#[async_trait]
pub trait QuestionProvider: Send + Sync {
  fn name(&self) -> &'static str;

  /// True for non-primary paths (deterministic placeholders). Flagged in
  /// provenance on every question such a provider emits.
  fn degraded(&self) -> bool {
    false
  }

  /// One request to the remote model per call. No internal retries unless
  /// the concrete client documents a bounded policy.
  async fn generate(
    &self,
    spec: &GenerationSpec<'_>,
    prompts: &Prompts,
  ) -> Result<RawGeneration, ProviderError>;
}

/// Render the shared user prompt: source text, requested count, type and
/// difficulty mix, and the avoid-duplicates block when context is present.
pub fn build_user_prompt(spec: &GenerationSpec<'_>, prompts: &Prompts) -> String {
  let types = if spec.allowed_types.is_empty() {
    "multiple_choice, true_false".to_string()
  } else {
    spec
      .allowed_types
      .iter()
      .map(QuestionType::as_str)
      .collect::<Vec<_>>()
      .join(", ")
  };
  let difficulties = if spec.allowed_difficulties.is_empty() {
    "easy, medium, hard".to_string()
  } else {
    spec
      .allowed_difficulties
      .iter()
      .map(Difficulty::as_str)
      .collect::<Vec<_>>()
      .join(", ")
  };
  let context_block = if spec.context.is_empty() {
    String::new()
  } else {
    let items = spec
      .context
      .iter()
      .map(|c| format!("- {}", c.text))
      .collect::<Vec<_>>()
      .join("\n");
    fill_template(&prompts.context_block_template, &[("items", &items)])
  };
  fill_template(
    &prompts.question_user_template,
    &[
      ("count", &spec.count.to_string()),
      ("types", &types),
      ("difficulties", &difficulties),
      ("context_block", &context_block),
      ("transcript", spec.source_text),
    ],
  )
}

#[derive(Deserialize)]
struct ReplyEnvelope {
  #[serde(default)]
  summary: Option<String>,
  #[serde(default)]
  questions: Vec<RawProviderQuestion>,
}

/// Parse a model's free-text reply into raw questions plus optional summary.
///
/// Accepts either a bare JSON array of questions or an object with
/// `summary`/`questions` keys, with code fences and surrounding prose
/// stripped. A parse failure surfaces the raw text for diagnosis rather than
/// collapsing into a generic error.
pub fn parse_generation_reply(
  raw: &str,
) -> Result<(Vec<RawProviderQuestion>, Option<String>), ProviderError> {
  let json = extract_first_json(raw).ok_or_else(|| ProviderError::InvalidResponse {
    reason: "no JSON array or object found in reply".into(),
    raw: trunc_for_log(raw, 400),
  })?;

  if json.starts_with('[') {
    let questions: Vec<RawProviderQuestion> =
      serde_json::from_str(json).map_err(|e| ProviderError::InvalidResponse {
        reason: format!("question array parse failed: {e}"),
        raw: trunc_for_log(raw, 400),
      })?;
    return Ok((questions, None));
  }

  let envelope: ReplyEnvelope =
    serde_json::from_str(json).map_err(|e| ProviderError::InvalidResponse {
      reason: format!("reply object parse failed: {e}"),
      raw: trunc_for_log(raw, 400),
    })?;
  Ok((envelope.questions, envelope.summary))
}

// --- Shared chat-completions wire DTOs (OpenAI-compatible providers) ---

#[derive(Serialize)]
pub(crate) struct ChatCompletionRequest {
  pub model: String,
  pub messages: Vec<ChatMessageReq>,
  pub temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
pub(crate) struct ChatMessageReq {
  pub role: String,
  pub content: String,
}

#[derive(Serialize)]
pub(crate) struct ResponseFormat {
  #[serde(rename = "type")]
  pub format: String,
}

#[derive(Deserialize)]
pub(crate) struct ChatCompletionResponse {
  pub choices: Vec<ChatChoice>,
  #[serde(default)]
  pub usage: Option<Usage>,
}

#[derive(Deserialize)]
pub(crate) struct ChatChoice {
  pub message: ChatMessageResp,
}

#[derive(Deserialize)]
pub(crate) struct ChatMessageResp {
  pub content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct Usage {
  #[serde(default)]
  pub prompt_tokens: Option<u32>,
  #[serde(default)]
  pub completion_tokens: Option<u32>,
}

/// Try to extract a clean error message from an OpenAI-style error body.
pub(crate) fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap {
    error: EObj,
  }
  #[derive(Deserialize)]
  struct EObj {
    message: String,
  }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}

/// Map an HTTP failure status to the taxonomy: rate limits and server errors
/// are transient, anything else is permanent for this attempt.
pub(crate) fn classify_http_failure(
  status: reqwest::StatusCode,
  body: &str,
) -> ProviderError {
  let msg = extract_api_error(body).unwrap_or_else(|| trunc_for_log(body, 200));
  if status.as_u16() == 429 || status.is_server_error() {
    ProviderError::Unavailable(format!("HTTP {status}: {msg}"))
  } else {
    ProviderError::InvalidResponse {
      reason: format!("HTTP {status}"),
      raw: msg,
    }
  }
}
