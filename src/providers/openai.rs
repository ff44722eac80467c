//! Cloud LLM client (OpenAI chat completions, strict JSON mode).
//!
//! Calls are instrumented and log model names, latencies, and token usage
//! (never contents). We never log the API key.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use tracing::{info, instrument};

use crate::config::{Prompts, RemoteEndpoint};
use crate::error::ProviderError;
use crate::providers::{
  build_user_prompt, classify_http_failure, parse_generation_reply, ChatCompletionRequest,
  ChatCompletionResponse, ChatMessageReq, GenerationSpec, QuestionProvider, RawGeneration,
  ResponseFormat,
};

#[derive(Clone)]
pub struct OpenAiProvider {
  client: reqwest::Client,
  api_key: String,
  base_url: String,
  model: String,
}

impl OpenAiProvider {
  pub fn new(cfg: &RemoteEndpoint) -> Result<Self, String> {
    let client = reqwest::Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .timeout(cfg.timeout)
      .build()
      .map_err(|e| format!("failed to build OpenAI HTTP client: {e}"))?;
    Ok(Self {
      client,
      api_key: cfg.api_key.clone(),
      base_url: cfg.base_url.trim_end_matches('/').to_string(),
      model: cfg.model.clone(),
    })
  }
}

#[async_trait]
impl QuestionProvider for OpenAiProvider {
  fn name(&self) -> &'static str {
    "openai"
  }

  #[instrument(level = "info", skip(self, spec, prompts), fields(model = %self.model, count = spec.count))]
  async fn generate(
    &self,
    spec: &GenerationSpec<'_>,
    prompts: &Prompts,
  ) -> Result<RawGeneration, ProviderError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: prompts.question_system.clone() },
        ChatMessageReq { role: "user".into(), content: build_user_prompt(spec, prompts) },
      ],
      temperature: 0.7,
      response_format: Some(ResponseFormat { format: "json_object".into() }),
    };

    let start = Instant::now();
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
      return Err(classify_http_failure(status, &body));
    }

    let body: ChatCompletionResponse =
      res.json().await.map_err(|e| ProviderError::InvalidResponse {
        reason: format!("chat completion decode failed: {e}"),
        raw: String::new(),
      })?;
    let latency_ms = start.elapsed().as_millis() as u64;

    if let Some(usage) = &body.usage {
      info!(
        target: "question_gen",
        prompt_tokens = ?usage.prompt_tokens,
        completion_tokens = ?usage.completion_tokens,
        "OpenAI usage"
      );
    }

    let content = body
      .choices
      .first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();
    let (questions, summary) = parse_generation_reply(&content)?;

    info!(target: "question_gen", latency_ms, questions = questions.len(), "OpenAI batch parsed");
    Ok(RawGeneration {
      questions,
      summary,
      model: self.model.clone(),
      latency_ms,
      prompt_tokens: body.usage.as_ref().and_then(|u| u.prompt_tokens),
      completion_tokens: body.usage.as_ref().and_then(|u| u.completion_tokens),
    })
  }
}
