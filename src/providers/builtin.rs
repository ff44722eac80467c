//! Deterministic placeholder generator: the absolute last resort when no
//! remote model can be reached.
//!
//! Questions are built from the transcript's own sentences, so they are never
//! fabricated facts, but they are also not real comprehension questions.
//! Every batch is flagged as degraded, which the orchestrator surfaces via
//! `provenance.used_fallback`. This provider only participates when it is
//! explicitly present in the configured fallback chain (or when no remote
//! provider is configured at all).

use std::time::Instant;

use async_trait::async_trait;
use tracing::warn;

use crate::config::Prompts;
use crate::error::ProviderError;
use crate::providers::{GenerationSpec, QuestionProvider, RawGeneration};
use crate::domain::RawProviderQuestion;

const MAX_STATEMENT_CHARS: usize = 200;

pub struct PlaceholderProvider;

impl PlaceholderProvider {
  /// Split the source into sentence-ish statements long enough to quiz on.
  fn statements(source_text: &str) -> Vec<String> {
    source_text
      .split(|c| matches!(c, '.' | '!' | '?' | '\n'))
      .map(str::trim)
      .filter(|s| s.chars().count() >= 20)
      .map(|s| {
        if s.chars().count() > MAX_STATEMENT_CHARS {
          s.chars().take(MAX_STATEMENT_CHARS).collect::<String>()
        } else {
          s.to_string()
        }
      })
      .collect()
  }
}

#[async_trait]
impl QuestionProvider for PlaceholderProvider {
  fn name(&self) -> &'static str {
    "builtin"
  }

  fn degraded(&self) -> bool {
    true
  }

  async fn generate(
    &self,
    spec: &GenerationSpec<'_>,
    _prompts: &Prompts,
  ) -> Result<RawGeneration, ProviderError> {
    let start = Instant::now();
    let statements = Self::statements(spec.source_text);
    if statements.is_empty() {
      return Err(ProviderError::InvalidResponse {
        reason: "no quizzable statements in source text".into(),
        raw: String::new(),
      });
    }

    warn!(
      target: "question_gen",
      count = spec.count,
      "Serving deterministic placeholder questions (degraded mode)"
    );

    let questions = statements
      .iter()
      .take(spec.count)
      .map(|statement| RawProviderQuestion {
        id: None,
        question_type: Some("true_false".into()),
        difficulty: Some("easy".into()),
        question: format!(
          "According to the lecture, is this statement accurate: \"{statement}\"?"
        ),
        options: vec![],
        correct_answer: Some("true".into()),
        correct_index: None,
        explanation: Some("Stated directly in the transcript.".into()),
      })
      .collect();

    Ok(RawGeneration {
      questions,
      summary: Some("Recall check built from the transcript (no model available).".into()),
      model: "static-template".into(),
      latency_ms: start.elapsed().as_millis() as u64,
      prompt_tokens: None,
      completion_tokens: None,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Prompts;

  #[tokio::test]
  async fn builds_true_false_questions_from_sentences() {
    let provider = PlaceholderProvider;
    let spec = GenerationSpec {
      source_text: "The mitochondria produces most of the cell's ATP. \
        Photosynthesis happens in the chloroplast of plant cells. Short bit.",
      count: 5,
      allowed_types: &[],
      allowed_difficulties: &[],
      context: &[],
    };
    let gen = provider.generate(&spec, &Prompts::default()).await.unwrap();
    // Only the two long-enough sentences become questions.
    assert_eq!(gen.questions.len(), 2);
    assert!(gen.questions[0].question.contains("mitochondria"));
    assert_eq!(gen.questions[0].question_type.as_deref(), Some("true_false"));
    assert!(provider.degraded());
  }

  #[tokio::test]
  async fn refuses_when_nothing_is_quizzable() {
    let provider = PlaceholderProvider;
    let spec = GenerationSpec {
      source_text: "ok. yes. fine. done. right. sure. good. well. hm. uh.",
      count: 2,
      allowed_types: &[],
      allowed_difficulties: &[],
      context: &[],
    };
    assert!(provider.generate(&spec, &Prompts::default()).await.is_err());
  }
}
