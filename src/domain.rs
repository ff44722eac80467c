//! Domain models: question kinds, difficulties, request/result shapes, and the
//! raw provider output that feeds the validator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of quiz question is presented to students?
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
  MultipleChoice,
  TrueFalse,
}

impl QuestionType {
  /// Parse the loose spellings models produce for the type field.
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_lowercase().replace('-', "_").as_str() {
      "multiple_choice" | "mcq" | "choice" => Some(QuestionType::MultipleChoice),
      "true_false" | "truefalse" | "boolean" => Some(QuestionType::TrueFalse),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      QuestionType::MultipleChoice => "multiple_choice",
      QuestionType::TrueFalse => "true_false",
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_lowercase().as_str() {
      "easy" => Some(Difficulty::Easy),
      "medium" => Some(Difficulty::Medium),
      "hard" => Some(Difficulty::Hard),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

/// The (room, session, transcript/segment) tuple that history retrieval and
/// persistence are partitioned by.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
  pub room_id: String,
  pub session_id: String,
  pub transcript_id: String,
  #[serde(default)]
  pub segment_id: Option<String>,
}

impl Scope {
  /// Channel key for real-time delivery of this scope's question batches.
  pub fn channel_key(&self) -> String {
    format!("room:{}", self.room_id)
  }
}

/// Which flow a batch of questions originated from. Segment batches come from
/// streamed transcript blocks; timer batches from periodic holistic passes.
/// Both pools are consulted when retrieving historical context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryCategory {
  Segment,
  Timer,
}

/// Generation mode: short-form segment batches are capped tighter than
/// long-form holistic passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
  #[default]
  Segment,
  Holistic,
}

/// Ephemeral per-invocation request. Created by the caller, consumed by one
/// orchestration pass, never persisted.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
  pub source_text: String,
  pub scope: Scope,
  pub mode: GenerationMode,
  /// Pinned question count; derived from content length when absent.
  pub requested_count: Option<usize>,
  /// Empty means no restriction.
  pub allowed_types: Vec<QuestionType>,
  /// Empty means no restriction.
  pub allowed_difficulties: Vec<Difficulty>,
  /// How many historical context items to retrieve; 0 disables retrieval.
  pub context_limit: usize,
}

/// The one loosely-typed shape every provider client must produce.
/// Only the validator converts this into a `GeneratedQuestion`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawProviderQuestion {
  #[serde(default)]
  pub id: Option<String>,
  #[serde(default, rename = "type", alias = "kind")]
  pub question_type: Option<String>,
  #[serde(default)]
  pub difficulty: Option<String>,
  #[serde(default, alias = "question_text", alias = "text")]
  pub question: String,
  #[serde(default)]
  pub options: Vec<String>,
  #[serde(default, alias = "correctAnswer", alias = "answer")]
  pub correct_answer: Option<String>,
  #[serde(default, alias = "correctIndex", alias = "answer_index")]
  pub correct_index: Option<usize>,
  #[serde(default)]
  pub explanation: Option<String>,
}

/// Where a question came from and how it was produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
  pub provider: String,
  pub model: String,
  pub latency_ms: u64,
  /// True when the question came from a non-primary path: a later provider in
  /// the fallback chain, or the deterministic placeholder generator.
  pub used_fallback: bool,
  pub context_items: usize,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub warnings: Vec<String>,
}

/// Canonical validated question. Never mutated after leaving the validator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
  pub id: String,
  pub kind: QuestionType,
  pub difficulty: Difficulty,
  pub question: String,
  /// 2 entries for true/false, exactly 4 for multiple choice.
  pub options: Vec<String>,
  pub correct_answer: String,
  /// Always indexes into `options`; the option there equals `correct_answer`.
  pub correct_index: usize,
  pub explanation: String,
  pub provenance: Provenance,
}

/// Result of one orchestration pass. Owned by the caller; persistence has
/// already happened by the time this is returned.
#[derive(Clone, Debug, Serialize)]
pub struct GenerationResult {
  pub questions: Vec<GeneratedQuestion>,
  pub summary: String,
  pub provider_used: String,
  pub fallback_chain_attempted: Vec<String>,
  pub total_latency_ms: u64,
}

/// Generation success plus any storage failure, reported side by side.
/// A storage error never masks a successful generation (or vice versa).
#[derive(Clone, Debug, Serialize)]
pub struct GenerationOutcome {
  #[serde(flatten)]
  pub result: GenerationResult,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub persist_error: Option<String>,
}

/// A historical question/answer pair judged relevant to new source text.
/// Advisory only; never persisted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContextItem {
  pub text: String,
  /// Relevance in [0, 1].
  pub score: f32,
}

/// Minimal view of a persisted question, as exposed by the store boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoricalQuestion {
  pub question: String,
  pub answer: String,
  pub created_at: DateTime<Utc>,
}

impl HistoricalQuestion {
  /// Document string embedded during context retrieval.
  pub fn as_context_text(&self) -> String {
    format!("Q: {} | A: {}", self.question, self.answer)
  }
}

/// Payload published to the room channel after a batch is generated.
#[derive(Clone, Debug, Serialize)]
pub struct QuestionBatchEvent {
  pub scope: Scope,
  pub questions: Vec<GeneratedQuestion>,
  pub summary: String,
  pub generated_at: DateTime<Utc>,
}
