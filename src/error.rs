//! Error taxonomy for the generation core.
//!
//! Transient provider trouble triggers the fallback chain; malformed replies
//! do too, but are never retried against the same provider within one pass.
//! Individual bad questions are dropped without failing the batch. Only full
//! chain exhaustion aborts a generation attempt.

use thiserror::Error;

/// Failure of a single provider call.
#[derive(Debug, Error)]
pub enum ProviderError {
  /// Network trouble, timeout, or rate limiting. Transient.
  #[error("provider unavailable: {0}")]
  Unavailable(String),

  /// Unparseable or schema-violating reply. Permanent for this attempt.
  /// Carries a truncated raw-text preview for diagnosis.
  #[error("invalid provider response: {reason}; raw: {raw}")]
  InvalidResponse { reason: String, raw: String },
}

/// One entry in the aggregated failure list: which provider, what went wrong.
#[derive(Debug, Error)]
#[error("{provider}: {error}")]
pub struct ProviderFailure {
  pub provider: String,
  pub error: ProviderError,
}

fn join_failures(failures: &[ProviderFailure]) -> String {
  failures
    .iter()
    .map(|f| f.to_string())
    .collect::<Vec<_>>()
    .join("; ")
}

/// Terminal errors of one orchestration pass.
#[derive(Debug, Error)]
pub enum GenerateError {
  /// Source text below the generation floor. Rejected before any provider is
  /// called.
  #[error("source text too short: {actual} chars after trimming, minimum {min}")]
  SourceTooShort { actual: usize, min: usize },

  /// Every provider in the fallback chain failed. Lists one entry per
  /// attempted provider, in chain order, so operators can see the whole
  /// outage pattern rather than just the last error.
  #[error("all providers in the fallback chain failed: {}", join_failures(.0))]
  ProvidersExhausted(Vec<ProviderFailure>),
}

/// Defect in an individual raw question. The question is dropped; the batch
/// continues.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaViolation {
  #[error("missing or empty field: {0}")]
  MissingField(&'static str),

  #[error("unknown question type: {0:?}")]
  UnknownType(String),

  #[error("unknown difficulty: {0:?}")]
  UnknownDifficulty(String),

  #[error("question type {kind} not allowed by this request")]
  DisallowedType { kind: &'static str },

  #[error("difficulty {difficulty} not allowed by this request")]
  DisallowedDifficulty { difficulty: &'static str },

  #[error("{kind} requires exactly {expected} options, got {actual}")]
  WrongOptionCount {
    kind: &'static str,
    expected: usize,
    actual: usize,
  },

  #[error("option {index} is empty")]
  EmptyOption { index: usize },

  #[error("correct option index {index} out of range for {len} options")]
  IndexOutOfRange { index: usize, len: usize },

  #[error("answer text ambiguous: matches no option ({0:?})")]
  AnswerMatchesNoOption(String),

  #[error("answer text ambiguous: matches multiple options ({0:?})")]
  AnswerMatchesMultipleOptions(String),

  #[error("option at index {index} does not match the supplied answer text")]
  AnswerIndexMismatch { index: usize },

  #[error("question text length {actual} outside bounds [{min}, {max}]")]
  QuestionLengthOutOfBounds {
    actual: usize,
    min: usize,
    max: usize,
  },
}

/// Failure at the persistence boundary. Reported independently of generation
/// success, never conflated with it.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("storage backend error: {0}")]
  Backend(String),
}

/// Failure at the notification boundary. Publish is fire-and-forget, so this
/// never fails a generation call.
#[derive(Debug, Error)]
pub enum NotifyError {
  #[error("payload serialization failed: {0}")]
  Serialize(String),
}
