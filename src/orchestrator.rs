//! Generation orchestration: question-count policy, fallback chain
//! execution, validation funnel, and the persistence + notification handoff.
//!
//! The orchestrator holds no mutable state of its own; concurrent calls for
//! different scopes cannot interfere. Callers are responsible for not issuing
//! duplicate requests for the same scope.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::config::{GenerationSettings, Prompts};
use crate::context::ContextRetriever;
use crate::domain::{
  ContextItem, GenerationMode, GenerationOutcome, GenerationRequest, GenerationResult, Provenance,
  QuestionBatchEvent,
};
use crate::error::{GenerateError, ProviderError, ProviderFailure};
use crate::notify::Notifier;
use crate::providers::{GenerationSpec, QuestionProvider};
use crate::store::QuestionStore;
use crate::validator::normalize_batch;

pub struct Orchestrator {
  providers: Vec<Arc<dyn QuestionProvider>>,
  retriever: Option<ContextRetriever>,
  store: Arc<dyn QuestionStore>,
  notifier: Arc<dyn Notifier>,
  prompts: Prompts,
  settings: GenerationSettings,
}

impl Orchestrator {
  pub fn new(
    providers: Vec<Arc<dyn QuestionProvider>>,
    retriever: Option<ContextRetriever>,
    store: Arc<dyn QuestionStore>,
    notifier: Arc<dyn Notifier>,
    prompts: Prompts,
    settings: GenerationSettings,
  ) -> Self {
    Self { providers, retriever, store, notifier, prompts, settings }
  }

  /// Names of the providers actually constructed, for startup logging and
  /// chain sanity checks.
  pub fn provider_names(&self) -> Vec<&'static str> {
    self.providers.iter().map(|p| p.name()).collect()
  }

  /// Run one generation pass with the configured fallback chain.
  pub async fn generate_questions(
    &self,
    request: GenerationRequest,
  ) -> Result<GenerationOutcome, GenerateError> {
    let chain = self.settings.fallback_chain.clone();
    self.generate_with_chain(request, &chain).await
  }

  /// Run one generation pass, trying `chain` strictly in order. Fails only
  /// when every provider in the chain has been exhausted.
  #[instrument(level = "info", skip(self, request, chain),
               fields(room = %request.scope.room_id, mode = ?request.mode, chain_len = chain.len()))]
  pub async fn generate_with_chain(
    &self,
    request: GenerationRequest,
    chain: &[String],
  ) -> Result<GenerationOutcome, GenerateError> {
    let total_start = Instant::now();

    let source_text = request.source_text.trim().to_string();
    let actual = source_text.chars().count();
    if actual < self.settings.min_source_chars {
      return Err(GenerateError::SourceTooShort {
        actual,
        min: self.settings.min_source_chars,
      });
    }

    let count = self.target_count(&request, &source_text);

    // Retrieval is provider-independent, so one pass serves every fallback
    // attempt.
    let context = self.retrieve_context(&source_text, &request).await;

    let spec = GenerationSpec {
      source_text: &source_text,
      count,
      allowed_types: &request.allowed_types,
      allowed_difficulties: &request.allowed_difficulties,
      context: &context,
    };

    let mut attempted: Vec<String> = Vec::with_capacity(chain.len());
    let mut failures: Vec<ProviderFailure> = Vec::new();

    for name in chain {
      attempted.push(name.clone());
      let Some(provider) = self.providers.iter().find(|p| p.name() == name) else {
        warn!(target: "question_gen", provider = %name, "Provider in chain is not configured");
        failures.push(ProviderFailure {
          provider: name.clone(),
          error: ProviderError::Unavailable("provider not configured".into()),
        });
        continue;
      };

      match provider.generate(&spec, &self.prompts).await {
        Ok(raw) => {
          let provenance = Provenance {
            provider: provider.name().to_string(),
            model: raw.model.clone(),
            latency_ms: raw.latency_ms,
            used_fallback: !failures.is_empty() || provider.degraded(),
            context_items: context.len(),
            warnings: vec![],
          };
          let raw_count = raw.questions.len();
          let (questions, dropped) = normalize_batch(
            raw.questions,
            &provenance,
            &request.allowed_types,
            &request.allowed_difficulties,
          );

          let summary = if questions.is_empty() {
            format!(
              "no usable questions: {} returned {raw_count} raw question(s), {} dropped by validation",
              provider.name(),
              dropped.len()
            )
          } else {
            raw.summary.unwrap_or_default()
          };

          info!(
            target: "question_gen",
            provider = %provider.name(),
            kept = questions.len(),
            dropped = dropped.len(),
            fallbacks = failures.len(),
            "Generation succeeded"
          );

          let result = GenerationResult {
            questions,
            summary,
            provider_used: provider.name().to_string(),
            fallback_chain_attempted: attempted,
            total_latency_ms: total_start.elapsed().as_millis() as u64,
          };
          let persist_error = self.persist_and_notify(&request, &result).await;
          return Ok(GenerationOutcome { result, persist_error });
        }
        Err(e) => {
          error!(
            target: "question_gen",
            provider = %provider.name(),
            error = %e,
            "Provider failed; advancing fallback chain"
          );
          failures.push(ProviderFailure { provider: name.clone(), error: e });
        }
      }
    }

    Err(GenerateError::ProvidersExhausted(failures))
  }

  /// Persist and publish a finished batch. A storage failure is returned for
  /// independent surfacing; a publish failure is only logged. Neither touches
  /// the generation result.
  async fn persist_and_notify(
    &self,
    request: &GenerationRequest,
    result: &GenerationResult,
  ) -> Option<String> {
    if result.questions.is_empty() {
      return None;
    }

    let persist_error = match self.store.save(&request.scope, &result.questions).await {
      Ok(()) => None,
      Err(e) => {
        error!(target: "question_gen", error = %e, "Failed to persist question batch");
        Some(e.to_string())
      }
    };

    let event = QuestionBatchEvent {
      scope: request.scope.clone(),
      questions: result.questions.clone(),
      summary: result.summary.clone(),
      generated_at: Utc::now(),
    };
    if let Err(e) = self.notifier.publish(&request.scope.channel_key(), &event).await {
      warn!(target: "question_gen", error = %e, "Failed to publish question batch");
    }

    persist_error
  }

  async fn retrieve_context(
    &self,
    source_text: &str,
    request: &GenerationRequest,
  ) -> Vec<ContextItem> {
    let Some(retriever) = &self.retriever else { return vec![] };
    if request.context_limit == 0 {
      return vec![];
    }
    retriever
      .retrieve_context(source_text, &request.scope, request.context_limit)
      .await
  }

  /// Pin the caller's count when present, otherwise derive one from content
  /// length; either way the mode's ceiling applies.
  fn target_count(&self, request: &GenerationRequest, source_text: &str) -> usize {
    let max = match request.mode {
      GenerationMode::Segment => self.settings.max_segment_questions,
      GenerationMode::Holistic => self.settings.max_holistic_questions,
    };
    let words = source_text.split_whitespace().count();
    let count = request.requested_count.unwrap_or_else(|| derived_count(words, request.mode));
    count.clamp(1, max.max(1))
  }
}

/// Monotonic step function from word count to question count. Longer text
/// earns more questions, but never more than a handful; past a few hundred
/// words extra volume stops adding value for students.
pub(crate) fn derived_count(word_count: usize, mode: GenerationMode) -> usize {
  let steps: &[(usize, usize)] = match mode {
    GenerationMode::Segment => &[(0, 1), (120, 2), (240, 3), (400, 4), (600, 5)],
    GenerationMode::Holistic => {
      &[(0, 2), (200, 3), (400, 4), (700, 5), (1000, 6), (1400, 7), (1900, 8)]
    }
  };
  steps
    .iter()
    .rev()
    .find(|(min_words, _)| word_count >= *min_words)
    .map(|(_, count)| *count)
    .unwrap_or(1)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Prompts;
  use crate::domain::{
    GeneratedQuestion, HistoricalQuestion, HistoryCategory, QuestionType, RawProviderQuestion,
    Scope,
  };
  use crate::error::{NotifyError, StoreError};
  use crate::providers::RawGeneration;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicUsize, Ordering};

  enum Behavior {
    Unavailable,
    InvalidReply,
    Succeed(Vec<RawProviderQuestion>),
  }

  struct FakeProvider {
    name: &'static str,
    behavior: Behavior,
    calls: AtomicUsize,
  }

  impl FakeProvider {
    fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
      Arc::new(Self { name, behavior, calls: AtomicUsize::new(0) })
    }
  }

  #[async_trait]
  impl QuestionProvider for FakeProvider {
    fn name(&self) -> &'static str {
      self.name
    }

    async fn generate(
      &self,
      _spec: &GenerationSpec<'_>,
      _prompts: &Prompts,
    ) -> Result<RawGeneration, ProviderError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      match &self.behavior {
        Behavior::Unavailable => Err(ProviderError::Unavailable("connection refused".into())),
        Behavior::InvalidReply => Err(ProviderError::InvalidResponse {
          reason: "no JSON array or object found in reply".into(),
          raw: "Sorry, I cannot help with that.".into(),
        }),
        Behavior::Succeed(questions) => Ok(RawGeneration {
          questions: questions.clone(),
          summary: Some("lecture recap".into()),
          model: "fake-model".into(),
          latency_ms: 7,
          prompt_tokens: Some(100),
          completion_tokens: Some(50),
        }),
      }
    }
  }

  #[derive(Default)]
  struct RecordingStore {
    saves: AtomicUsize,
    fail: bool,
  }

  #[async_trait]
  impl QuestionStore for RecordingStore {
    async fn save(
      &self,
      _scope: &Scope,
      _questions: &[GeneratedQuestion],
    ) -> Result<(), StoreError> {
      self.saves.fetch_add(1, Ordering::SeqCst);
      if self.fail {
        return Err(StoreError::Backend("disk full".into()));
      }
      Ok(())
    }

    async fn find_recent_by_scope(
      &self,
      _scope: &Scope,
      _category: HistoryCategory,
      _limit: usize,
    ) -> Result<Vec<HistoricalQuestion>, StoreError> {
      Ok(vec![])
    }
  }

  #[derive(Default)]
  struct RecordingNotifier {
    published: AtomicUsize,
  }

  #[async_trait]
  impl Notifier for RecordingNotifier {
    async fn publish(
      &self,
      _channel: &str,
      _event: &QuestionBatchEvent,
    ) -> Result<(), NotifyError> {
      self.published.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  }

  fn raw_tf_missing_index() -> RawProviderQuestion {
    RawProviderQuestion {
      id: None,
      question_type: Some("true_false".into()),
      difficulty: Some("easy".into()),
      question: "The lecture covered cellular respiration.".into(),
      options: vec![],
      correct_answer: Some("true".into()),
      correct_index: None,
      explanation: Some("Opening topic of the segment.".into()),
    }
  }

  fn raw_mc() -> RawProviderQuestion {
    RawProviderQuestion {
      id: None,
      question_type: Some("multiple_choice".into()),
      difficulty: Some("medium".into()),
      question: "Where does glycolysis take place?".into(),
      options: vec!["Cytoplasm".into(), "Nucleus".into(), "Mitochondria".into(), "Membrane".into()],
      correct_answer: Some("Cytoplasm".into()),
      correct_index: None,
      explanation: Some("Glycolysis happens in the cytoplasm.".into()),
    }
  }

  fn request(text: &str) -> GenerationRequest {
    GenerationRequest {
      source_text: text.into(),
      scope: Scope {
        room_id: "room-1".into(),
        session_id: "sess-1".into(),
        transcript_id: "tr-1".into(),
        segment_id: Some("seg-1".into()),
      },
      mode: GenerationMode::Segment,
      requested_count: None,
      allowed_types: vec![],
      allowed_difficulties: vec![],
      context_limit: 0,
    }
  }

  fn long_text() -> String {
    "today we walk through cellular respiration and the krebs cycle in detail ".repeat(5)
  }

  fn orchestrator(
    providers: Vec<Arc<dyn QuestionProvider>>,
    store: Arc<RecordingStore>,
    notifier: Arc<RecordingNotifier>,
  ) -> Orchestrator {
    Orchestrator::new(
      providers,
      None,
      store,
      notifier,
      Prompts::default(),
      GenerationSettings::default(),
    )
  }

  #[tokio::test]
  async fn short_source_is_rejected_before_any_provider_call() {
    let provider = FakeProvider::new("alpha", Behavior::Succeed(vec![raw_mc()]));
    let orch = orchestrator(
      vec![provider.clone()],
      Arc::new(RecordingStore::default()),
      Arc::new(RecordingNotifier::default()),
    );
    // 40 chars after trimming: below the 50-char floor.
    let err = orch
      .generate_with_chain(request("a short forty characters string of words"), &["alpha".into()])
      .await
      .unwrap_err();
    assert!(matches!(err, GenerateError::SourceTooShort { actual: 40, min: 50 }));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn fallback_chain_recovers_and_derives_missing_index() {
    let down = FakeProvider::new("alpha", Behavior::Unavailable);
    let up = FakeProvider::new(
      "beta",
      Behavior::Succeed(vec![raw_mc(), raw_tf_missing_index(), raw_mc()]),
    );
    let store = Arc::new(RecordingStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let orch = orchestrator(vec![down.clone(), up.clone()], store.clone(), notifier.clone());

    let outcome = orch
      .generate_with_chain(request(&long_text()), &["alpha".into(), "beta".into()])
      .await
      .unwrap();

    let result = &outcome.result;
    assert_eq!(result.questions.len(), 3);
    assert_eq!(result.provider_used, "beta");
    assert_eq!(result.fallback_chain_attempted, vec!["alpha".to_string(), "beta".to_string()]);
    assert!(result.questions.iter().all(|q| q.provenance.used_fallback));

    let tf = result.questions.iter().find(|q| q.kind == QuestionType::TrueFalse).unwrap();
    assert_eq!(tf.correct_index, 0);
    assert_eq!(tf.options, vec!["True", "False"]);

    assert!(outcome.persist_error.is_none());
    assert_eq!(store.saves.load(Ordering::SeqCst), 1);
    assert_eq!(notifier.published.load(Ordering::SeqCst), 1);
    assert_eq!(down.calls.load(Ordering::SeqCst), 1);
    assert_eq!(up.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn exhausted_chain_lists_every_attempt_in_order() {
    let a = FakeProvider::new("alpha", Behavior::Unavailable);
    let b = FakeProvider::new("beta", Behavior::InvalidReply);
    let orch = orchestrator(
      vec![a, b],
      Arc::new(RecordingStore::default()),
      Arc::new(RecordingNotifier::default()),
    );

    let err = orch
      .generate_with_chain(
        request(&long_text()),
        &["alpha".into(), "beta".into(), "gamma".into()],
      )
      .await
      .unwrap_err();

    let GenerateError::ProvidersExhausted(failures) = err else {
      panic!("expected exhaustion");
    };
    assert_eq!(failures.len(), 3);
    assert_eq!(failures[0].provider, "alpha");
    assert!(matches!(failures[0].error, ProviderError::Unavailable(_)));
    assert_eq!(failures[1].provider, "beta");
    assert!(matches!(failures[1].error, ProviderError::InvalidResponse { .. }));
    // gamma is in the chain but not configured; still reported.
    assert_eq!(failures[2].provider, "gamma");
  }

  #[tokio::test]
  async fn zero_usable_questions_is_success_with_reason_not_failure() {
    let mut bad = raw_mc();
    bad.options.pop();
    let provider = FakeProvider::new("alpha", Behavior::Succeed(vec![bad]));
    let store = Arc::new(RecordingStore::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let orch = orchestrator(vec![provider], store.clone(), notifier.clone());

    let outcome = orch
      .generate_with_chain(request(&long_text()), &["alpha".into()])
      .await
      .unwrap();
    assert!(outcome.result.questions.is_empty());
    assert!(outcome.result.summary.contains("no usable questions"));
    assert!(outcome.result.summary.contains("1 dropped"));
    // Nothing to persist or publish.
    assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    assert_eq!(notifier.published.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn storage_failure_is_surfaced_separately_from_generation_success() {
    let provider = FakeProvider::new("alpha", Behavior::Succeed(vec![raw_mc()]));
    let store = Arc::new(RecordingStore { saves: AtomicUsize::new(0), fail: true });
    let notifier = Arc::new(RecordingNotifier::default());
    let orch = orchestrator(vec![provider], store, notifier.clone());

    let outcome = orch
      .generate_with_chain(request(&long_text()), &["alpha".into()])
      .await
      .unwrap();
    assert_eq!(outcome.result.questions.len(), 1);
    assert!(outcome.persist_error.as_deref().unwrap().contains("disk full"));
    // Publish still happens; clients should not starve because storage blinked.
    assert_eq!(notifier.published.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn pinned_count_is_clamped_to_mode_ceiling() {
    let provider = FakeProvider::new("alpha", Behavior::Succeed(vec![raw_mc()]));
    let orch = orchestrator(
      vec![provider],
      Arc::new(RecordingStore::default()),
      Arc::new(RecordingNotifier::default()),
    );

    let mut req = request(&long_text());
    req.requested_count = Some(20);
    // The clamp happens before the provider sees the spec; succeed path is
    // enough to prove no panic, and target_count is unit-tested below.
    let outcome = orch.generate_with_chain(req, &["alpha".into()]).await.unwrap();
    assert_eq!(outcome.result.provider_used, "alpha");
  }

  #[test]
  fn derived_count_is_monotonic_and_clamped() {
    let mut last = 0;
    for words in [0, 50, 119, 120, 239, 240, 399, 400, 599, 600, 5000] {
      let c = derived_count(words, GenerationMode::Segment);
      assert!(c >= last, "not monotonic at {words} words");
      assert!((1..=5).contains(&c));
      last = c;
    }
    assert_eq!(derived_count(5000, GenerationMode::Segment), 5);
    assert_eq!(derived_count(5000, GenerationMode::Holistic), 8);
    assert_eq!(derived_count(0, GenerationMode::Holistic), 2);
  }

  #[test]
  fn target_count_respects_pins_and_ceilings() {
    let orch = Orchestrator::new(
      vec![],
      None,
      Arc::new(RecordingStore::default()),
      Arc::new(RecordingNotifier::default()),
      Prompts::default(),
      GenerationSettings::default(),
    );

    let text = long_text();
    let mut req = request(&text);
    req.requested_count = Some(20);
    assert_eq!(orch.target_count(&req, &text), 5);

    req.mode = GenerationMode::Holistic;
    assert_eq!(orch.target_count(&req, &text), 8);

    req.requested_count = Some(0);
    assert_eq!(orch.target_count(&req, &text), 1);

    req.requested_count = None;
    req.mode = GenerationMode::Segment;
    let words = text.split_whitespace().count();
    assert_eq!(orch.target_count(&req, &text), derived_count(words, GenerationMode::Segment));
  }
}
