//! Context retrieval: rank historical questions against new transcript text
//! so providers can be told what not to repeat.
//!
//! Context is an enhancement, not a dependency. Every failure path here
//! degrades to an empty context and generation proceeds without it.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::domain::{ContextItem, HistoricalQuestion, HistoryCategory, Scope};
use crate::embedding::{cosine_similarity, Embedder};
use crate::store::QuestionStore;

pub struct ContextRetriever {
  embedder: Arc<dyn Embedder>,
  store: Arc<dyn QuestionStore>,
  /// Historical window consulted per source category.
  history_limit: usize,
}

impl ContextRetriever {
  pub fn new(
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn QuestionStore>,
    history_limit: usize,
  ) -> Self {
    Self { embedder, store, history_limit }
  }

  /// Top-K historical Q/A pairs most relevant to `source_text`, best first.
  /// Ties keep recency order. Empty history and embedding failures both yield
  /// an empty sequence.
  #[instrument(level = "info", skip(self, source_text), fields(room = %scope.room_id))]
  pub async fn retrieve_context(
    &self,
    source_text: &str,
    scope: &Scope,
    top_k: usize,
  ) -> Vec<ContextItem> {
    if top_k == 0 {
      return vec![];
    }

    let history = self.load_history(scope).await;
    if history.is_empty() {
      return vec![];
    }

    let docs: Vec<String> = history.iter().map(HistoricalQuestion::as_context_text).collect();
    let mut inputs = Vec::with_capacity(docs.len() + 1);
    inputs.push(source_text.to_string());
    inputs.extend(docs.iter().cloned());

    let vectors = match self.embedder.embed_batch(&inputs).await {
      Ok(v) => v,
      Err(e) => {
        warn!(target: "question_gen", error = %e, "Embedding failed; proceeding without context");
        return vec![];
      }
    };
    let Some((query, doc_vectors)) = vectors.split_first() else {
      return vec![];
    };

    let mut scored: Vec<ContextItem> = doc_vectors
      .iter()
      .zip(docs)
      .map(|(vec, text)| ContextItem {
        text,
        score: cosine_similarity(query, vec).clamp(0.0, 1.0),
      })
      .collect();

    // Stable sort: equal scores keep the most-recent-first input order.
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_k);
    scored
  }

  /// Pool the segment-origin and timer-origin histories for the scope,
  /// most-recent-first. A store failure degrades to empty history.
  async fn load_history(&self, scope: &Scope) -> Vec<HistoricalQuestion> {
    let mut pooled = Vec::new();
    for category in [HistoryCategory::Segment, HistoryCategory::Timer] {
      match self
        .store
        .find_recent_by_scope(scope, category, self.history_limit)
        .await
      {
        Ok(items) => pooled.extend(items),
        Err(e) => {
          warn!(target: "question_gen", error = %e, ?category, "History lookup failed");
        }
      }
    }
    pooled.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    pooled
  }
}
