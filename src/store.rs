//! Persistence boundary: the `QuestionStore` trait plus an in-memory
//! reference implementation.
//!
//! The core only ever reads history and appends new batches through this
//! interface; write-concurrency guarantees (unique ids, durability) live
//! behind it, not inside the core.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::domain::{GeneratedQuestion, HistoricalQuestion, HistoryCategory, Scope};
use crate::error::StoreError;

#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Persist a validated batch for the scope. Idempotent per question id.
    async fn save(&self, scope: &Scope, questions: &[GeneratedQuestion]) -> Result<(), StoreError>;

    /// Most-recent-first history for one source category of the scope.
    async fn find_recent_by_scope(
        &self,
        scope: &Scope,
        category: HistoryCategory,
        limit: usize,
    ) -> Result<Vec<HistoricalQuestion>, StoreError>;
}

struct StoredQuestion {
    id: String,
    question: String,
    answer: String,
    category: HistoryCategory,
    created_at: DateTime<Utc>,
}

/// In-memory store keyed by (room, session). Suitable for single-process
/// deployments and tests; swap for a document-store implementation behind the
/// same trait in production.
#[derive(Default)]
pub struct InMemoryStore {
    by_session: Arc<RwLock<HashMap<String, Vec<StoredQuestion>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn session_key(scope: &Scope) -> String {
        format!("{}:{}", scope.room_id, scope.session_id)
    }

    /// Segment-scoped requests carry a segment id; timer-driven holistic
    /// passes do not.
    fn category_of(scope: &Scope) -> HistoryCategory {
        if scope.segment_id.is_some() {
            HistoryCategory::Segment
        } else {
            HistoryCategory::Timer
        }
    }
}

#[async_trait]
impl QuestionStore for InMemoryStore {
    #[instrument(level = "debug", skip(self, questions), fields(room = %scope.room_id, count = questions.len()))]
    async fn save(&self, scope: &Scope, questions: &[GeneratedQuestion]) -> Result<(), StoreError> {
        let key = Self::session_key(scope);
        let category = Self::category_of(scope);
        let mut map = self.by_session.write().await;
        let entries = map.entry(key).or_default();
        for q in questions {
            if entries.iter().any(|e| e.id == q.id) {
                debug!(target: "question_gen", id = %q.id, "Skipping duplicate question id");
                continue;
            }
            entries.push(StoredQuestion {
                id: q.id.clone(),
                question: q.question.clone(),
                answer: q.correct_answer.clone(),
                category,
                created_at: Utc::now(),
            });
        }
        Ok(())
    }

    #[instrument(level = "debug", skip(self), fields(room = %scope.room_id))]
    async fn find_recent_by_scope(
        &self,
        scope: &Scope,
        category: HistoryCategory,
        limit: usize,
    ) -> Result<Vec<HistoricalQuestion>, StoreError> {
        let key = Self::session_key(scope);
        let map = self.by_session.read().await;
        let Some(entries) = map.get(&key) else {
            return Ok(vec![]);
        };
        // Entries append in chronological order; walk backwards for
        // most-recent-first.
        Ok(entries
            .iter()
            .rev()
            .filter(|e| e.category == category)
            .take(limit)
            .map(|e| HistoricalQuestion {
                question: e.question.clone(),
                answer: e.answer.clone(),
                created_at: e.created_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Difficulty, Provenance, QuestionType};

    fn question(id: &str, text: &str) -> GeneratedQuestion {
        GeneratedQuestion {
            id: id.into(),
            kind: QuestionType::TrueFalse,
            difficulty: Difficulty::Easy,
            question: text.into(),
            options: vec!["True".into(), "False".into()],
            correct_answer: "True".into(),
            correct_index: 0,
            explanation: "stated in the transcript".into(),
            provenance: Provenance {
                provider: "test".into(),
                model: "test-model".into(),
                latency_ms: 1,
                used_fallback: false,
                context_items: 0,
                warnings: vec![],
            },
        }
    }

    fn scope(segment: Option<&str>) -> Scope {
        Scope {
            room_id: "r1".into(),
            session_id: "s1".into(),
            transcript_id: "t1".into(),
            segment_id: segment.map(Into::into),
        }
    }

    #[tokio::test]
    async fn history_is_most_recent_first_and_split_by_category() {
        let store = InMemoryStore::new();
        store
            .save(&scope(Some("seg-1")), &[question("a", "first segment question?")])
            .await
            .unwrap();
        store
            .save(&scope(None), &[question("b", "timer question?")])
            .await
            .unwrap();
        store
            .save(&scope(Some("seg-2")), &[question("c", "second segment question?")])
            .await
            .unwrap();

        let segments = store
            .find_recent_by_scope(&scope(None), HistoryCategory::Segment, 10)
            .await
            .unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].question, "second segment question?");

        let timers = store
            .find_recent_by_scope(&scope(None), HistoryCategory::Timer, 10)
            .await
            .unwrap();
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].question, "timer question?");
    }

    #[tokio::test]
    async fn save_skips_duplicate_ids_and_respects_limit() {
        let store = InMemoryStore::new();
        let sc = scope(Some("seg"));
        store.save(&sc, &[question("dup", "asked once, saved once?")]).await.unwrap();
        store.save(&sc, &[question("dup", "asked once, saved once?")]).await.unwrap();
        store.save(&sc, &[question("x", "another question entirely?")]).await.unwrap();

        let all = store
            .find_recent_by_scope(&sc, HistoryCategory::Segment, 10)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let capped = store
            .find_recent_by_scope(&sc, HistoryCategory::Segment, 1)
            .await
            .unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].question, "another question entirely?");
    }
}
