//! Notification boundary: fire-and-forget publish of question batches to a
//! room-keyed channel, plus the broadcast-backed implementation the WebSocket
//! layer subscribes to.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, instrument};

use crate::domain::QuestionBatchEvent;
use crate::error::NotifyError;

/// Publish failures must never fail the generation call; callers log and move
/// on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, channel: &str, event: &QuestionBatchEvent) -> Result<(), NotifyError>;
}

const CHANNEL_CAPACITY: usize = 32;

/// In-process pub/sub over tokio broadcast channels, one per channel key.
#[derive(Default)]
pub struct BroadcastNotifier {
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a channel, creating it on first use.
    pub async fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        let mut map = self.channels.write().await;
        map.entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    #[instrument(level = "debug", skip(self, event), fields(%channel, questions = event.questions.len()))]
    async fn publish(&self, channel: &str, event: &QuestionBatchEvent) -> Result<(), NotifyError> {
        let payload =
            serde_json::to_string(event).map_err(|e| NotifyError::Serialize(e.to_string()))?;
        let map = self.channels.read().await;
        match map.get(channel) {
            // A send error just means nobody is listening right now.
            Some(tx) => {
                let delivered = tx.send(payload).unwrap_or(0);
                debug!(target: "quizcast_backend", delivered, "Question batch published");
            }
            None => {
                debug!(target: "quizcast_backend", "No subscribers for channel; batch not delivered");
            }
        }
        Ok(())
    }
}
