//! Application state: provider clients, retrieval, orchestrator, and the
//! persistence/notification boundaries, wired together once at startup.
//!
//! Everything is constructed here and passed by handle; there is no lazily
//! initialized global. That keeps the fallback chain configurable per call
//! and lets tests assemble the same pieces with fakes.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::context::ContextRetriever;
use crate::embedding::RemoteEmbedder;
use crate::notify::BroadcastNotifier;
use crate::orchestrator::Orchestrator;
use crate::providers::builtin::PlaceholderProvider;
use crate::providers::groq::GroqProvider;
use crate::providers::ollama::OllamaProvider;
use crate::providers::openai::OpenAiProvider;
use crate::providers::QuestionProvider;
use crate::store::{InMemoryStore, QuestionStore};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub notifier: Arc<BroadcastNotifier>,
}

impl AppState {
    /// Build state from config: construct each configured provider client,
    /// the embedding-backed context retriever, the store and notifier, and
    /// hand them all to one orchestrator.
    #[instrument(level = "info", skip_all)]
    pub fn from_config(mut config: AppConfig) -> Result<Self, String> {
        let store: Arc<dyn QuestionStore> = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(BroadcastNotifier::new());

        let mut providers: Vec<Arc<dyn QuestionProvider>> = Vec::new();
        if let Some(cfg) = &config.providers.openai {
            providers.push(Arc::new(OpenAiProvider::new(cfg)?));
            info!(target: "quizcast_backend", model = %cfg.model, "OpenAI provider enabled");
        }
        if let Some(cfg) = &config.providers.groq {
            providers.push(Arc::new(GroqProvider::new(cfg)?));
            info!(target: "quizcast_backend", model = %cfg.model, "Groq provider enabled");
        }
        if let Some(cfg) = &config.providers.ollama {
            providers.push(Arc::new(OllamaProvider::new(cfg)?));
            info!(target: "quizcast_backend", model = %cfg.model, base_url = %cfg.base_url, "Ollama provider enabled");
        }

        // Drop chain entries that have no constructed client ("builtin" is
        // always constructible).
        let available: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        let chain: Vec<String> = config
            .generation
            .fallback_chain
            .iter()
            .filter(|name| {
                let ok = available.contains(&name.as_str()) || name.as_str() == "builtin";
                if !ok {
                    warn!(target: "quizcast_backend", provider = %name, "Dropping unconfigured provider from fallback chain");
                }
                ok
            })
            .cloned()
            .collect();
        let mut chain = chain;

        if chain.iter().any(|n| n == "builtin") {
            providers.push(Arc::new(PlaceholderProvider));
        } else if chain.is_empty() {
            // No remote provider configured at all: serve deterministic
            // placeholders rather than a dead endpoint. Their provenance is
            // flagged as degraded.
            warn!(target: "quizcast_backend", "No providers configured; falling back to the builtin placeholder generator");
            providers.push(Arc::new(PlaceholderProvider));
            chain = vec!["builtin".to_string()];
        }
        config.generation.fallback_chain = chain;

        let retriever = match &config.providers.embeddings {
            Some(cfg) => {
                info!(target: "quizcast_backend", model = %cfg.model, "Context retrieval enabled");
                Some(ContextRetriever::new(
                    Arc::new(RemoteEmbedder::new(cfg)?),
                    store.clone(),
                    config.generation.history_limit,
                ))
            }
            None => {
                info!(target: "quizcast_backend", "No embeddings endpoint; generation will run without historical context");
                None
            }
        };

        let orchestrator = Arc::new(Orchestrator::new(
            providers,
            retriever,
            store,
            notifier.clone(),
            config.prompts.clone(),
            config.generation.clone(),
        ));

        info!(
            target: "quizcast_backend",
            chain = ?config.generation.fallback_chain,
            "Generation orchestrator ready"
        );

        Ok(Self { config, orchestrator, notifier })
    }
}
