//! Loading generation configuration (prompts + tunables) from TOML, and
//! per-provider endpoint settings from the environment.
//!
//! See `FileConfig` for the TOML schema and `ProviderSettings` for env keys.

use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info};

/// Top-level TOML schema accepted at GEN_CONFIG_PATH.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct FileConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub generation: GenerationSettings,
}

/// Prompts used by the question-generation clients. Defaults are sensible for
/// lecture transcripts; override in TOML to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  pub question_system: String,
  pub question_user_template: String,
  pub context_block_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      question_system: "You are a classroom quiz generator. Given a lecture transcript excerpt, \
        write quiz questions grounded ONLY in what the transcript says. Respond with strict JSON: \
        {\"summary\": string, \"questions\": [{\"type\": \"multiple_choice\"|\"true_false\", \
        \"difficulty\": \"easy\"|\"medium\"|\"hard\", \"question\": string, \"options\": [string], \
        \"correct_answer\": string, \"explanation\": string}]}. Multiple-choice questions need \
        exactly 4 options; true/false questions use options [\"True\", \"False\"]. No markdown, \
        no commentary outside the JSON."
        .into(),
      question_user_template: "Write {count} quiz question(s) from this transcript excerpt.\n\
        Allowed types: {types}. Allowed difficulties: {difficulties}.\n{context_block}\
        Transcript:\n{transcript}"
        .into(),
      context_block_template: "Avoid duplicating these prior questions:\n{items}\n\n".into(),
    }
  }
}

/// Tunables for the orchestration core. All fields have serde defaults so a
/// partial TOML table works.
#[derive(Clone, Debug, Deserialize)]
pub struct GenerationSettings {
  /// Generation is refused below this floor (chars, after trimming).
  #[serde(default = "default_min_source_chars")]
  pub min_source_chars: usize,
  /// Question-count ceiling for short-form segment batches.
  #[serde(default = "default_max_segment_questions")]
  pub max_segment_questions: usize,
  /// Question-count ceiling for long-form holistic passes.
  #[serde(default = "default_max_holistic_questions")]
  pub max_holistic_questions: usize,
  /// Default number of historical context items retrieved per request.
  #[serde(default = "default_context_top_k")]
  pub context_top_k: usize,
  /// Historical window consulted per source category during retrieval.
  #[serde(default = "default_history_limit")]
  pub history_limit: usize,
  /// Provider names tried strictly in order until one succeeds.
  #[serde(default = "default_fallback_chain")]
  pub fallback_chain: Vec<String>,
}

fn default_min_source_chars() -> usize {
  50
}
fn default_max_segment_questions() -> usize {
  5
}
fn default_max_holistic_questions() -> usize {
  8
}
fn default_context_top_k() -> usize {
  5
}
fn default_history_limit() -> usize {
  50
}
fn default_fallback_chain() -> Vec<String> {
  vec!["openai".into(), "groq".into(), "ollama".into()]
}

impl Default for GenerationSettings {
  fn default() -> Self {
    Self {
      min_source_chars: default_min_source_chars(),
      max_segment_questions: default_max_segment_questions(),
      max_holistic_questions: default_max_holistic_questions(),
      context_top_k: default_context_top_k(),
      history_limit: default_history_limit(),
      fallback_chain: default_fallback_chain(),
    }
  }
}

/// Endpoint/credential/model/timeout for one remote service.
#[derive(Clone, Debug)]
pub struct RemoteEndpoint {
  pub base_url: String,
  pub api_key: String,
  pub model: String,
  pub timeout: Duration,
}

/// Per-provider endpoints read from the environment. A provider missing its
/// key is simply absent and gets filtered out of the fallback chain.
#[derive(Clone, Debug, Default)]
pub struct ProviderSettings {
  pub openai: Option<RemoteEndpoint>,
  pub groq: Option<RemoteEndpoint>,
  pub ollama: Option<RemoteEndpoint>,
  pub embeddings: Option<RemoteEndpoint>,
}

fn env_secs(key: &str, default: u64) -> Duration {
  let secs = std::env::var(key)
    .ok()
    .and_then(|v| v.parse::<u64>().ok())
    .unwrap_or(default);
  Duration::from_secs(secs)
}

impl ProviderSettings {
  /// Read provider endpoints from env. Cloud providers require an API key;
  /// the local model only needs OLLAMA_BASE_URL to be set.
  pub fn from_env() -> Self {
    let openai = std::env::var("OPENAI_API_KEY").ok().map(|api_key| RemoteEndpoint {
      base_url: std::env::var("OPENAI_BASE_URL")
        .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
      api_key,
      model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
      timeout: env_secs("OPENAI_TIMEOUT_SECS", 30),
    });

    let groq = std::env::var("GROQ_API_KEY").ok().map(|api_key| RemoteEndpoint {
      base_url: std::env::var("GROQ_BASE_URL")
        .unwrap_or_else(|_| "https://api.groq.com/openai/v1".into()),
      api_key,
      model: std::env::var("GROQ_MODEL").unwrap_or_else(|_| "llama-3.3-70b-versatile".into()),
      timeout: env_secs("GROQ_TIMEOUT_SECS", 15),
    });

    let ollama = std::env::var("OLLAMA_BASE_URL").ok().map(|base_url| RemoteEndpoint {
      base_url,
      api_key: String::new(),
      model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.1".into()),
      // Local models are slow; give them a multi-minute ceiling.
      timeout: env_secs("OLLAMA_TIMEOUT_SECS", 180),
    });

    // Embeddings default to the OpenAI endpoint when its key is present.
    let embeddings = std::env::var("EMBEDDINGS_API_KEY")
      .or_else(|_| std::env::var("OPENAI_API_KEY"))
      .ok()
      .map(|api_key| RemoteEndpoint {
        base_url: std::env::var("EMBEDDINGS_BASE_URL")
          .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
        api_key,
        model: std::env::var("EMBEDDINGS_MODEL")
          .unwrap_or_else(|_| "text-embedding-3-small".into()),
        timeout: env_secs("EMBEDDINGS_TIMEOUT_SECS", 20),
      });

    Self { openai, groq, ollama, embeddings }
  }
}

/// Everything the process needs, assembled once at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
  pub prompts: Prompts,
  pub generation: GenerationSettings,
  pub providers: ProviderSettings,
}

impl AppConfig {
  /// Load TOML config from GEN_CONFIG_PATH (prompts + tunables), then overlay
  /// provider endpoints from the environment. A missing or broken TOML file
  /// falls back to defaults.
  pub fn load() -> Self {
    let file = load_file_config_from_env().unwrap_or_default();
    Self {
      prompts: file.prompts,
      generation: file.generation,
      providers: ProviderSettings::from_env(),
    }
  }
}

/// Attempt to load `FileConfig` from GEN_CONFIG_PATH. On any parsing/IO
/// error, returns None.
pub fn load_file_config_from_env() -> Option<FileConfig> {
  let path = std::env::var("GEN_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<FileConfig>(&s) {
      Ok(cfg) => {
        info!(target: "quizcast_backend", %path, "Loaded generation config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "quizcast_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "quizcast_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partial_toml_keeps_defaults_for_missing_fields() {
    let cfg: FileConfig = toml::from_str(
      r#"
        [generation]
        context_top_k = 3
        fallback_chain = ["groq"]
      "#,
    )
    .expect("parse");
    assert_eq!(cfg.generation.context_top_k, 3);
    assert_eq!(cfg.generation.fallback_chain, vec!["groq".to_string()]);
    assert_eq!(cfg.generation.min_source_chars, 50);
    assert_eq!(cfg.generation.max_segment_questions, 5);
    assert_eq!(cfg.generation.max_holistic_questions, 8);
    assert!(!cfg.prompts.question_system.is_empty());
  }
}
