//! HTTP endpoint handlers. Thin wrappers that forward to the orchestrator.
//! Each handler is instrumented; logs include parameters and basic result info.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{error, info, instrument};

use crate::error::GenerateError;
use crate::protocol::{ErrorOut, GenerateIn, HealthOut, TranscriptAccepted};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<AppState>) -> impl IntoResponse {
  Json(HealthOut { ok: true, providers: state.orchestrator.provider_names() })
}

/// Synchronous generation: blocks until the fallback chain resolves and
/// returns the full outcome (or the aggregated failure).
#[instrument(level = "info", skip(state, body), fields(room = %body.room_id, text_len = body.text.len()))]
pub async fn http_post_generate(
  State(state): State<AppState>,
  Json(body): Json<GenerateIn>,
) -> impl IntoResponse {
  let request = body.into_request(state.config.generation.context_top_k);
  match state.orchestrator.generate_questions(request).await {
    Ok(outcome) => {
      info!(
        target: "question_gen",
        provider = %outcome.result.provider_used,
        questions = outcome.result.questions.len(),
        "HTTP generate served"
      );
      (StatusCode::OK, Json(outcome)).into_response()
    }
    Err(e @ GenerateError::SourceTooShort { .. }) => {
      (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorOut { message: e.to_string() })).into_response()
    }
    Err(e @ GenerateError::ProvidersExhausted(_)) => {
      error!(target: "question_gen", error = %e, "HTTP generate failed");
      (StatusCode::BAD_GATEWAY, Json(ErrorOut { message: e.to_string() })).into_response()
    }
  }
}

/// Fire-and-forget ingestion: kick off generation in the background and
/// return immediately. Results reach clients on the room channel; failures
/// are logged server-side.
#[instrument(level = "info", skip(state, body), fields(room = %body.room_id, text_len = body.text.len()))]
pub async fn http_post_transcript(
  State(state): State<AppState>,
  Json(body): Json<GenerateIn>,
) -> impl IntoResponse {
  let room_id = body.room_id.clone();
  let request = body.into_request(state.config.generation.context_top_k);
  let orchestrator = state.orchestrator.clone();
  tokio::spawn(async move {
    match orchestrator.generate_questions(request).await {
      Ok(outcome) => info!(
        target: "question_gen",
        provider = %outcome.result.provider_used,
        questions = outcome.result.questions.len(),
        persist_error = ?outcome.persist_error,
        "Background generation finished"
      ),
      Err(e) => error!(target: "question_gen", error = %e, "Background generation failed"),
    }
  });

  Json(TranscriptAccepted { accepted: true, room_id })
}
