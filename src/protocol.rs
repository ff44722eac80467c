//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, GenerationMode, GenerationRequest, QuestionType, Scope};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Subscribe {
        #[serde(rename = "roomId")]
        room_id: String,
    },
}

/// Messages the server sends back over WebSocket. Question batches are
/// forwarded verbatim from the notifier channel, so they are not listed here.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Subscribed {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    Error {
        message: String,
    },
}

//
// HTTP request/response DTOs
//

/// Transcript block submitted for question generation.
#[derive(Debug, Deserialize)]
pub struct GenerateIn {
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "transcriptId")]
    pub transcript_id: String,
    #[serde(default, rename = "segmentId")]
    pub segment_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub mode: GenerationMode,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub types: Vec<QuestionType>,
    #[serde(default)]
    pub difficulties: Vec<Difficulty>,
    #[serde(default, rename = "contextLimit")]
    pub context_limit: Option<usize>,
}

impl GenerateIn {
    /// Build the core request; `default_context_limit` comes from config when
    /// the caller does not pin one.
    pub fn into_request(self, default_context_limit: usize) -> GenerationRequest {
        GenerationRequest {
            source_text: self.text,
            scope: Scope {
                room_id: self.room_id,
                session_id: self.session_id,
                transcript_id: self.transcript_id,
                segment_id: self.segment_id,
            },
            mode: self.mode,
            requested_count: self.count,
            allowed_types: self.types,
            allowed_difficulties: self.difficulties,
            context_limit: self.context_limit.unwrap_or(default_context_limit),
        }
    }
}

/// Reply for the fire-and-forget transcript endpoint: generation continues in
/// the background and results arrive on the room channel.
#[derive(Serialize)]
pub struct TranscriptAccepted {
    pub accepted: bool,
    #[serde(rename = "roomId")]
    pub room_id: String,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub providers: Vec<&'static str>,
}
