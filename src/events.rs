use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;

/// Outbound events streamed to the remote peer. Ordering within one
/// response cycle is load-bearing:
/// `response_start -> response_text* -> response_audio? -> response_end`,
/// truncated by `error` on failure.
#[derive(Debug, Clone)]
pub enum Event {
    SpeechStart,
    SpeechEnd,
    TranscriptionFinal {
        text: String,
    },
    ResponseStart,
    ResponseText {
        text: String,
        is_final: bool,
    },
    ResponseAudio {
        audio_data: String,
        format: String,
    },
    ResponseEnd,
    Error {
        error: String,
        detail: String,
        recoverable: bool,
    },
    Status {
        message: String,
    },
}

impl Event {
    pub fn error(error: impl Into<String>, detail: impl Into<String>, recoverable: bool) -> Self {
        Event::Error {
            error: error.into(),
            detail: detail.into(),
            recoverable,
        }
    }

    pub fn status(message: impl Into<String>) -> Self {
        Event::Status {
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::SpeechStart => "speech_start",
            Event::SpeechEnd => "speech_end",
            Event::TranscriptionFinal { .. } => "transcription_final",
            Event::ResponseStart => "response_start",
            Event::ResponseText { .. } => "response_text",
            Event::ResponseAudio { .. } => "response_audio",
            Event::ResponseEnd => "response_end",
            Event::Error { .. } => "error",
            Event::Status { .. } => "status",
        }
    }

    fn data(&self) -> Value {
        match self {
            Event::SpeechStart | Event::SpeechEnd | Event::ResponseStart | Event::ResponseEnd => {
                json!({})
            }
            Event::TranscriptionFinal { text } => json!({
                "text": text,
                "is_final": true
            }),
            Event::ResponseText { text, is_final } => json!({
                "text": text,
                "is_final": is_final
            }),
            Event::ResponseAudio { audio_data, format } => json!({
                "audio_data": audio_data,
                "format": format
            }),
            Event::Error {
                error,
                detail,
                recoverable,
            } => json!({
                "error": error,
                "detail": detail,
                "recoverable": recoverable
            }),
            Event::Status { message } => json!({
                "message": message
            }),
        }
    }
}

/// The session's event channel failed; the connection is unusable.
#[derive(Debug, Error)]
#[error("event channel closed")]
pub struct TransportError;

/// Session-scoped sender half of the event channel. Cheap to clone; every
/// clone feeds the same ordered outbound queue.
#[derive(Clone)]
pub struct EventSender {
    session_id: String,
    tx: mpsc::UnboundedSender<String>,
}

impl EventSender {
    pub fn new(session_id: impl Into<String>, tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            session_id: session_id.into(),
            tx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn send(&self, event: Event) -> Result<(), TransportError> {
        let payload = json!({
            "event": event.name(),
            "session_id": self.session_id,
            "data": event.data(),
        })
        .to_string();
        self.tx.send(payload).map_err(|_| TransportError)
    }
}

/// Messages the remote peer may send on the stream.
#[derive(Debug)]
pub enum InboundMessage {
    /// One base64-decoded PCM frame.
    Audio(Vec<u8>),
    Reset,
    Ping,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64 audio payload: {0}")]
    Audio(#[from] base64::DecodeError),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("unrecognized message shape")]
    UnknownShape,
}

pub fn parse_inbound(text: &str) -> Result<InboundMessage, ValidationError> {
    let value: Value = serde_json::from_str(text)?;

    if let Some(audio) = value.get("audio_data").and_then(|v| v.as_str()) {
        return Ok(InboundMessage::Audio(BASE64.decode(audio)?));
    }

    match value.get("action").and_then(|v| v.as_str()) {
        Some("reset") => Ok(InboundMessage::Reset),
        Some("ping") => Ok(InboundMessage::Ping),
        Some(other) => Err(ValidationError::UnknownAction(other.to_string())),
        None => Err(ValidationError::UnknownShape),
    }
}
