use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("synthesis request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("synthesis service error: {0}")]
    Service(String),
    #[error("synthesis service returned invalid audio: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Synthesized speech: raw audio bytes plus the container format the
/// backend produced ("mp3", "wav", ...).
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub data: Vec<u8>,
    pub format: String,
}

/// Text-to-speech capability over one complete response text
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError>;
}
