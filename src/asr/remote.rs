use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::interface::{pcm_to_wav, TranscriptionError, Transcriber};

#[derive(Debug, Serialize)]
struct TranscribeRequest {
    audio_data: String,
    sample_rate: u32,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    text: String,
    success: bool,
    error: Option<String>,
}

/// Transcriber backed by a sidecar ASR service over HTTP
pub struct RemoteTranscriber {
    client: Client,
    base_url: String,
    sample_rate: u32,
}

impl RemoteTranscriber {
    pub fn new(base_url: String, sample_rate: u32) -> Self {
        info!("Initialized RemoteTranscriber: base_url={}", base_url);
        Self {
            client: Client::new(),
            base_url,
            sample_rate,
        }
    }
}

#[async_trait]
impl Transcriber for RemoteTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError> {
        let wav = pcm_to_wav(audio, self.sample_rate)?;
        let request = TranscribeRequest {
            audio_data: BASE64.encode(wav),
            sample_rate: self.sample_rate,
        };

        let url = format!("{}/asr/transcribe", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;
        let result: TranscribeResponse = response.json().await?;

        if !result.success {
            return Err(TranscriptionError::Service(
                result.error.unwrap_or_else(|| "transcription failed".to_string()),
            ));
        }
        Ok(result.text)
    }
}
