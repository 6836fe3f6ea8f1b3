use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::interface::{pcm_to_wav, TranscriptionError, Transcriber};

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcriber against an OpenAI-compatible `/audio/transcriptions` endpoint
pub struct WhisperApiTranscriber {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    sample_rate: u32,
}

impl WhisperApiTranscriber {
    pub fn new(base_url: String, api_key: String, model: String, sample_rate: u32) -> Self {
        info!(
            "Initialized WhisperApiTranscriber: base_url={}, model={}",
            base_url, model
        );
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
            sample_rate,
        }
    }
}

#[async_trait]
impl Transcriber for WhisperApiTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError> {
        let wav = pcm_to_wav(audio, self.sample_rate)?;
        let part = Part::bytes(wav)
            .file_name("segment.wav")
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let url = format!("{}/audio/transcriptions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Service(format!(
                "transcription endpoint returned {}: {}",
                status, body
            )));
        }

        let result: WhisperResponse = response.json().await?;
        Ok(result.text)
    }
}
