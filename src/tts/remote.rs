use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::interface::{SynthesisError, SynthesizedAudio, Synthesizer};

#[derive(Debug, Serialize)]
struct SynthesizeRequest {
    text: String,
    voice: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    audio_data: Option<String>,
    format: Option<String>,
    success: bool,
    error: Option<String>,
}

/// Synthesizer backed by a sidecar TTS service over HTTP
pub struct RemoteSynthesizer {
    client: Client,
    base_url: String,
    voice: Option<String>,
    language: Option<String>,
}

impl RemoteSynthesizer {
    pub fn new(base_url: String, voice: Option<String>, language: Option<String>) -> Self {
        info!("Initialized RemoteSynthesizer: base_url={}", base_url);
        Self {
            client: Client::new(),
            base_url,
            voice,
            language,
        }
    }
}

#[async_trait]
impl Synthesizer for RemoteSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        let request = SynthesizeRequest {
            text: text.to_string(),
            voice: self.voice.clone(),
            language: self.language.clone(),
        };

        let url = format!("{}/tts/synthesize", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;
        let result: SynthesizeResponse = response.json().await?;

        if !result.success {
            return Err(SynthesisError::Service(
                result.error.unwrap_or_else(|| "synthesis failed".to_string()),
            ));
        }
        let audio = result
            .audio_data
            .ok_or_else(|| SynthesisError::Service("synthesis returned no audio".to_string()))?;

        Ok(SynthesizedAudio {
            data: BASE64.decode(audio)?,
            format: result.format.unwrap_or_else(|| "mp3".to_string()),
        })
    }
}
