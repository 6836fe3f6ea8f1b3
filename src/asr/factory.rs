use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::{AsrConfig, AudioConfig};

use super::interface::Transcriber;
use super::remote::RemoteTranscriber;
use super::whisper_api::WhisperApiTranscriber;

/// Factory for transcription providers
pub struct TranscriberFactory;

impl TranscriberFactory {
    pub fn create(config: &AsrConfig, audio: &AudioConfig) -> Result<Arc<dyn Transcriber>> {
        info!("Initializing transcriber: {}", config.provider);

        match config.provider.as_str() {
            "remote" => Ok(Arc::new(RemoteTranscriber::new(
                config.base_url.clone(),
                audio.sample_rate,
            ))),
            "openai_whisper" => {
                let api_key = config
                    .api_key
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("openai_whisper transcriber requires an api_key"))?;
                Ok(Arc::new(WhisperApiTranscriber::new(
                    config.base_url.clone(),
                    api_key,
                    config
                        .model
                        .clone()
                        .unwrap_or_else(|| "whisper-1".to_string()),
                    audio.sample_rate,
                )))
            }
            other => Err(anyhow::anyhow!("Unsupported transcriber provider: {}", other)),
        }
    }
}
