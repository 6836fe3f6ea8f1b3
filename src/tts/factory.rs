use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::TtsConfig;

use super::interface::Synthesizer;
use super::remote::RemoteSynthesizer;

/// Factory for speech-synthesis providers
pub struct SynthesizerFactory;

impl SynthesizerFactory {
    pub fn create(config: &TtsConfig) -> Result<Arc<dyn Synthesizer>> {
        info!("Initializing synthesizer: {}", config.provider);

        match config.provider.as_str() {
            "remote" => Ok(Arc::new(RemoteSynthesizer::new(
                config.base_url.clone(),
                config.voice.clone(),
                config.language.clone(),
            ))),
            other => Err(anyhow::anyhow!("Unsupported synthesizer provider: {}", other)),
        }
    }
}
