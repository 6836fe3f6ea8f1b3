use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::LlmConfig;

use super::interface::Generator;
use super::openai_compatible::OpenAiCompatibleGenerator;
use super::remote::RemoteGenerator;

/// Factory for text-generation providers
pub struct GeneratorFactory;

impl GeneratorFactory {
    pub fn create(config: &LlmConfig) -> Result<Arc<dyn Generator>> {
        info!("Initializing generator: {}", config.provider);

        match config.provider.as_str() {
            "openai_compatible" => Ok(Arc::new(OpenAiCompatibleGenerator::new(
                config.base_url.clone(),
                config.api_key.clone(),
                config.model.clone(),
                config.temperature,
                config.stream,
            ))),
            "remote" => Ok(Arc::new(RemoteGenerator::new(config.base_url.clone()))),
            other => Err(anyhow::anyhow!("Unsupported generator provider: {}", other)),
        }
    }
}
