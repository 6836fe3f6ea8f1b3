use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use uuid::Uuid;

use crate::asr::{Transcriber, TranscriberFactory};
use crate::config::Config;
use crate::history_store::HistoryStore;
use crate::llm::{Generator, GeneratorFactory};
use crate::tts::{Synthesizer, SynthesizerFactory};

/// Backend capabilities, constructed once at startup and shared read-only
/// across sessions. Providers must be safe for concurrent invocation.
pub struct Services {
    pub transcriber: Arc<dyn Transcriber>,
    pub generator: Arc<dyn Generator>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub services: Arc<Services>,
    pub history_store: Arc<HistoryStore>,
    /// In-flight response task per session, aborted on disconnect.
    pub response_tasks: Arc<DashMap<String, tokio::task::AbortHandle>>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let services = Services {
            transcriber: TranscriberFactory::create(&config.providers.asr, &config.audio)?,
            generator: GeneratorFactory::create(&config.providers.llm)?,
            synthesizer: SynthesizerFactory::create(&config.providers.tts)?,
        };
        let history_store = Arc::new(HistoryStore::new(config.agent.history_dir.clone()));

        Ok(Self {
            config,
            services: Arc::new(services),
            history_store,
            response_tasks: Arc::new(DashMap::new()),
        })
    }

    pub fn generate_session_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
