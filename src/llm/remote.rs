use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::session::ConversationTurn;

use super::interface::{chat_messages, ChatMessage, GenerationError, Generator};

#[derive(Debug, Serialize)]
struct AgentRequest {
    messages: Vec<ChatMessage>,
    system_prompt: String,
}

#[derive(Debug, Deserialize)]
struct AgentResponse {
    text: String,
    success: bool,
    error: Option<String>,
}

/// Generator backed by a sidecar agent service over HTTP. Returns one
/// complete response per call.
pub struct RemoteGenerator {
    client: Client,
    base_url: String,
}

impl RemoteGenerator {
    pub fn new(base_url: String) -> Self {
        info!("Initialized RemoteGenerator: base_url={}", base_url);
        Self {
            client: Client::new(),
            base_url,
        }
    }
}

#[async_trait]
impl Generator for RemoteGenerator {
    async fn generate(
        &self,
        turns: &[ConversationTurn],
        system_prompt: &str,
    ) -> Result<String, GenerationError> {
        let request = AgentRequest {
            messages: chat_messages(turns, ""),
            system_prompt: system_prompt.to_string(),
        };

        let url = format!("{}/agent/chat", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;
        let result: AgentResponse = response.json().await?;

        if !result.success {
            return Err(GenerationError::Service(
                result.error.unwrap_or_else(|| "generation failed".to_string()),
            ));
        }
        Ok(result.text)
    }
}
