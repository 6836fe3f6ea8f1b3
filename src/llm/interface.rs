use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;

use crate::session::ConversationTurn;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generation service error: {0}")]
    Service(String),
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Text-generation capability over the conversation history.
///
/// Providers either return one complete response or an incremental chunk
/// sequence; `supports_streaming` tells the caller which shape to expect.
/// Both converge on one complete response text.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        turns: &[ConversationTurn],
        system_prompt: &str,
    ) -> Result<String, GenerationError>;

    /// Incremental variant. The default adapter wraps the complete result
    /// in a single chunk so non-streaming providers satisfy the contract.
    async fn generate_stream(
        &self,
        turns: &[ConversationTurn],
        system_prompt: &str,
    ) -> Result<ChunkStream, GenerationError> {
        let text = self.generate(turns, system_prompt).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(text) })))
    }

    fn supports_streaming(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatMessage {
    pub role: String,
    pub content: String,
}

pub(crate) fn chat_messages(turns: &[ConversationTurn], system_prompt: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    if !system_prompt.is_empty() {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: system_prompt.to_string(),
        });
    }
    for turn in turns {
        messages.push(ChatMessage {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        });
    }
    messages
}
