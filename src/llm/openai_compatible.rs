use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::session::ConversationTurn;

use super::interface::{chat_messages, ChunkStream, GenerationError, Generator};

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// Generator against any OpenAI-compatible chat-completions endpoint
/// (OpenAI, Ollama, vLLM, and the rest of that family).
pub struct OpenAiCompatibleGenerator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    stream: bool,
}

impl OpenAiCompatibleGenerator {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        temperature: f32,
        stream: bool,
    ) -> Self {
        info!(
            "Initialized OpenAiCompatibleGenerator: model={}, base_url={}, stream={}",
            model, base_url, stream
        );
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
            temperature,
            stream,
        }
    }

    async fn post_completion(
        &self,
        turns: &[ConversationTurn],
        system_prompt: &str,
        stream: bool,
    ) -> Result<reqwest::Response, GenerationError> {
        let body = json!({
            "model": self.model,
            "messages": chat_messages(turns, system_prompt),
            "temperature": self.temperature,
            "stream": stream,
        });

        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(GenerationError::Service(format!(
                "chat completions endpoint returned {}: {}",
                status, detail
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl Generator for OpenAiCompatibleGenerator {
    async fn generate(
        &self,
        turns: &[ConversationTurn],
        system_prompt: &str,
    ) -> Result<String, GenerationError> {
        let response = self.post_completion(turns, system_prompt, false).await?;
        let completion: ChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GenerationError::Service("completion returned no choices".to_string()))
    }

    /// Server-sent events: `data: {json}` lines, terminated by `[DONE]`.
    /// Incomplete lines are buffered across network chunks.
    async fn generate_stream(
        &self,
        turns: &[ConversationTurn],
        system_prompt: &str,
    ) -> Result<ChunkStream, GenerationError> {
        let response = self.post_completion(turns, system_prompt, true).await?;

        let stream = response
            .bytes_stream()
            .scan(String::new(), |buffer, chunk| {
                let items: Vec<Result<String, GenerationError>> = match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        let mut out = Vec::new();
                        let mut consumed = 0;
                        for (idx, _) in buffer.match_indices('\n') {
                            let line = buffer[consumed..idx].trim_end_matches('\r');
                            consumed = idx + 1;

                            if let Some(data) = line.strip_prefix("data: ") {
                                if data.trim() == "[DONE]" {
                                    continue;
                                }
                                match serde_json::from_str::<ChatCompletionChunk>(data) {
                                    Ok(parsed) => {
                                        let text = parsed
                                            .choices
                                            .into_iter()
                                            .next()
                                            .and_then(|c| c.delta.content);
                                        if let Some(text) = text {
                                            if !text.is_empty() {
                                                out.push(Ok(text));
                                            }
                                        }
                                    }
                                    Err(e) => {
                                        debug!("skipping unparsable stream line: {}", e);
                                    }
                                }
                            }
                        }
                        *buffer = buffer[consumed..].to_string();
                        out
                    }
                    Err(e) => vec![Err(GenerationError::Http(e))],
                };
                futures::future::ready(Some(items))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }

    fn supports_streaming(&self) -> bool {
        self.stream
    }
}
