use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::asr::Transcriber;
use crate::events::{Event, EventSender};
use crate::history_store::HistoryStore;
use crate::llm::Generator;
use crate::session::ConversationTurn;
use crate::tts::Synthesizer;
use crate::turn_taking::should_respond;
use crate::vad::SpeechSegment;

/// Clears the single-flight flag on every exit path, including an abort at
/// an await point.
struct InFlightGuard(Arc<AtomicBool>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One response cycle: transcription, turn-taking decision, generation and
/// synthesis for a single finalized segment, with progress events along the
/// way.
///
/// Runs on its own task so frame ingestion never waits on a backend call.
/// The session dispatches at most one runner at a time; the `in_flight`
/// flag it checks is cleared here when the cycle ends.
pub struct ResponseRunner {
    pub session_id: String,
    pub history: Arc<RwLock<Vec<ConversationTurn>>>,
    pub store: Arc<HistoryStore>,
    pub transcriber: Arc<dyn Transcriber>,
    pub generator: Arc<dyn Generator>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub events: EventSender,
    pub system_prompt: String,
    pub in_flight: Arc<AtomicBool>,
}

impl ResponseRunner {
    pub async fn process_segment(self, segment: SpeechSegment) {
        let _guard = InFlightGuard(self.in_flight.clone());

        info!(
            "transcribing speech segment for {} ({} ms)",
            self.session_id,
            segment.duration_ms()
        );
        let transcript = match self.transcriber.transcribe(segment.bytes()).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                warn!("transcription failed for {}: {}", self.session_id, e);
                let _ = self.events.send(Event::error(
                    "Speech transcription failed",
                    e.to_string(),
                    true,
                ));
                return;
            }
        };

        if transcript.len() < 3 {
            debug!("transcription too short, ignoring: {:?}", transcript);
            return;
        }

        if self
            .events
            .send(Event::TranscriptionFinal {
                text: transcript.clone(),
            })
            .is_err()
        {
            error!("event channel closed for {}", self.session_id);
            return;
        }

        let respond = {
            let history = self.history.read().await;
            should_respond(&transcript, &history)
        };
        if !respond {
            debug!("not responding to {:?}", transcript);
            return;
        }

        self.run_response_cycle(transcript).await;
    }

    async fn run_response_cycle(&self, transcript: String) {
        let user_turn = ConversationTurn::user(transcript);
        self.history.write().await.push(user_turn.clone());

        if self.events.send(Event::ResponseStart).is_err() {
            return;
        }

        let response_text = match self.generate_response().await {
            Some(text) => text,
            // Error already reported, or the transport is gone.
            None => return,
        };

        let assistant_turn = ConversationTurn::assistant(response_text.clone());
        self.history.write().await.push(assistant_turn.clone());

        match self.synthesizer.synthesize(&response_text).await {
            Ok(audio) => {
                let event = Event::ResponseAudio {
                    audio_data: BASE64.encode(&audio.data),
                    format: audio.format,
                };
                if self.events.send(event).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("synthesis failed for {}: {}", self.session_id, e);
                let _ = self
                    .events
                    .send(Event::error("Speech synthesis failed", e.to_string(), true));
                return;
            }
        }

        if self.events.send(Event::ResponseEnd).is_err() {
            return;
        }

        if let Err(e) = self
            .store
            .append(&self.session_id, &[user_turn, assistant_turn])
        {
            warn!("failed to persist history for {}: {}", self.session_id, e);
        }
    }

    /// Drive the generator to one complete response text, emitting
    /// intermediate chunks when the provider streams.
    async fn generate_response(&self) -> Option<String> {
        let turns = self.history.read().await.clone();

        if self.generator.supports_streaming() {
            let mut stream = match self
                .generator
                .generate_stream(&turns, &self.system_prompt)
                .await
            {
                Ok(stream) => stream,
                Err(e) => {
                    self.report_generation_failure(e);
                    return None;
                }
            };

            let mut full_response = String::new();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(text) => {
                        full_response.push_str(&text);
                        let event = Event::ResponseText {
                            text,
                            is_final: false,
                        };
                        if self.events.send(event).is_err() {
                            return None;
                        }
                    }
                    Err(e) => {
                        self.report_generation_failure(e);
                        return None;
                    }
                }
            }

            let event = Event::ResponseText {
                text: full_response.clone(),
                is_final: true,
            };
            if self.events.send(event).is_err() {
                return None;
            }
            Some(full_response)
        } else {
            match self.generator.generate(&turns, &self.system_prompt).await {
                Ok(text) => {
                    let event = Event::ResponseText {
                        text: text.clone(),
                        is_final: true,
                    };
                    if self.events.send(event).is_err() {
                        return None;
                    }
                    Some(text)
                }
                Err(e) => {
                    self.report_generation_failure(e);
                    None
                }
            }
        }
    }

    fn report_generation_failure(&self, e: crate::llm::GenerationError) {
        warn!("generation failed for {}: {}", self.session_id, e);
        let _ = self.events.send(Event::error(
            "Response generation failed",
            e.to_string(),
            true,
        ));
    }
}
