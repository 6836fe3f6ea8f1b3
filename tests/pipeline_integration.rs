//! Integration tests for the streaming conversation flow: segmentation,
//! turn-taking, the single-flight response pipeline and its events.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use voiceloop_backend::asr::{TranscriptionError, Transcriber};
use voiceloop_backend::config::AudioConfig;
use voiceloop_backend::events::EventSender;
use voiceloop_backend::history_store::HistoryStore;
use voiceloop_backend::llm::{ChunkStream, GenerationError, Generator};
use voiceloop_backend::orchestrator::SessionOrchestrator;
use voiceloop_backend::session::ConversationTurn;
use voiceloop_backend::state::Services;
use voiceloop_backend::tts::{SynthesisError, SynthesizedAudio, Synthesizer};
use voiceloop_backend::vad::{ClassificationError, SpeechClassifier, VadSegmenter};

/// Replays a fixed classification script, then reports silence forever.
struct ScriptedClassifier {
    script: Vec<bool>,
    position: usize,
}

impl ScriptedClassifier {
    fn new(script: Vec<bool>) -> Self {
        Self {
            script,
            position: 0,
        }
    }
}

impl SpeechClassifier for ScriptedClassifier {
    fn is_speech(&mut self, _frame: &[u8], _sample_rate: u32) -> Result<bool, ClassificationError> {
        let value = self.script.get(self.position).copied().unwrap_or(false);
        self.position += 1;
        Ok(value)
    }

    fn reset(&mut self) {
        self.position = 0;
    }
}

struct FakeTranscriber {
    text: String,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String, TranscriptionError> {
        Ok(self.text.clone())
    }
}

struct SlowGenerator {
    reply: String,
    delay: Duration,
}

#[async_trait]
impl Generator for SlowGenerator {
    async fn generate(
        &self,
        _turns: &[ConversationTurn],
        _system_prompt: &str,
    ) -> Result<String, GenerationError> {
        sleep(self.delay).await;
        Ok(self.reply.clone())
    }
}

struct StreamingGenerator {
    chunks: Vec<String>,
}

#[async_trait]
impl Generator for StreamingGenerator {
    async fn generate(
        &self,
        _turns: &[ConversationTurn],
        _system_prompt: &str,
    ) -> Result<String, GenerationError> {
        Ok(self.chunks.concat())
    }

    async fn generate_stream(
        &self,
        _turns: &[ConversationTurn],
        _system_prompt: &str,
    ) -> Result<ChunkStream, GenerationError> {
        let chunks = self.chunks.clone();
        Ok(Box::pin(futures::stream::iter(
            chunks.into_iter().map(Ok),
        )))
    }

    fn supports_streaming(&self) -> bool {
        true
    }
}

struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(
        &self,
        _turns: &[ConversationTurn],
        _system_prompt: &str,
    ) -> Result<String, GenerationError> {
        Err(GenerationError::Service("model exploded".to_string()))
    }
}

struct FakeSynthesizer {
    delay: Duration,
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        sleep(self.delay).await;
        Ok(SynthesizedAudio {
            data: vec![1, 2, 3, 4],
            format: "wav".to_string(),
        })
    }
}

struct Harness {
    orchestrator: SessionOrchestrator,
    rx: mpsc::UnboundedReceiver<String>,
    store: Arc<HistoryStore>,
    audio: AudioConfig,
}

fn harness(
    classifier_script: Vec<bool>,
    transcript: &str,
    generator: Arc<dyn Generator>,
    synthesizer: Arc<dyn Synthesizer>,
) -> Harness {
    let audio = AudioConfig::default();
    let segmenter = VadSegmenter::new(Box::new(ScriptedClassifier::new(classifier_script)), &audio);

    let store = Arc::new(HistoryStore::new(
        std::env::temp_dir().join(format!("voiceloop-test-{}", uuid::Uuid::new_v4())),
    ));
    let services = Arc::new(Services {
        transcriber: Arc::new(FakeTranscriber {
            text: transcript.to_string(),
        }),
        generator,
        synthesizer,
    });

    let (tx, rx) = mpsc::unbounded_channel();
    let events = EventSender::new("test-session", tx);
    let orchestrator = SessionOrchestrator::new(
        "test-session".to_string(),
        segmenter,
        Vec::new(),
        services,
        store.clone(),
        Arc::new(DashMap::new()),
        "be helpful".to_string(),
        events,
    );

    Harness {
        orchestrator,
        rx,
        store,
        audio,
    }
}

fn audio_message(audio: &AudioConfig, fill: u8) -> String {
    let frame = vec![fill; audio.frame_bytes()];
    json!({ "audio_data": BASE64.encode(frame) }).to_string()
}

impl Harness {
    /// Feed one complete utterance: 10 speech frames, then enough silence
    /// to cross the padding threshold.
    async fn feed_utterance(&mut self) {
        for i in 0..20u8 {
            let msg = audio_message(&self.audio, i);
            self.orchestrator.handle_message(&msg).await.unwrap();
        }
    }

    async fn next_event(&mut self) -> Value {
        let payload = timeout(Duration::from_secs(2), self.rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        serde_json::from_str(&payload).unwrap()
    }

    /// Collect events (inclusive) until one with the given name arrives.
    async fn events_until(&mut self, name: &str) -> Vec<Value> {
        let mut events = Vec::new();
        loop {
            let event = self.next_event().await;
            let done = event["event"] == name;
            events.push(event);
            if done {
                return events;
            }
        }
    }

    async fn wait_until_idle(&mut self) {
        for _ in 0..200 {
            if !self.orchestrator.response_in_flight() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("pipeline never returned to idle");
    }

    fn drain(&mut self) -> Vec<Value> {
        let mut events = Vec::new();
        while let Ok(payload) = self.rx.try_recv() {
            events.push(serde_json::from_str(&payload).unwrap());
        }
        events
    }
}

fn names(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .map(|e| e["event"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn one_utterance_produces_an_ordered_response_cycle() {
    let generator = Arc::new(StreamingGenerator {
        chunks: vec!["I'm ".to_string(), "doing ".to_string(), "well!".to_string()],
    });
    let synthesizer = Arc::new(FakeSynthesizer {
        delay: Duration::from_millis(5),
    });
    let mut h = harness(
        [vec![true; 10], vec![false; 10]].concat(),
        "How are you doing today?",
        generator,
        synthesizer,
    );

    h.feed_utterance().await;
    let events = h.events_until("response_end").await;
    let names = names(&events);

    // Segmentation markers come first, exactly once each.
    assert_eq!(names[0], "speech_start");
    assert_eq!(names.iter().filter(|n| *n == "speech_start").count(), 1);
    assert_eq!(names.iter().filter(|n| *n == "speech_end").count(), 1);

    // The response cycle is strictly ordered.
    let cycle: Vec<&String> = names
        .iter()
        .filter(|n| {
            matches!(
                n.as_str(),
                "transcription_final"
                    | "response_start"
                    | "response_text"
                    | "response_audio"
                    | "response_end"
            )
        })
        .collect();
    assert_eq!(
        cycle,
        vec![
            "transcription_final",
            "response_start",
            "response_text",
            "response_text",
            "response_text",
            "response_text",
            "response_audio",
            "response_end",
        ]
    );

    // Streamed chunks are partial; the last response_text is the complete
    // response.
    let texts: Vec<&Value> = events
        .iter()
        .filter(|e| e["event"] == "response_text")
        .collect();
    assert_eq!(texts[0]["data"]["is_final"], false);
    let last = texts.last().unwrap();
    assert_eq!(last["data"]["is_final"], true);
    assert_eq!(last["data"]["text"], "I'm doing well!");

    let audio_event = events
        .iter()
        .find(|e| e["event"] == "response_audio")
        .unwrap();
    assert_eq!(audio_event["data"]["format"], "wav");
    assert_eq!(
        audio_event["data"]["audio_data"],
        BASE64.encode([1u8, 2, 3, 4])
    );

    // Both turns recorded in memory and in the store.
    h.wait_until_idle().await;
    let history = h.orchestrator.history();
    let turns = history.read().await;
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].content, "How are you doing today?");
    assert_eq!(turns[1].content, "I'm doing well!");
    let stored = h.store.load("test-session").unwrap().unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn second_segment_during_response_is_dropped() {
    let generator = Arc::new(SlowGenerator {
        reply: "let me think about that".to_string(),
        delay: Duration::from_millis(500),
    });
    let synthesizer = Arc::new(FakeSynthesizer {
        delay: Duration::from_millis(5),
    });
    // Two complete utterances, back to back, faster than the pipeline.
    let script = [vec![true; 10], vec![false; 10], vec![true; 10], vec![false; 10]].concat();
    let mut h = harness(script, "can you help me with this?", generator, synthesizer);

    h.feed_utterance().await;
    h.feed_utterance().await;

    let events = h.events_until("response_end").await;
    h.wait_until_idle().await;
    let names = names(&events);

    assert_eq!(names.iter().filter(|n| *n == "speech_end").count(), 2);
    // The second segment never reached the pipeline.
    assert_eq!(
        names.iter().filter(|n| *n == "transcription_final").count(),
        1
    );
    assert_eq!(names.iter().filter(|n| *n == "response_start").count(), 1);
    assert_eq!(names.iter().filter(|n| *n == "response_end").count(), 1);
}

#[tokio::test]
async fn generation_failure_is_recoverable() {
    let generator = Arc::new(FailingGenerator);
    let synthesizer = Arc::new(FakeSynthesizer {
        delay: Duration::from_millis(5),
    });
    let script = [vec![true; 10], vec![false; 10], vec![true; 10], vec![false; 10]].concat();
    let mut h = harness(script, "can you help me with this?", generator, synthesizer);

    h.feed_utterance().await;
    let events = h.events_until("error").await;
    let error = events.last().unwrap();
    assert_eq!(error["data"]["error"], "Response generation failed");
    assert_eq!(error["data"]["recoverable"], true);
    assert!(!names(&events).contains(&"response_end".to_string()));

    // The pipeline returned to idle; the session accepts another segment.
    h.wait_until_idle().await;
    h.feed_utterance().await;
    let events = h.events_until("error").await;
    assert_eq!(
        events.last().unwrap()["data"]["error"],
        "Response generation failed"
    );
}

#[tokio::test]
async fn reset_during_synthesis_is_deferred_until_idle() {
    let generator = Arc::new(SlowGenerator {
        reply: "a considered reply".to_string(),
        delay: Duration::from_millis(50),
    });
    let synthesizer = Arc::new(FakeSynthesizer {
        delay: Duration::from_millis(400),
    });
    let mut h = harness(
        [vec![true; 10], vec![false; 10]].concat(),
        "can you help me with this?",
        generator,
        synthesizer,
    );

    h.feed_utterance().await;
    h.events_until("response_start").await;

    // The pipeline is still working; the reset must not interrupt it.
    h.orchestrator
        .handle_message("{\"action\":\"reset\"}")
        .await
        .unwrap();
    let events = h.events_until("status").await;
    assert_eq!(
        events.last().unwrap()["data"]["message"],
        "reset queued"
    );

    // The cycle completes untouched.
    let events = h.events_until("response_end").await;
    assert!(names(&events).contains(&"response_audio".to_string()));
    h.wait_until_idle().await;

    // The queued reset is applied on the next message, before the ping.
    h.orchestrator
        .handle_message("{\"action\":\"ping\"}")
        .await
        .unwrap();
    let reset_status = h.next_event().await;
    assert_eq!(reset_status["data"]["message"], "conversation reset");
    let pong = h.next_event().await;
    assert_eq!(pong["data"]["message"], "pong");

    // Post-reset state is pristine.
    let history = h.orchestrator.history();
    assert!(history.read().await.is_empty());
    assert_eq!(h.store.load("test-session").unwrap().unwrap().len(), 0);
}

#[tokio::test]
async fn reset_while_idle_applies_immediately() {
    let generator = Arc::new(SlowGenerator {
        reply: "ok".to_string(),
        delay: Duration::from_millis(1),
    });
    let synthesizer = Arc::new(FakeSynthesizer {
        delay: Duration::from_millis(1),
    });
    let mut h = harness(vec![], "unused", generator, synthesizer);

    h.orchestrator
        .handle_message("{\"action\":\"reset\"}")
        .await
        .unwrap();
    let event = h.next_event().await;
    assert_eq!(event["data"]["message"], "conversation reset");
}

#[tokio::test]
async fn gate_decline_emits_transcription_but_no_response() {
    let generator = Arc::new(SlowGenerator {
        reply: "should never be asked".to_string(),
        delay: Duration::from_millis(1),
    });
    let synthesizer = Arc::new(FakeSynthesizer {
        delay: Duration::from_millis(1),
    });
    let mut h = harness(
        [vec![true; 10], vec![false; 10]].concat(),
        "fine thanks",
        generator,
        synthesizer,
    );

    h.feed_utterance().await;
    h.events_until("transcription_final").await;
    h.wait_until_idle().await;

    let leftover = names(&h.drain());
    assert!(!leftover.contains(&"response_start".to_string()));
}

#[tokio::test]
async fn too_short_transcripts_are_ignored() {
    let generator = Arc::new(SlowGenerator {
        reply: "should never be asked".to_string(),
        delay: Duration::from_millis(1),
    });
    let synthesizer = Arc::new(FakeSynthesizer {
        delay: Duration::from_millis(1),
    });
    let mut h = harness(
        [vec![true; 10], vec![false; 10]].concat(),
        "hm",
        generator,
        synthesizer,
    );

    h.feed_utterance().await;
    h.events_until("speech_end").await;
    h.wait_until_idle().await;

    let leftover = names(&h.drain());
    assert!(!leftover.contains(&"transcription_final".to_string()));
    assert!(!leftover.contains(&"response_start".to_string()));
}

#[tokio::test]
async fn ping_answers_pong_without_state_change() {
    let generator = Arc::new(SlowGenerator {
        reply: "ok".to_string(),
        delay: Duration::from_millis(1),
    });
    let synthesizer = Arc::new(FakeSynthesizer {
        delay: Duration::from_millis(1),
    });
    let mut h = harness(vec![], "unused", generator, synthesizer);

    h.orchestrator
        .handle_message("{\"action\":\"ping\"}")
        .await
        .unwrap();
    let event = h.next_event().await;
    assert_eq!(event["event"], "status");
    assert_eq!(event["data"]["message"], "pong");
    assert!(!h.orchestrator.response_in_flight());
}
