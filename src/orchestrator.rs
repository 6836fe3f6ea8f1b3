use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::events::{parse_inbound, Event, EventSender, InboundMessage, ValidationError};
use crate::history_store::HistoryStore;
use crate::pipeline::ResponseRunner;
use crate::session::ConversationTurn;
use crate::state::{AppState, Services};
use crate::vad::{ClassifierFactory, SpeechSegment, VadSegmenter};

/// Per-session message dispatch: feeds audio frames to the segmenter,
/// handles `reset`/`ping` control actions, and hands finalized segments to
/// the response pipeline under the single-flight guard.
///
/// Owned by the connection's task; all session state is mutated here or in
/// the one pipeline task this dispatches.
pub struct SessionOrchestrator {
    session_id: String,
    events: EventSender,
    segmenter: VadSegmenter,
    history: Arc<RwLock<Vec<ConversationTurn>>>,
    in_flight: Arc<AtomicBool>,
    pending_reset: bool,
    client_speaking: bool,
    services: Arc<Services>,
    store: Arc<HistoryStore>,
    response_tasks: Arc<DashMap<String, tokio::task::AbortHandle>>,
    system_prompt: String,
}

impl SessionOrchestrator {
    pub fn from_state(session_id: String, state: &AppState, events: EventSender) -> Result<Self> {
        let classifier = ClassifierFactory::create(&state.config.vad)?;
        let segmenter = VadSegmenter::new(classifier, &state.config.audio);
        let stored = state.history_store.load(&session_id)?.unwrap_or_default();

        Ok(Self::new(
            session_id,
            segmenter,
            stored,
            state.services.clone(),
            state.history_store.clone(),
            state.response_tasks.clone(),
            state.config.agent.system_prompt.clone(),
            events,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: String,
        segmenter: VadSegmenter,
        initial_history: Vec<ConversationTurn>,
        services: Arc<Services>,
        store: Arc<HistoryStore>,
        response_tasks: Arc<DashMap<String, tokio::task::AbortHandle>>,
        system_prompt: String,
        events: EventSender,
    ) -> Self {
        Self {
            session_id,
            events,
            segmenter,
            history: Arc::new(RwLock::new(initial_history)),
            in_flight: Arc::new(AtomicBool::new(false)),
            pending_reset: false,
            client_speaking: false,
            services,
            store,
            response_tasks,
            system_prompt,
        }
    }

    pub fn history(&self) -> Arc<RwLock<Vec<ConversationTurn>>> {
        self.history.clone()
    }

    pub fn response_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn handle_message(&mut self, text: &str) -> Result<()> {
        // A queued reset is applied as soon as the pipeline is idle again.
        if self.pending_reset && !self.response_in_flight() {
            self.apply_reset().await?;
        }

        match parse_inbound(text) {
            Ok(InboundMessage::Audio(frame)) => self.handle_frame(&frame)?,
            Ok(InboundMessage::Reset) => self.handle_reset().await?,
            Ok(InboundMessage::Ping) => self.events.send(Event::status("pong"))?,
            Err(ValidationError::Json(e)) => {
                warn!("ignoring unparseable message from {}: {}", self.session_id, e);
            }
            Err(e) => {
                warn!("rejecting invalid message from {}: {}", self.session_id, e);
                self.events
                    .send(Event::status(format!("unrecognized message: {}", e)))?;
            }
        }

        Ok(())
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Result<()> {
        let (is_speaking, segment) = self.segmenter.process_frame(frame);

        if is_speaking && !self.client_speaking {
            self.events.send(Event::SpeechStart)?;
        }
        self.client_speaking = is_speaking;

        if let Some(segment) = segment {
            self.events.send(Event::SpeechEnd)?;
            self.dispatch_segment(segment);
        }

        Ok(())
    }

    /// Single-flight: a segment finalized while a response is still being
    /// produced is dropped, never queued.
    fn dispatch_segment(&mut self, segment: SpeechSegment) {
        if self.in_flight.load(Ordering::Acquire) {
            debug!(
                "response in flight for {}, dropping {} ms segment",
                self.session_id,
                segment.duration_ms()
            );
            return;
        }
        self.in_flight.store(true, Ordering::Release);

        let runner = ResponseRunner {
            session_id: self.session_id.clone(),
            history: self.history.clone(),
            store: self.store.clone(),
            transcriber: self.services.transcriber.clone(),
            generator: self.services.generator.clone(),
            synthesizer: self.services.synthesizer.clone(),
            events: self.events.clone(),
            system_prompt: self.system_prompt.clone(),
            in_flight: self.in_flight.clone(),
        };
        let handle = tokio::spawn(runner.process_segment(segment));
        self.response_tasks
            .insert(self.session_id.clone(), handle.abort_handle());
    }

    async fn handle_reset(&mut self) -> Result<()> {
        if self.response_in_flight() {
            // Never interrupts a response mid-flight; applied once idle.
            info!(
                "reset requested for {} while a response is in flight, queuing",
                self.session_id
            );
            self.pending_reset = true;
            self.events.send(Event::status("reset queued"))?;
            return Ok(());
        }
        self.apply_reset().await
    }

    async fn apply_reset(&mut self) -> Result<()> {
        self.history.write().await.clear();
        self.segmenter.reset();
        self.client_speaking = false;
        self.pending_reset = false;
        if let Err(e) = self.store.clear(&self.session_id) {
            warn!(
                "failed to clear stored history for {}: {}",
                self.session_id, e
            );
        }
        info!("conversation reset for {}", self.session_id);
        self.events.send(Event::status("conversation reset"))?;
        Ok(())
    }
}
