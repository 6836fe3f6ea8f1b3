use tracing::{debug, warn};

use crate::config::AudioConfig;

use super::classifier::SpeechClassifier;

/// One utterance: the buffered speech frames plus the trailing silence
/// padding, concatenated in arrival order. Immutable once emitted.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    bytes: Vec<u8>,
    duration_ms: u64,
}

impl SpeechSegment {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }
}

/// Per-session state machine turning classified PCM frames into discrete
/// speech segments.
///
/// Silence frames after speech are kept as hangover padding; the segment is
/// closed once the silence run reaches `padding_duration_ms`, and discarded
/// if the buffered audio is shorter than `min_speech_duration_ms`.
pub struct VadSegmenter {
    classifier: Box<dyn SpeechClassifier>,
    sample_rate: u32,
    frame_duration_ms: u64,
    frame_bytes: usize,
    padding_frames: usize,
    min_speech_duration_ms: u64,
    in_speech: bool,
    buffer: Vec<Vec<u8>>,
    silence_run: usize,
}

impl VadSegmenter {
    pub fn new(classifier: Box<dyn SpeechClassifier>, audio: &AudioConfig) -> Self {
        Self {
            classifier,
            sample_rate: audio.sample_rate,
            frame_duration_ms: audio.frame_duration_ms,
            frame_bytes: audio.frame_bytes(),
            padding_frames: (audio.padding_duration_ms / audio.frame_duration_ms).max(1) as usize,
            min_speech_duration_ms: audio.min_speech_duration_ms,
            in_speech: false,
            buffer: Vec::new(),
            silence_run: 0,
        }
    }

    /// Feed one frame. Returns whether this frame was classified as speech,
    /// and the completed segment when this frame closed one.
    pub fn process_frame(&mut self, frame: &[u8]) -> (bool, Option<SpeechSegment>) {
        if self.classify(frame) {
            self.buffer.push(frame.to_vec());
            self.silence_run = 0;
            if !self.in_speech {
                self.in_speech = true;
                debug!("speech started");
            }
            return (true, None);
        }

        if self.in_speech {
            // Trailing silence is kept so the segment ends on a natural
            // boundary instead of a hard cut.
            self.buffer.push(frame.to_vec());
            self.silence_run += 1;

            if self.silence_run >= self.padding_frames {
                let duration_ms = self.buffer.len() as u64 * self.frame_duration_ms;
                let segment = if duration_ms >= self.min_speech_duration_ms {
                    debug!("speech ended (duration={}ms)", duration_ms);
                    Some(SpeechSegment {
                        bytes: self.buffer.concat(),
                        duration_ms,
                    })
                } else {
                    debug!("speech run too short, discarding (duration={}ms)", duration_ms);
                    None
                };
                self.buffer.clear();
                self.silence_run = 0;
                self.in_speech = false;
                return (false, segment);
            }
        }

        (false, None)
    }

    /// A frame of the wrong size, or a classifier failure, degrades to
    /// silence so one bad frame can never take the session down.
    fn classify(&mut self, frame: &[u8]) -> bool {
        if frame.len() != self.frame_bytes {
            warn!(
                "frame of {} bytes does not match configured {} bytes, treating as silence",
                frame.len(),
                self.frame_bytes
            );
            return false;
        }
        match self.classifier.is_speech(frame, self.sample_rate) {
            Ok(is_speech) => is_speech,
            Err(e) => {
                warn!("speech classification failed, treating frame as silence: {}", e);
                false
            }
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.silence_run = 0;
        self.in_speech = false;
        self.classifier.reset();
    }

    pub fn in_speech(&self) -> bool {
        self.in_speech
    }
}
