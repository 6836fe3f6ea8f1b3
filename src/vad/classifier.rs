use std::collections::VecDeque;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("frame of {got} bytes is not a 10, 20 or 30 ms frame at {sample_rate} Hz")]
    FrameSize { got: usize, sample_rate: u32 },
    #[error("unsupported sample rate: {0} Hz")]
    SampleRate(u32),
}

/// Scores a single fixed-size frame of 16-bit mono PCM as speech or silence.
///
/// Implementations may keep smoothing state across calls; `reset` must clear
/// it so a new segment starts without bias from the previous one.
pub trait SpeechClassifier: Send {
    fn is_speech(&mut self, frame: &[u8], sample_rate: u32) -> Result<bool, ClassificationError>;
    fn reset(&mut self);
}

/// RMS of the frame, with samples normalized to [-1.0, 1.0].
pub(crate) fn frame_rms(frame: &[u8]) -> f32 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for chunk in frame.chunks_exact(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]) as f64 / 32768.0;
        sum += sample * sample;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        (sum / count as f64).sqrt() as f32
    }
}

/// Energy-based classifier: a frame is speech when its RMS exceeds a fixed
/// threshold. Stateless fallback option.
pub struct EnergyClassifier {
    threshold: f32,
}

impl EnergyClassifier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl SpeechClassifier for EnergyClassifier {
    fn is_speech(&mut self, frame: &[u8], _sample_rate: u32) -> Result<bool, ClassificationError> {
        Ok(frame_rms(frame) > self.threshold)
    }

    fn reset(&mut self) {}
}

/// Probability-threshold classifier with a smoothing window.
///
/// Frame energy in dBFS is mapped onto a pseudo-probability around
/// `db_threshold`, then averaged over the last `smoothing_window` frames.
/// The window is the cross-call state `reset` clears.
pub struct SmoothedEnergyClassifier {
    prob_threshold: f32,
    db_threshold: f32,
    smoothing_window: usize,
    window: VecDeque<f32>,
}

impl SmoothedEnergyClassifier {
    pub fn new(prob_threshold: f32, db_threshold: f32, smoothing_window: usize) -> Self {
        Self {
            prob_threshold,
            db_threshold,
            smoothing_window: smoothing_window.max(1),
            window: VecDeque::new(),
        }
    }

    fn probability(&self, frame: &[u8]) -> f32 {
        let rms = frame_rms(frame);
        let db = if rms <= 1e-8 {
            -100.0
        } else {
            20.0 * rms.log10()
        };
        // db_threshold maps to 0.5; +/-10 dB saturates the probability.
        ((db - self.db_threshold) / 20.0 + 0.5).clamp(0.0, 1.0)
    }
}

impl SpeechClassifier for SmoothedEnergyClassifier {
    fn is_speech(&mut self, frame: &[u8], _sample_rate: u32) -> Result<bool, ClassificationError> {
        let prob = self.probability(frame);
        self.window.push_back(prob);
        if self.window.len() > self.smoothing_window {
            self.window.pop_front();
        }
        let avg = self.window.iter().sum::<f32>() / self.window.len() as f32;
        Ok(avg > self.prob_threshold)
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

const BANDED_SAMPLE_RATES: [u32; 4] = [8000, 16000, 32000, 48000];
const BANDED_FRAME_MS: [usize; 3] = [10, 20, 30];

/// Fixed-frame classifier with an aggressiveness level 0-3.
///
/// Combines an energy floor with a zero-crossing-rate ceiling; higher
/// aggressiveness means stricter requirements before a frame counts as
/// speech. Only exact 10/20/30 ms frames at the standard sample rates are
/// accepted; anything else is a caller error, never silently reshaped.
pub struct BandedClassifier {
    aggressiveness: u8,
}

impl BandedClassifier {
    pub fn new(aggressiveness: u8) -> Self {
        Self {
            aggressiveness: aggressiveness.min(3),
        }
    }

    fn thresholds(&self) -> (f32, f32) {
        match self.aggressiveness {
            0 => (0.004, 0.50),
            1 => (0.008, 0.40),
            2 => (0.012, 0.35),
            _ => (0.020, 0.30),
        }
    }
}

impl SpeechClassifier for BandedClassifier {
    fn is_speech(&mut self, frame: &[u8], sample_rate: u32) -> Result<bool, ClassificationError> {
        if !BANDED_SAMPLE_RATES.contains(&sample_rate) {
            return Err(ClassificationError::SampleRate(sample_rate));
        }
        let samples = frame.len() / 2;
        let valid = frame.len() % 2 == 0
            && BANDED_FRAME_MS
                .iter()
                .any(|ms| samples * 1000 == *ms * sample_rate as usize);
        if !valid {
            return Err(ClassificationError::FrameSize {
                got: frame.len(),
                sample_rate,
            });
        }

        let rms = frame_rms(frame);
        let mut crossings = 0usize;
        let mut prev: Option<i16> = None;
        for chunk in frame.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            if let Some(p) = prev {
                if (p < 0) != (sample < 0) {
                    crossings += 1;
                }
            }
            prev = Some(sample);
        }
        let zcr = if samples > 1 {
            crossings as f32 / (samples - 1) as f32
        } else {
            0.0
        };

        let (energy_floor, zcr_ceiling) = self.thresholds();
        Ok(rms > energy_floor && zcr < zcr_ceiling)
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_from_samples(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    fn tone_frame(samples: usize, amplitude: i16, period: usize) -> Vec<u8> {
        let wave: Vec<i16> = (0..samples)
            .map(|i| {
                if (i / period) % 2 == 0 {
                    amplitude
                } else {
                    -amplitude
                }
            })
            .collect();
        frame_from_samples(&wave)
    }

    #[test]
    fn energy_classifier_separates_loud_from_quiet() {
        let mut classifier = EnergyClassifier::new(0.01);
        let quiet = frame_from_samples(&[0i16; 480]);
        let loud = tone_frame(480, 8000, 40);
        assert!(!classifier.is_speech(&quiet, 16000).unwrap());
        assert!(classifier.is_speech(&loud, 16000).unwrap());
    }

    #[test]
    fn smoothed_classifier_carries_state_until_reset() {
        let mut classifier = SmoothedEnergyClassifier::new(0.5, -40.0, 4);
        let loud = tone_frame(480, 12000, 40);
        let quiet = frame_from_samples(&[10i16; 480]);
        for _ in 0..4 {
            classifier.is_speech(&loud, 16000).unwrap();
        }
        // One quiet frame cannot outweigh the smoothed loud history.
        assert!(classifier.is_speech(&quiet, 16000).unwrap());
        classifier.reset();
        assert!(!classifier.is_speech(&quiet, 16000).unwrap());
    }

    #[test]
    fn banded_classifier_rejects_bad_frames() {
        let mut classifier = BandedClassifier::new(2);
        let odd = vec![0u8; 481];
        assert!(matches!(
            classifier.is_speech(&odd, 16000),
            Err(ClassificationError::FrameSize { .. })
        ));
        let frame = tone_frame(480, 8000, 40);
        assert!(matches!(
            classifier.is_speech(&frame, 44100),
            Err(ClassificationError::SampleRate(44100))
        ));
    }

    #[test]
    fn banded_classifier_accepts_voiced_frame() {
        let mut classifier = BandedClassifier::new(2);
        // 30 ms at 16 kHz, low-frequency square wave: high energy, low ZCR.
        let frame = tone_frame(480, 8000, 60);
        assert!(classifier.is_speech(&frame, 16000).unwrap());
        let silence = frame_from_samples(&[0i16; 480]);
        assert!(!classifier.is_speech(&silence, 16000).unwrap());
    }
}
