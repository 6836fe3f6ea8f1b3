use std::io::Cursor;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("transcription service error: {0}")]
    Service(String),
    #[error("failed to encode audio for transcription: {0}")]
    Encode(#[from] hound::Error),
}

/// Speech-to-text capability over one finalized speech segment
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe 16-bit mono PCM audio to text
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError>;
}

/// Wrap raw 16-bit mono PCM in a WAV container, the format every
/// transcription backend accepts.
pub(crate) fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for chunk in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_wrapping_preserves_sample_count() {
        let pcm: Vec<u8> = (0..480i16).flat_map(|s| s.to_le_bytes()).collect();
        let wav = pcm_to_wav(&pcm, 16000).unwrap();

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.len(), 480);
    }
}
