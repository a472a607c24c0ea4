//! Speech-to-text placeholders
//!
//! Streaming transcription is an external engine consumed through the
//! [`Transcriber`] trait. When none is wired, sessions fall back to
//! text-only interaction: the transport injects final transcripts directly
//! and audio produces no utterances.
//!
//! [`Transcriber`]: voice_shopper_core::Transcriber

use async_trait::async_trait;

use voice_shopper_core::{AudioFrame, Result, Transcriber, TranscriptPart};

/// Transcriber that produces nothing (text-only mode)
pub struct NullTranscriber {
    warned: bool,
}

impl NullTranscriber {
    pub fn new() -> Self {
        Self { warned: false }
    }
}

impl Default for NullTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcriber for NullTranscriber {
    async fn process(&mut self, _frame: &AudioFrame) -> Result<Option<TranscriptPart>> {
        if !self.warned {
            tracing::warn!("No speech engine configured, audio will not be transcribed");
            self.warned = true;
        }
        Ok(None)
    }

    async fn finalize(&mut self) -> Result<TranscriptPart> {
        Ok(TranscriptPart {
            text: String::new(),
            confidence: 0.0,
        })
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_shopper_core::{Channels, SampleRate};

    #[tokio::test]
    async fn test_null_transcriber_yields_nothing() {
        let mut stt = NullTranscriber::new();
        let frame = AudioFrame::new(vec![0.1; 320], SampleRate::Hz16000, Channels::Mono, 0);

        assert!(stt.process(&frame).await.unwrap().is_none());
        let final_part = stt.finalize().await.unwrap();
        assert!(final_part.text.is_empty());
    }
}
