//! Speech synthesis over the Cartesia HTTP API
//!
//! The synthesizer requests raw 16-bit PCM and chunks it into pipeline audio
//! frames. The reqwest client is shared with the rest of the process, so all
//! sessions draw from one connection pool.

use async_trait::async_trait;

use voice_shopper_core::{AudioFrame, Error, Result, SampleRate, SpeechSynthesizer};

const CARTESIA_TTS_URL: &str = "https://api.cartesia.ai/tts/bytes";
const CARTESIA_VERSION: &str = "2024-06-10";
const DEFAULT_VOICE_ID: &str = "71a7ad14-091c-4e8e-a314-022ece01c121";
const DEFAULT_MODEL_ID: &str = "sonic-english";

/// Samples per emitted frame (100 ms at 24 kHz)
const FRAME_SAMPLES: usize = 2400;

/// Cartesia speech synthesizer
pub struct CartesiaSynthesizer {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
    model_id: String,
    sample_rate: SampleRate,
    sequence: u64,
}

impl CartesiaSynthesizer {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model_id: DEFAULT_MODEL_ID.to_string(),
            sample_rate: SampleRate::Hz24000,
            sequence: 0,
        }
    }

    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "model_id": self.model_id,
            "transcript": text,
            "voice": { "mode": "id", "id": self.voice_id },
            "output_format": {
                "container": "raw",
                "encoding": "pcm_s16le",
                "sample_rate": self.sample_rate.as_u32(),
            },
        })
    }

    fn frames_from_pcm(&mut self, pcm: &[u8]) -> Vec<AudioFrame> {
        pcm.chunks(FRAME_SAMPLES * 2)
            .map(|chunk| {
                let frame = AudioFrame::from_pcm16(chunk, self.sample_rate, self.sequence);
                self.sequence += 1;
                frame
            })
            .collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for CartesiaSynthesizer {
    async fn synthesize(&mut self, text: &str) -> Result<Vec<AudioFrame>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(CARTESIA_TTS_URL)
            .header("X-API-Key", &self.api_key)
            .header("Cartesia-Version", CARTESIA_VERSION)
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Synthesis(format!(
                "Cartesia returned status {status}"
            )));
        }

        let pcm = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        let frames = self.frames_from_pcm(&pcm);
        tracing::debug!(
            chars = text.len(),
            frames = frames.len(),
            "Synthesized speech"
        );
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let synth = CartesiaSynthesizer::new(reqwest::Client::new(), "key");
        let body = synth.request_body("Hello there");

        assert_eq!(body["transcript"], "Hello there");
        assert_eq!(body["voice"]["mode"], "id");
        assert_eq!(body["voice"]["id"], DEFAULT_VOICE_ID);
        assert_eq!(body["output_format"]["encoding"], "pcm_s16le");
        assert_eq!(body["output_format"]["sample_rate"], 24000);
    }

    #[test]
    fn test_pcm_chunking() {
        let mut synth = CartesiaSynthesizer::new(reqwest::Client::new(), "key");
        // 2.5 frames worth of samples
        let pcm = vec![0u8; FRAME_SAMPLES * 2 * 2 + FRAME_SAMPLES];
        let frames = synth.frames_from_pcm(&pcm);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].samples.len(), FRAME_SAMPLES);
        assert_eq!(frames[0].sequence, 0);
        assert_eq!(frames[2].sequence, 2);
    }

    #[tokio::test]
    async fn test_empty_text_skips_request() {
        let mut synth = CartesiaSynthesizer::new(reqwest::Client::new(), "key");
        let frames = synth.synthesize("   ").await.unwrap();
        assert!(frames.is_empty());
    }
}
