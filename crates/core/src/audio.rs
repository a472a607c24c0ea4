//! Audio frame types
//!
//! Audio flows through the pipeline as mono f32 sample buffers. Conversion
//! to and from 16-bit little-endian PCM happens only at the transport edge.

use serde::{Deserialize, Serialize};

/// Supported sample rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    Hz8000,
    Hz16000,
    Hz24000,
    Hz48000,
}

impl SampleRate {
    pub fn as_u32(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz24000 => 24000,
            SampleRate::Hz48000 => 48000,
        }
    }
}

/// Channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Channels {
    Mono,
    Stereo,
}

impl Channels {
    pub fn count(&self) -> u16 {
        match self {
            Channels::Mono => 1,
            Channels::Stereo => 2,
        }
    }
}

/// A single audio frame
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate
    pub sample_rate: SampleRate,
    /// Channel layout
    pub channels: Channels,
    /// Monotonic sequence number within a session
    pub sequence: u64,
}

impl AudioFrame {
    /// Create a new audio frame
    pub fn new(samples: Vec<f32>, sample_rate: SampleRate, channels: Channels, sequence: u64) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
            sequence,
        }
    }

    /// Decode 16-bit little-endian PCM bytes into a frame
    pub fn from_pcm16(bytes: &[u8], sample_rate: SampleRate, sequence: u64) -> Self {
        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|chunk| {
                let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                sample as f32 / 32768.0
            })
            .collect();
        Self::new(samples, sample_rate, Channels::Mono, sequence)
    }

    /// Encode samples as 16-bit little-endian PCM bytes
    pub fn to_pcm16(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|&sample| {
                let clamped = sample.clamp(-1.0, 1.0);
                let i16_sample = (clamped * 32767.0) as i16;
                i16_sample.to_le_bytes()
            })
            .collect()
    }

    /// Frame duration in milliseconds
    pub fn duration_ms(&self) -> u64 {
        let frames = self.samples.len() as u64 / self.channels.count() as u64;
        frames * 1000 / self.sample_rate.as_u32() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
