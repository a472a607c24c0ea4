//! Energy-based voice activity detection
//!
//! A lightweight detector that gates on frame energy with debouncing in both
//! directions. Real deployments can swap in a model-based detector through
//! the [`ActivityDetector`] trait; this one needs no model files.
//!
//! [`ActivityDetector`]: voice_shopper_core::ActivityDetector

use voice_shopper_core::{ActivityDetector, AudioFrame, Result, VadEvent};

/// Energy detector configuration
#[derive(Debug, Clone)]
pub struct EnergyDetectorConfig {
    /// Frames quieter than this are treated as silence (dB)
    pub threshold_db: f32,
    /// Consecutive speech frames required to enter speech
    pub min_speech_frames: u32,
    /// Consecutive silence frames required to end speech
    pub min_silence_frames: u32,
}

impl Default for EnergyDetectorConfig {
    fn default() -> Self {
        Self {
            threshold_db: -40.0,
            min_speech_frames: 3,
            min_silence_frames: 25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectorState {
    Silence,
    Speech,
}

/// Threshold-based activity detector
pub struct EnergyDetector {
    config: EnergyDetectorConfig,
    state: DetectorState,
    speech_frames: u32,
    silence_frames: u32,
    speech_ms: u64,
}

impl EnergyDetector {
    pub fn new(config: EnergyDetectorConfig) -> Self {
        Self {
            config,
            state: DetectorState::Silence,
            speech_frames: 0,
            silence_frames: 0,
            speech_ms: 0,
        }
    }

    fn energy_db(frame: &AudioFrame) -> f32 {
        if frame.samples.is_empty() {
            return f32::NEG_INFINITY;
        }
        let mean_square: f32 =
            frame.samples.iter().map(|s| s * s).sum::<f32>() / frame.samples.len() as f32;
        10.0 * (mean_square + 1e-10).log10()
    }
}

impl Default for EnergyDetector {
    fn default() -> Self {
        Self::new(EnergyDetectorConfig::default())
    }
}

impl ActivityDetector for EnergyDetector {
    fn process_frame(&mut self, frame: &AudioFrame) -> Result<VadEvent> {
        let loud = Self::energy_db(frame) > self.config.threshold_db;

        match self.state {
            DetectorState::Silence => {
                if loud {
                    self.speech_frames += 1;
                    if self.speech_frames >= self.config.min_speech_frames {
                        self.state = DetectorState::Speech;
                        self.silence_frames = 0;
                        self.speech_ms = self.speech_frames as u64 * frame.duration_ms();
                        return Ok(VadEvent::SpeechStart);
                    }
                } else {
                    self.speech_frames = 0;
                }
                Ok(VadEvent::Silence)
            }
            DetectorState::Speech => {
                self.speech_ms += frame.duration_ms();
                if loud {
                    self.silence_frames = 0;
                    Ok(VadEvent::Speech)
                } else {
                    self.silence_frames += 1;
                    if self.silence_frames >= self.config.min_silence_frames {
                        self.state = DetectorState::Silence;
                        self.speech_frames = 0;
                        let duration_ms = self.speech_ms;
                        self.speech_ms = 0;
                        Ok(VadEvent::SpeechEnd { duration_ms })
                    } else {
                        Ok(VadEvent::Speech)
                    }
                }
            }
        }
    }

    fn reset(&mut self) {
        self.state = DetectorState::Silence;
        self.speech_frames = 0;
        self.silence_frames = 0;
        self.speech_ms = 0;
    }
}
