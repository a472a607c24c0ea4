//! Frame types that flow through the session pipeline
//!
//! Frames move stage to stage in ordering-index order. Agent-output frames
//! carry the turn generation they were produced under; a barge-in advances
//! the generation and stale frames are dropped downstream instead of being
//! played or logged.

use crate::audio::AudioFrame;
use serde::{Deserialize, Serialize};

/// Frame types that flow through the pipeline
#[derive(Debug, Clone)]
pub enum Frame {
    /// Audio input from the transport
    AudioInput(AudioFrame),

    /// Voice activity detected (speech started)
    VoiceStart,

    /// Voice activity ended (silence detected)
    VoiceEnd {
        /// Duration of speech in milliseconds
        duration_ms: u64,
    },

    /// Partial transcript, still being refined
    TranscriptPartial { text: String, confidence: f32 },

    /// Final transcript for the current utterance
    TranscriptFinal { text: String, confidence: f32 },

    /// Aggregated user utterance, ready for the generator
    Utterance { text: String, turn: u64 },

    /// Agent response text (streamed; `is_final` marks the complete turn)
    AgentChunk {
        text: String,
        is_final: bool,
        turn: u64,
    },

    /// Synthesized agent audio
    AgentAudio {
        frame: AudioFrame,
        turn: u64,
        is_final: bool,
    },

    /// User interrupted while an agent turn was in flight
    BargeIn {
        /// Turn generation that was abandoned
        turn: u64,
    },

    /// End of session signalled by the input stage (disconnect)
    EndOfStream,

    /// Error raised by a stage
    Error {
        stage: &'static str,
        message: String,
        recoverable: bool,
    },

    /// Control frame for pipeline management
    Control(ControlFrame),
}

/// Control frames for pipeline management
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ControlFrame {
    /// Flush all pending data
    Flush,
    /// Reset stage state
    Reset,
}

impl Frame {
    /// Check if this is an end-of-stream frame
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Frame::EndOfStream)
    }

    /// Check if this is an error frame
    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error { .. })
    }

    /// Check if this is a session-fatal error frame
    pub fn is_fatal_error(&self) -> bool {
        matches!(self, Frame::Error { recoverable: false, .. })
    }

    /// Short name for tracing
    pub fn kind_name(&self) -> &'static str {
        match self {
            Frame::AudioInput(_) => "audio_input",
            Frame::VoiceStart => "voice_start",
            Frame::VoiceEnd { .. } => "voice_end",
            Frame::TranscriptPartial { .. } => "transcript_partial",
            Frame::TranscriptFinal { .. } => "transcript_final",
            Frame::Utterance { .. } => "utterance",
            Frame::AgentChunk { .. } => "agent_chunk",
            Frame::AgentAudio { .. } => "agent_audio",
            Frame::BargeIn { .. } => "barge_in",
            Frame::EndOfStream => "end_of_stream",
            Frame::Error { .. } => "error",
            Frame::Control(_) => "control",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_predicates() {
        assert!(Frame::EndOfStream.is_end_of_stream());
        assert!(Frame::Error {
            stage: "test",
            message: "err".into(),
            recoverable: false
        }
        .is_fatal_error());
        assert!(!Frame::Error {
            stage: "test",
            message: "err".into(),
            recoverable: true
        }
        .is_fatal_error());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Frame::VoiceStart.kind_name(), "voice_start");
        assert_eq!(
            Frame::Utterance {
                text: "hi".into(),
                turn: 0
            }
            .kind_name(),
            "utterance"
        );
    }
}
