//! Core types and traits for the voice shopper orchestrator
//!
//! This crate provides foundational types used across all other crates:
//! - Pipeline frames and the `PipelineStage` contract
//! - Audio frame types
//! - Conversation turns and speakers
//! - Tool-call request/result types with schema validation
//! - Collaborator traits for the external speech/LLM engines
//! - Error types

pub mod audio;
pub mod conversation;
pub mod error;
pub mod frame;
pub mod stage;
pub mod tool;
pub mod traits;

pub use audio::{AudioFrame, Channels, SampleRate};
pub use conversation::{epoch_millis, ConversationTurn, Speaker};
pub use error::{Error, Result};
pub use frame::{ControlFrame, Frame};
pub use stage::{PipelineStage, StageContext, StageDescriptor, StageKind};
pub use tool::{
    ArgumentError, InputSchema, PropertyKind, PropertySchema, ToolCallRequest, ToolCallResult,
    ToolSpec,
};
pub use traits::{
    ActivityDetector, GeneratedTurn, SpeechSynthesizer, Transcriber, TranscriptPart,
    TurnGenerator, TurnRequest, VadEvent,
};
