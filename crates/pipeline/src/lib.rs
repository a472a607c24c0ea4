//! Session pipeline orchestration
//!
//! A `SessionPipeline` wires an ordered chain of [`PipelineStage`]s for one
//! session and runs each stage in its own task, connected by bounded
//! channels. Cancellation is cooperative and propagates within one channel
//! hop; teardown releases stages in reverse order on every exit path.
//!
//! [`PipelineStage`]: voice_shopper_core::PipelineStage

pub mod pipeline;
pub mod stages;
pub mod stt;
pub mod tts;
pub mod vad;

pub use pipeline::{
    PipelineCanceller, PipelineOutcome, RunningPipeline, SessionPipeline, CHANNEL_CAPACITY,
};
pub use stages::{
    standard_stages, ActivityStage, AggregatorStage, GeneratorStage, InputStage, OutputStage,
    SynthesizerStage, TranscriberStage, SYSTEM_PROMPT,
};
pub use stt::NullTranscriber;
pub use tts::CartesiaSynthesizer;
pub use vad::{EnergyDetector, EnergyDetectorConfig};

use thiserror::Error;

/// Pipeline construction and execution errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage ordering must be strictly increasing: {0}")]
    InvalidOrder(String),

    #[error("Pipeline requires exactly one generator stage, found {0}")]
    GeneratorCount(usize),

    #[error("Pipeline has no stages")]
    Empty,
}
