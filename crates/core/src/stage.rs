//! Pipeline stage contract
//!
//! Every processing unit in a session pipeline implements [`PipelineStage`].
//! Stages run in separate tokio tasks connected by channels; each stage
//! consumes a frame and emits zero or more output frames. Cancellation is
//! cooperative: the pipeline signals it out of band and stage tasks observe
//! it at their next suspension point.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::frame::Frame;

/// The role a stage plays in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Input,
    ActivityDetector,
    Transcriber,
    Aggregator,
    Generator,
    Dispatcher,
    Synthesizer,
    Output,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Input => "input",
            StageKind::ActivityDetector => "activity_detector",
            StageKind::Transcriber => "transcriber",
            StageKind::Aggregator => "aggregator",
            StageKind::Generator => "generator",
            StageKind::Dispatcher => "dispatcher",
            StageKind::Synthesizer => "synthesizer",
            StageKind::Output => "output",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity and position of a stage within its pipeline
#[derive(Debug, Clone, Copy)]
pub struct StageDescriptor {
    /// Stage name for tracing
    pub name: &'static str,
    /// Stage role
    pub kind: StageKind,
    /// Position in the chain; stages execute in strictly increasing order
    pub ordering_index: u8,
}

/// Shared per-session context handed to every stage
///
/// The turn generation is the interruption mechanism: a barge-in advances it,
/// and agent output tagged with an older generation is dropped downstream.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Session ID
    pub session_id: String,
    /// User ID
    pub user_id: String,
    turn: Arc<AtomicU64>,
}

impl StageContext {
    /// Create a new context for a session
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            turn: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current turn generation
    pub fn current_turn(&self) -> u64 {
        self.turn.load(Ordering::Acquire)
    }

    /// Advance the turn generation (barge-in); returns the new generation
    pub fn advance_turn(&self) -> u64 {
        self.turn.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Check whether a frame's generation is still current
    pub fn is_current(&self, turn: u64) -> bool {
        turn == self.current_turn()
    }
}

/// A processing unit in the session pipeline
///
/// # Example Implementation
///
/// ```ignore
/// struct UppercaseStage;
///
/// #[async_trait]
/// impl PipelineStage for UppercaseStage {
///     fn descriptor(&self) -> StageDescriptor {
///         StageDescriptor { name: "uppercase", kind: StageKind::Aggregator, ordering_index: 3 }
///     }
///
///     async fn process(&mut self, frame: Frame, ctx: &StageContext) -> Result<Vec<Frame>> {
///         match frame {
///             Frame::TranscriptFinal { text, confidence } => Ok(vec![Frame::Utterance {
///                 text: text.to_uppercase(),
///                 turn: ctx.current_turn(),
///             }]),
///             other => Ok(vec![other]), // Pass through
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait PipelineStage: Send + 'static {
    /// Stage identity and position
    fn descriptor(&self) -> StageDescriptor;

    /// Process a frame and emit zero or more output frames
    async fn process(&mut self, frame: Frame, ctx: &StageContext) -> Result<Vec<Frame>>;

    /// Called once before the first frame
    async fn on_start(&mut self, _ctx: &StageContext) -> Result<()> {
        Ok(())
    }

    /// Called during teardown, in reverse ordering-index order
    ///
    /// Must release any resources the stage holds. Invoked on every exit
    /// path: clean completion, stage error, and external cancellation.
    async fn on_cancel(&mut self, _ctx: &StageContext) -> Result<()> {
        Ok(())
    }
}
