//! Collaborator traits for the external speech and language-model engines
//!
//! The orchestrator consumes these engines as opaque processors with a fixed
//! input/output contract. Implementations live outside this workspace (or in
//! tests as stubs); the pipeline crate wraps them in stage adapters.

use async_trait::async_trait;

use crate::audio::AudioFrame;
use crate::conversation::Speaker;
use crate::error::Result;
use crate::tool::{ToolCallRequest, ToolCallResult};

/// Voice-activity detection events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// No speech in the frame
    Silence,
    /// Speech just started
    SpeechStart,
    /// Speech continuing
    Speech,
    /// Speech just ended
    SpeechEnd {
        /// Duration of the utterance in milliseconds
        duration_ms: u64,
    },
}

/// Voice-activity detector over incoming audio frames
pub trait ActivityDetector: Send {
    /// Classify one audio frame
    fn process_frame(&mut self, frame: &AudioFrame) -> Result<VadEvent>;

    /// Reset detector state
    fn reset(&mut self);
}

/// A piece of transcribed speech
#[derive(Debug, Clone)]
pub struct TranscriptPart {
    pub text: String,
    pub confidence: f32,
}

/// Streaming speech-to-text engine
#[async_trait]
pub trait Transcriber: Send {
    /// Feed one audio frame; may yield a partial transcript
    async fn process(&mut self, frame: &AudioFrame) -> Result<Option<TranscriptPart>>;

    /// Finalize the current utterance and return the full transcript
    async fn finalize(&mut self) -> Result<TranscriptPart>;

    /// Reset for the next utterance
    fn reset(&mut self);
}

/// Request for one agent turn
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// System prompt
    pub system_prompt: String,
    /// Prior turns in (speaker, text) order
    pub history: Vec<(Speaker, String)>,
    /// The user utterance to respond to
    pub user_text: String,
    /// Tool definitions available to the model
    pub tools: Vec<serde_json::Value>,
    /// Results of tool calls issued earlier in this turn
    pub tool_results: Vec<ToolCallResult>,
}

impl TurnRequest {
    pub fn new(system_prompt: impl Into<String>, user_text: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            user_text: user_text.into(),
            tools: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<serde_json::Value>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_results(mut self, results: Vec<ToolCallResult>) -> Self {
        self.tool_results = results;
        self
    }
}

/// One generated agent turn
///
/// When `tool_calls` is non-empty the orchestrator dispatches them in order
/// and calls the generator again with the results before the turn completes.
#[derive(Debug, Clone, Default)]
pub struct GeneratedTurn {
    /// Response text (may be empty when the model only requests tools)
    pub text: String,
    /// Tool calls the model wants executed
    pub tool_calls: Vec<ToolCallRequest>,
}

impl GeneratedTurn {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Language-model turn generation service
#[async_trait]
pub trait TurnGenerator: Send + Sync {
    /// Generate one agent turn
    async fn generate(&self, request: TurnRequest) -> Result<GeneratedTurn>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}

/// Text-to-speech engine
#[async_trait]
pub trait SpeechSynthesizer: Send {
    /// Synthesize text into audio frames
    async fn synthesize(&mut self, text: &str) -> Result<Vec<AudioFrame>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockGenerator;

    #[async_trait]
    impl TurnGenerator for MockGenerator {
        async fn generate(&self, request: TurnRequest) -> Result<GeneratedTurn> {
            Ok(GeneratedTurn::text_only(format!(
                "echo: {}",
                request.user_text
            )))
        }

        fn model_name(&self) -> &str {
            "mock-generator"
        }
    }

    #[tokio::test]
    async fn test_mock_generator() {
        let generator = MockGenerator;
        assert_eq!(generator.model_name(), "mock-generator");

        let request = TurnRequest::new("You are a shopping assistant", "find me a chair");
        let turn = generator.generate(request).await.unwrap();
        assert_eq!(turn.text, "echo: find me a chair");
        assert!(!turn.has_tool_calls());
    }
}
