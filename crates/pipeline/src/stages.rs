//! Stage adapters wrapping the external collaborator engines
//!
//! Each adapter is a thin [`PipelineStage`] around one collaborator trait.
//! Interruption runs on the shared turn generation: the aggregator advances
//! it when the user starts speaking, and every stage that produces or
//! forwards agent output drops frames tagged with a stale generation.
//!
//! Tool dispatch runs inside the generator stage so results feed straight
//! back into the same model turn.

use std::sync::Arc;

use async_trait::async_trait;

use voice_shopper_core::{
    ActivityDetector, Frame, PipelineStage, Result, Speaker, SpeechSynthesizer, StageContext,
    StageDescriptor, StageKind, Transcriber, TurnGenerator, TurnRequest, VadEvent,
};
use voice_shopper_gateway::ConversationLogger;
use voice_shopper_tools::{registry, ToolDispatcher};

/// System prompt for the shopping assistant
pub const SYSTEM_PROMPT: &str = "You are a helpful AI shopping assistant that helps users find \
products through natural conversation.\n\
\n\
Guidelines:\n\
1. Be conversational and friendly, not robotic\n\
2. When you're not sure about preferences (price range, brand, features), ask\n\
3. Use the search_products function when you have enough information to search\n\
4. After searching, briefly describe 2-3 top results\n\
5. Use the save_item function when the user wants to save a product\n\
6. Keep responses concise since this is a voice conversation\n\
7. If you encounter errors, explain them simply and offer to try again";

/// Most tool rounds allowed within one model turn
const MAX_TOOL_ROUNDS: usize = 4;

/// Most history entries kept for generation context
const MAX_HISTORY: usize = 20;

/// Build the standard stage chain for one session
pub fn standard_stages(
    detector: Box<dyn ActivityDetector>,
    transcriber: Box<dyn Transcriber>,
    generator: Arc<dyn TurnGenerator>,
    synthesizer: Box<dyn SpeechSynthesizer>,
    dispatcher: Arc<ToolDispatcher>,
    logger: Arc<ConversationLogger>,
) -> Vec<Box<dyn PipelineStage>> {
    vec![
        Box::new(InputStage::new()),
        Box::new(ActivityStage::new(detector)),
        Box::new(TranscriberStage::new(transcriber)),
        Box::new(AggregatorStage::new()),
        Box::new(GeneratorStage::new(generator, dispatcher, logger)),
        Box::new(SynthesizerStage::new(synthesizer)),
        Box::new(OutputStage::new()),
    ]
}

/// First stage: admits transport frames into the chain
pub struct InputStage {
    frames_seen: u64,
}

impl InputStage {
    pub fn new() -> Self {
        Self { frames_seen: 0 }
    }
}

impl Default for InputStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStage for InputStage {
    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor {
            name: "input",
            kind: StageKind::Input,
            ordering_index: 0,
        }
    }

    async fn process(&mut self, frame: Frame, ctx: &StageContext) -> Result<Vec<Frame>> {
        match frame {
            Frame::AudioInput(audio) if audio.is_empty() => Ok(vec![]),
            Frame::AudioInput(audio) => {
                self.frames_seen += 1;
                if self.frames_seen % 500 == 0 {
                    tracing::debug!(
                        session_id = %ctx.session_id,
                        frames = self.frames_seen,
                        "Audio frames received"
                    );
                }
                Ok(vec![Frame::AudioInput(audio)])
            }
            Frame::EndOfStream => Ok(vec![]),
            other => Ok(vec![other]),
        }
    }
}

/// Voice activity detection over incoming audio
pub struct ActivityStage {
    detector: Box<dyn ActivityDetector>,
}

impl ActivityStage {
    pub fn new(detector: Box<dyn ActivityDetector>) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl PipelineStage for ActivityStage {
    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor {
            name: "activity_detector",
            kind: StageKind::ActivityDetector,
            ordering_index: 1,
        }
    }

    async fn process(&mut self, frame: Frame, ctx: &StageContext) -> Result<Vec<Frame>> {
        match frame {
            Frame::AudioInput(audio) => {
                let event = self.detector.process_frame(&audio)?;
                match event {
                    VadEvent::Silence | VadEvent::Speech => Ok(vec![Frame::AudioInput(audio)]),
                    VadEvent::SpeechStart => {
                        tracing::debug!(session_id = %ctx.session_id, "Speech started");
                        Ok(vec![Frame::VoiceStart, Frame::AudioInput(audio)])
                    }
                    VadEvent::SpeechEnd { duration_ms } => {
                        tracing::debug!(
                            session_id = %ctx.session_id,
                            duration_ms,
                            "Speech ended"
                        );
                        Ok(vec![
                            Frame::AudioInput(audio),
                            Frame::VoiceEnd { duration_ms },
                        ])
                    }
                }
            }
            Frame::Control(control) => {
                self.detector.reset();
                Ok(vec![Frame::Control(control)])
            }
            other => Ok(vec![other]),
        }
    }

    async fn on_cancel(&mut self, _ctx: &StageContext) -> Result<()> {
        self.detector.reset();
        Ok(())
    }
}

/// Streaming transcription; consumes audio, emits transcripts
pub struct TranscriberStage {
    transcriber: Box<dyn Transcriber>,
}

impl TranscriberStage {
    pub fn new(transcriber: Box<dyn Transcriber>) -> Self {
        Self { transcriber }
    }
}

#[async_trait]
impl PipelineStage for TranscriberStage {
    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor {
            name: "transcriber",
            kind: StageKind::Transcriber,
            ordering_index: 2,
        }
    }

    async fn process(&mut self, frame: Frame, ctx: &StageContext) -> Result<Vec<Frame>> {
        match frame {
            Frame::AudioInput(audio) => match self.transcriber.process(&audio).await? {
                Some(partial) => Ok(vec![Frame::TranscriptPartial {
                    text: partial.text,
                    confidence: partial.confidence,
                }]),
                None => Ok(vec![]),
            },
            Frame::VoiceEnd { .. } => {
                let part = self.transcriber.finalize().await?;
                self.transcriber.reset();
                if part.text.trim().is_empty() {
                    tracing::debug!(session_id = %ctx.session_id, "Empty utterance discarded");
                    return Ok(vec![]);
                }
                tracing::info!(
                    session_id = %ctx.session_id,
                    text = %part.text,
                    confidence = part.confidence,
                    "Final transcript"
                );
                Ok(vec![Frame::TranscriptFinal {
                    text: part.text,
                    confidence: part.confidence,
                }])
            }
            Frame::Control(control) => {
                self.transcriber.reset();
                Ok(vec![Frame::Control(control)])
            }
            other => Ok(vec![other]),
        }
    }

    async fn on_cancel(&mut self, _ctx: &StageContext) -> Result<()> {
        self.transcriber.reset();
        Ok(())
    }
}

/// Dialogue-state aggregation and barge-in gating
///
/// A speech start advances the shared turn generation, invalidating any
/// agent output still in flight; the abandoned generation travels downstream
/// as a `BargeIn` frame so playback stops too.
pub struct AggregatorStage;

impl AggregatorStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AggregatorStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStage for AggregatorStage {
    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor {
            name: "aggregator",
            kind: StageKind::Aggregator,
            ordering_index: 3,
        }
    }

    async fn process(&mut self, frame: Frame, ctx: &StageContext) -> Result<Vec<Frame>> {
        match frame {
            Frame::VoiceStart => {
                let stale = ctx.current_turn();
                let current = ctx.advance_turn();
                tracing::debug!(
                    session_id = %ctx.session_id,
                    stale_turn = stale,
                    turn = current,
                    "New user turn"
                );
                Ok(vec![Frame::BargeIn { turn: stale }, Frame::VoiceStart])
            }
            Frame::TranscriptFinal { text, confidence } => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Ok(vec![]);
                }
                let turn = ctx.current_turn();
                Ok(vec![
                    Frame::TranscriptFinal {
                        text: text.clone(),
                        confidence,
                    },
                    Frame::Utterance {
                        text: trimmed.to_string(),
                        turn,
                    },
                ])
            }
            other => Ok(vec![other]),
        }
    }
}

/// LLM turn generation with inline tool dispatch
///
/// Runs the generate → dispatch → generate loop until the model produces a
/// final text response. The turn generation is checked after every await;
/// a stale turn is abandoned without emitting or logging the agent response.
pub struct GeneratorStage {
    generator: Arc<dyn TurnGenerator>,
    dispatcher: Arc<ToolDispatcher>,
    logger: Arc<ConversationLogger>,
    system_prompt: String,
    history: Vec<(Speaker, String)>,
}

impl GeneratorStage {
    pub fn new(
        generator: Arc<dyn TurnGenerator>,
        dispatcher: Arc<ToolDispatcher>,
        logger: Arc<ConversationLogger>,
    ) -> Self {
        Self {
            generator,
            dispatcher,
            logger,
            system_prompt: SYSTEM_PROMPT.to_string(),
            history: Vec::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    async fn respond(&mut self, text: String, turn: u64, ctx: &StageContext) -> Result<Vec<Frame>> {
        self.logger.record(Speaker::User, &text);

        let tools = registry().definitions();
        let mut tool_results = Vec::new();

        for round in 0..=MAX_TOOL_ROUNDS {
            let request = TurnRequest {
                system_prompt: self.system_prompt.clone(),
                history: self.history.clone(),
                user_text: text.clone(),
                tools: tools.clone(),
                tool_results: tool_results.clone(),
            };

            let generated = self.generator.generate(request).await?;

            if !ctx.is_current(turn) {
                tracing::info!(
                    session_id = %ctx.session_id,
                    turn,
                    "Turn abandoned during generation"
                );
                return Ok(vec![]);
            }

            if generated.has_tool_calls() {
                tracing::debug!(
                    session_id = %ctx.session_id,
                    calls = generated.tool_calls.len(),
                    round,
                    "Model requested tools"
                );
                let results = self.dispatcher.dispatch_all(generated.tool_calls).await;
                if !ctx.is_current(turn) {
                    tracing::info!(
                        session_id = %ctx.session_id,
                        turn,
                        "Turn abandoned during tool dispatch"
                    );
                    return Ok(vec![]);
                }
                tool_results.extend(results);
                continue;
            }

            self.logger.record(Speaker::Agent, &generated.text);
            self.history.push((Speaker::User, text));
            self.history.push((Speaker::Agent, generated.text.clone()));
            if self.history.len() > MAX_HISTORY {
                let excess = self.history.len() - MAX_HISTORY;
                self.history.drain(..excess);
            }

            return Ok(vec![Frame::AgentChunk {
                text: generated.text,
                is_final: true,
                turn,
            }]);
        }

        tracing::warn!(
            session_id = %ctx.session_id,
            rounds = MAX_TOOL_ROUNDS,
            "Tool round limit reached"
        );
        let fallback = "I'm having trouble completing that right now. Could you try again?";
        self.logger.record(Speaker::Agent, fallback);
        Ok(vec![Frame::AgentChunk {
            text: fallback.to_string(),
            is_final: true,
            turn,
        }])
    }
}

#[async_trait]
impl PipelineStage for GeneratorStage {
    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor {
            name: "generator",
            kind: StageKind::Generator,
            ordering_index: 4,
        }
    }

    async fn process(&mut self, frame: Frame, ctx: &StageContext) -> Result<Vec<Frame>> {
        match frame {
            Frame::Utterance { text, turn } => self.respond(text, turn, ctx).await,
            other => Ok(vec![other]),
        }
    }
}

/// Speech synthesis over finished agent turns
pub struct SynthesizerStage {
    synthesizer: Box<dyn SpeechSynthesizer>,
}

impl SynthesizerStage {
    pub fn new(synthesizer: Box<dyn SpeechSynthesizer>) -> Self {
        Self { synthesizer }
    }
}

#[async_trait]
impl PipelineStage for SynthesizerStage {
    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor {
            name: "synthesizer",
            kind: StageKind::Synthesizer,
            ordering_index: 6,
        }
    }

    async fn process(&mut self, frame: Frame, ctx: &StageContext) -> Result<Vec<Frame>> {
        match frame {
            Frame::AgentChunk {
                text,
                is_final,
                turn,
            } => {
                if !ctx.is_current(turn) {
                    return Ok(vec![]);
                }

                let mut outputs = vec![Frame::AgentChunk {
                    text: text.clone(),
                    is_final,
                    turn,
                }];

                match self.synthesizer.synthesize(&text).await {
                    Ok(frames) => {
                        // The user may have barged in while we were synthesizing
                        if !ctx.is_current(turn) {
                            return Ok(vec![]);
                        }
                        let last = frames.len().saturating_sub(1);
                        for (i, audio) in frames.into_iter().enumerate() {
                            outputs.push(Frame::AgentAudio {
                                frame: audio,
                                turn,
                                is_final: is_final && i == last,
                            });
                        }
                    }
                    Err(e) => {
                        // Degrade to text-only rather than ending the session
                        tracing::warn!(
                            session_id = %ctx.session_id,
                            error = %e,
                            "Synthesis failed, continuing text-only"
                        );
                    }
                }

                Ok(outputs)
            }
            other => Ok(vec![other]),
        }
    }
}

/// Final gate before the transport: drops stale agent output
pub struct OutputStage;

impl OutputStage {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OutputStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineStage for OutputStage {
    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor {
            name: "output",
            kind: StageKind::Output,
            ordering_index: 7,
        }
    }

    async fn process(&mut self, frame: Frame, ctx: &StageContext) -> Result<Vec<Frame>> {
        match frame {
            Frame::AgentChunk { turn, .. } | Frame::AgentAudio { turn, .. }
                if !ctx.is_current(turn) =>
            {
                tracing::trace!(
                    session_id = %ctx.session_id,
                    turn,
                    "Stale agent frame dropped"
                );
                Ok(vec![])
            }
            other => Ok(vec![other]),
        }
    }
}
