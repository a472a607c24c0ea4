//! End-to-end pipeline flow with stub engines
//!
//! Drives audio through the full stage chain: activity detection,
//! transcription, aggregation, generation with tool dispatch, synthesis,
//! and output — then verifies conversation logging and barge-in semantics.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use voice_shopper_core::{
    ActivityDetector, AudioFrame, Channels, Frame, GeneratedTurn, Result, SampleRate, Speaker,
    SpeechSynthesizer, StageContext, ToolCallRequest, Transcriber, TranscriptPart, TurnGenerator,
    TurnRequest, VadEvent,
};
use voice_shopper_gateway::{ConversationLogger, RecordedCall, StubActionGateway};
use voice_shopper_pipeline::{standard_stages, PipelineOutcome, SessionPipeline};
use voice_shopper_tools::ToolDispatcher;

/// Detector that replays a scripted event per audio frame
struct ScriptedDetector {
    events: VecDeque<VadEvent>,
}

impl ScriptedDetector {
    fn new(events: Vec<VadEvent>) -> Box<Self> {
        Box::new(Self {
            events: events.into(),
        })
    }
}

impl ActivityDetector for ScriptedDetector {
    fn process_frame(&mut self, _frame: &AudioFrame) -> Result<VadEvent> {
        Ok(self.events.pop_front().unwrap_or(VadEvent::Silence))
    }

    fn reset(&mut self) {}
}

/// Transcriber that replays scripted utterances on finalize
struct ScriptedTranscriber {
    utterances: VecDeque<String>,
}

impl ScriptedTranscriber {
    fn new(utterances: Vec<&str>) -> Box<Self> {
        Box::new(Self {
            utterances: utterances.into_iter().map(String::from).collect(),
        })
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn process(&mut self, _frame: &AudioFrame) -> Result<Option<TranscriptPart>> {
        Ok(None)
    }

    async fn finalize(&mut self) -> Result<TranscriptPart> {
        Ok(TranscriptPart {
            text: self.utterances.pop_front().unwrap_or_default(),
            confidence: 0.95,
        })
    }

    fn reset(&mut self) {}
}

/// Generator that optionally requests a search before answering
struct ScriptedGenerator {
    use_tools: bool,
    delay: Duration,
}

#[async_trait]
impl TurnGenerator for ScriptedGenerator {
    async fn generate(&self, request: TurnRequest) -> Result<GeneratedTurn> {
        tokio::time::sleep(self.delay).await;

        if self.use_tools && request.tool_results.is_empty() {
            let mut args = std::collections::HashMap::new();
            args.insert("query".to_string(), serde_json::json!("gaming laptop"));
            args.insert("max_price".to_string(), serde_json::json!(1500));
            return Ok(GeneratedTurn {
                text: String::new(),
                tool_calls: vec![ToolCallRequest::new("search_products", args)],
            });
        }

        if self.use_tools {
            let count = request.tool_results[0].payload["results_count"]
                .as_u64()
                .unwrap_or(0);
            return Ok(GeneratedTurn::text_only(format!(
                "I found {count} great laptops."
            )));
        }

        Ok(GeneratedTurn::text_only(format!(
            "echo: {}",
            request.user_text
        )))
    }

    fn model_name(&self) -> &str {
        "scripted-generator"
    }
}

/// Synthesizer producing one short audio frame per response
struct ToneSynthesizer;

#[async_trait]
impl SpeechSynthesizer for ToneSynthesizer {
    async fn synthesize(&mut self, _text: &str) -> Result<Vec<AudioFrame>> {
        Ok(vec![AudioFrame::new(
            vec![0.1; 160],
            SampleRate::Hz16000,
            Channels::Mono,
            0,
        )])
    }
}

fn audio_frame(sequence: u64) -> Frame {
    Frame::AudioInput(AudioFrame::new(
        vec![0.2; 320],
        SampleRate::Hz16000,
        Channels::Mono,
        sequence,
    ))
}

struct TestHarness {
    gateway: Arc<StubActionGateway>,
    logger: Arc<ConversationLogger>,
    pipeline: SessionPipeline,
}

fn build_harness(
    detector_script: Vec<VadEvent>,
    utterances: Vec<&str>,
    use_tools: bool,
    generator_delay: Duration,
) -> TestHarness {
    let gateway = Arc::new(StubActionGateway::new().with_results_count(3));
    let logger = Arc::new(ConversationLogger::new("s1", gateway.clone()));
    let dispatcher = Arc::new(ToolDispatcher::new(
        "s1",
        "u1",
        gateway.clone(),
        logger.clone(),
    ));

    let stages = standard_stages(
        ScriptedDetector::new(detector_script),
        ScriptedTranscriber::new(utterances),
        Arc::new(ScriptedGenerator {
            use_tools,
            delay: generator_delay,
        }),
        Box::new(ToneSynthesizer),
        dispatcher,
        logger.clone(),
    );

    let pipeline = SessionPipeline::new(StageContext::new("s1", "u1"), stages).unwrap();
    TestHarness {
        gateway,
        logger,
        pipeline,
    }
}

#[tokio::test]
async fn test_search_turn_end_to_end() {
    let harness = build_harness(
        vec![
            VadEvent::SpeechStart,
            VadEvent::Speech,
            VadEvent::SpeechEnd { duration_ms: 600 },
        ],
        vec!["find me a gaming laptop"],
        true,
        Duration::ZERO,
    );

    let mut running = harness.pipeline.run();
    let mut output = running.take_output();
    for i in 0..3 {
        running.input.send(audio_frame(i)).await.unwrap();
    }
    running.input.send(Frame::EndOfStream).await.unwrap();

    let mut agent_texts = Vec::new();
    let mut audio_frames = 0;
    let mut saw_transcript = false;
    while let Some(frame) = output.recv().await {
        match frame {
            Frame::AgentChunk { text, .. } => agent_texts.push(text),
            Frame::AgentAudio { .. } => audio_frames += 1,
            Frame::TranscriptFinal { ref text, .. } => {
                assert_eq!(text, "find me a gaming laptop");
                saw_transcript = true;
            }
            _ => {}
        }
    }

    assert_eq!(running.wait().await, PipelineOutcome::Completed);
    assert!(saw_transcript);
    assert_eq!(agent_texts, vec!["I found 3 great laptops.".to_string()]);
    assert!(audio_frames >= 1);

    // The backend search carried the price filter as a preferences object
    let search = harness
        .gateway
        .calls()
        .into_iter()
        .find_map(|c| match c {
            RecordedCall::Search(req) => Some(req),
            _ => None,
        })
        .expect("search dispatched");
    assert_eq!(search.query, "gaming laptop");
    assert_eq!(
        search.filters.to_preferences().unwrap(),
        serde_json::json!({ "maxPrice": 1500.0 })
    );

    // Turns logged in causal order: user, system action summary, agent
    harness.logger.flush().await;
    let turns = harness.gateway.logged_turns();
    let texts: Vec<(Speaker, String)> = turns
        .into_iter()
        .map(|t| (t.speaker, t.text))
        .collect();
    assert_eq!(
        texts,
        vec![
            (Speaker::User, "find me a gaming laptop".to_string()),
            (Speaker::System, "Searched for: gaming laptop".to_string()),
            (Speaker::Agent, "I found 3 great laptops.".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_barge_in_abandons_inflight_turn() {
    let harness = build_harness(
        vec![
            VadEvent::SpeechStart,
            VadEvent::SpeechEnd { duration_ms: 400 },
            VadEvent::SpeechStart,
            VadEvent::SpeechEnd { duration_ms: 400 },
        ],
        vec!["find me a gaming laptop", "actually show me desktops"],
        false,
        Duration::from_millis(300),
    );

    let mut running = harness.pipeline.run();
    let mut output = running.take_output();

    // First utterance; generation takes 300 ms
    running.input.send(audio_frame(0)).await.unwrap();
    running.input.send(audio_frame(1)).await.unwrap();

    // Barge in while the first response is still being generated
    tokio::time::sleep(Duration::from_millis(100)).await;
    running.input.send(audio_frame(2)).await.unwrap();
    running.input.send(audio_frame(3)).await.unwrap();
    running.input.send(Frame::EndOfStream).await.unwrap();

    let mut agent_texts = Vec::new();
    let mut barge_ins = 0;
    while let Some(frame) = output.recv().await {
        match frame {
            Frame::AgentChunk { text, .. } => agent_texts.push(text),
            Frame::BargeIn { .. } => barge_ins += 1,
            _ => {}
        }
    }

    assert_eq!(running.wait().await, PipelineOutcome::Completed);

    // Only the second response was emitted; the first was abandoned
    assert_eq!(
        agent_texts,
        vec!["echo: actually show me desktops".to_string()]
    );
    assert!(barge_ins >= 1);

    // No agent turn was recorded for the abandoned response
    harness.logger.flush().await;
    let turns = harness.gateway.logged_turns();
    let agent_turns: Vec<String> = turns
        .iter()
        .filter(|t| t.speaker == Speaker::Agent)
        .map(|t| t.text.clone())
        .collect();
    assert_eq!(agent_turns, vec!["echo: actually show me desktops".to_string()]);

    let user_turns = turns.iter().filter(|t| t.speaker == Speaker::User).count();
    assert_eq!(user_turns, 2);
}

#[tokio::test]
async fn test_backend_failure_narrated_not_fatal() {
    let gateway = Arc::new(StubActionGateway::new().failing_search());
    let logger = Arc::new(ConversationLogger::new("s1", gateway.clone()));
    let dispatcher = Arc::new(ToolDispatcher::new(
        "s1",
        "u1",
        gateway.clone(),
        logger.clone(),
    ));

    /// Generator that narrates a failed tool result
    struct NarratingGenerator;

    #[async_trait]
    impl TurnGenerator for NarratingGenerator {
        async fn generate(&self, request: TurnRequest) -> Result<GeneratedTurn> {
            if request.tool_results.is_empty() {
                let mut args = std::collections::HashMap::new();
                args.insert("query".to_string(), serde_json::json!("laptop"));
                return Ok(GeneratedTurn {
                    text: String::new(),
                    tool_calls: vec![ToolCallRequest::new("search_products", args)],
                });
            }
            let result = &request.tool_results[0];
            assert!(!result.success);
            Ok(GeneratedTurn::text_only(
                "Sorry, I couldn't search right now. Want me to try again?",
            ))
        }

        fn model_name(&self) -> &str {
            "narrating-generator"
        }
    }

    let stages = standard_stages(
        ScriptedDetector::new(vec![
            VadEvent::SpeechStart,
            VadEvent::SpeechEnd { duration_ms: 300 },
        ]),
        ScriptedTranscriber::new(vec!["find a laptop"]),
        Arc::new(NarratingGenerator),
        Box::new(ToneSynthesizer),
        dispatcher,
        logger.clone(),
    );
    let pipeline = SessionPipeline::new(StageContext::new("s1", "u1"), stages).unwrap();

    let mut running = pipeline.run();
    let mut output = running.take_output();
    running.input.send(audio_frame(0)).await.unwrap();
    running.input.send(audio_frame(1)).await.unwrap();
    running.input.send(Frame::EndOfStream).await.unwrap();

    let mut agent_texts = Vec::new();
    while let Some(frame) = output.recv().await {
        if let Frame::AgentChunk { text, .. } = frame {
            agent_texts.push(text);
        }
    }

    // The session completed normally despite the backend failure
    assert_eq!(running.wait().await, PipelineOutcome::Completed);
    assert_eq!(agent_texts.len(), 1);
    assert!(agent_texts[0].contains("try again"));
}
