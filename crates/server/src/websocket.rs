//! WebSocket session handler
//!
//! One connection runs one session: accept resolves identity, the pipeline
//! and dispatcher are built bound to it, and every exit path — clean end,
//! disconnect, or pipeline failure — runs the same teardown: cancel, record
//! any session error, flush the conversation log, mark the session ended.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use voice_shopper_core::{AudioFrame, Frame, SampleRate, Speaker, StageContext};
use voice_shopper_gateway::ConversationLogger;
use voice_shopper_pipeline::{
    standard_stages, CartesiaSynthesizer, EnergyDetector, NullTranscriber, PipelineOutcome,
    RunningPipeline, SessionPipeline,
};
use voice_shopper_tools::ToolDispatcher;

use crate::session::{ConnectParams, Session, SessionState};
use crate::state::AppState;

/// How long teardown waits for the pipeline before forcing cancellation
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// WebSocket message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Audio data (base64 PCM), client to server
    Audio { data: String },
    /// Text input, client to server
    Text { content: String },
    /// Transcript update
    Transcript { text: String, is_final: bool },
    /// Agent text response
    Response { text: String },
    /// Agent audio response (base64 PCM)
    ResponseAudio { data: String },
    /// Status update
    Status { state: String, stage: String },
    /// Error report
    Error { message: String },
    /// Ping/Pong
    Ping,
    Pong,
    /// Session info sent on connect
    SessionInfo { session_id: String },
    /// Explicit end of session from the client
    EndSession,
}

/// Query parameters on the WebSocket URL
#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

type WsSender = Arc<tokio::sync::Mutex<SplitSink<WebSocket, Message>>>;

async fn send_message(sender: &WsSender, message: &WsMessage) {
    if let Ok(json) = serde_json::to_string(message) {
        let mut s = sender.lock().await;
        let _ = s.send(Message::Text(json)).await;
    }
}

/// WebSocket handler
pub struct WebSocketHandler;

impl WebSocketHandler {
    /// Handle WebSocket upgrade
    pub async fn handle(
        ws: WebSocketUpgrade,
        Query(query): Query<ConnectQuery>,
        State(state): State<AppState>,
    ) -> Result<Response, StatusCode> {
        let session = state
            .sessions
            .accept(ConnectParams {
                session_id: query.session_id,
                user_id: query.user_id,
            })
            .map_err(|e| {
                tracing::warn!(error = %e, "Connection rejected");
                StatusCode::from(e)
            })?;

        Ok(ws.on_upgrade(move |socket| Self::handle_socket(socket, session, state)))
    }

    /// Run one session over its socket
    async fn handle_socket(socket: WebSocket, session: Arc<Session>, state: AppState) {
        let (sender, mut receiver) = socket.split();
        let sender: WsSender = Arc::new(tokio::sync::Mutex::new(sender));

        let logger = Arc::new(ConversationLogger::new(&session.id, state.gateway.clone()));

        let mut running = match Self::launch_pipeline(&session, &state, logger.clone()) {
            Ok(running) => running,
            Err(e) => {
                tracing::error!(session_id = %session.id, error = %e, "Failed to build pipeline");
                send_message(
                    &sender,
                    &WsMessage::Error {
                        message: "Session could not be started".to_string(),
                    },
                )
                .await;
                logger.flush().await;
                state.sessions.remove(&session.id);
                return;
            }
        };
        session.attach_canceller(running.canceller());
        session.advance_state(SessionState::Active);

        send_message(
            &sender,
            &WsMessage::SessionInfo {
                session_id: session.id.clone(),
            },
        )
        .await;
        send_message(
            &sender,
            &WsMessage::Status {
                state: "active".to_string(),
                stage: "ready".to_string(),
            },
        )
        .await;

        // Forward pipeline output to the client
        let output = running.take_output();
        let forward_task = tokio::spawn(Self::forward_output(output, sender.clone()));

        // Main receive loop: client messages become pipeline frames
        let mut audio_sequence: u64 = 0;
        while let Some(message) = receiver.next().await {
            let frames = match message {
                Ok(Message::Text(text)) => {
                    session.touch();
                    match serde_json::from_str::<WsMessage>(&text) {
                        Ok(ws_msg) => {
                            Self::frames_for_message(ws_msg, &sender, &mut audio_sequence).await
                        }
                        Err(e) => {
                            tracing::debug!(session_id = %session.id, error = %e, "Unparseable message");
                            continue;
                        }
                    }
                }
                Ok(Message::Binary(data)) => {
                    session.touch();
                    let frame = AudioFrame::from_pcm16(&data, SampleRate::Hz16000, audio_sequence);
                    audio_sequence += 1;
                    ClientFrames::Forward(vec![Frame::AudioInput(frame)])
                }
                Ok(Message::Ping(data)) => {
                    let mut s = sender.lock().await;
                    let _ = s.send(Message::Pong(data)).await;
                    continue;
                }
                Ok(Message::Close(_)) => ClientFrames::End,
                Err(e) => {
                    tracing::warn!(session_id = %session.id, error = %e, "WebSocket error");
                    ClientFrames::End
                }
                _ => continue,
            };

            match frames {
                ClientFrames::Forward(frames) => {
                    let mut pipeline_gone = false;
                    for frame in frames {
                        if running.input.send(frame).await.is_err() {
                            pipeline_gone = true;
                            break;
                        }
                    }
                    if pipeline_gone {
                        tracing::info!(session_id = %session.id, "Pipeline stopped, closing socket");
                        break;
                    }
                }
                ClientFrames::End => break,
            }
        }

        // Teardown, common to every exit path
        session.advance_state(SessionState::Ending);
        let _ = running.input.send(Frame::EndOfStream).await;

        let canceller = running.canceller();
        let wait = running.wait();
        tokio::pin!(wait);
        let outcome = tokio::select! {
            outcome = &mut wait => outcome,
            _ = tokio::time::sleep(SHUTDOWN_GRACE) => {
                tracing::warn!(session_id = %session.id, "Pipeline shutdown timed out, cancelling");
                canceller.cancel();
                wait.await
            }
        };

        if let PipelineOutcome::Failed { stage, message } = &outcome {
            tracing::error!(
                session_id = %session.id,
                stage = %stage,
                error = %message,
                "Session ended with error"
            );
            logger.record(Speaker::System, format!("Session error: {message}"));
            send_message(
                &sender,
                &WsMessage::Error {
                    message: "The session hit an internal error and has ended.".to_string(),
                },
            )
            .await;
        }

        logger.flush().await;
        let _ = tokio::time::timeout(Duration::from_secs(2), forward_task).await;
        state.sessions.remove(&session.id);

        tracing::info!(session_id = %session.id, outcome = ?outcome, "Session closed");
    }

    /// Build and start the stage chain for one session
    fn launch_pipeline(
        session: &Arc<Session>,
        state: &AppState,
        logger: Arc<ConversationLogger>,
    ) -> Result<RunningPipeline, crate::ServerError> {
        let dispatcher = Arc::new(ToolDispatcher::new(
            &session.id,
            &session.user_id,
            state.gateway.clone(),
            logger.clone(),
        ));

        let synthesizer = Box::new(CartesiaSynthesizer::new(
            state.http_client.clone(),
            state.settings.speech.tts_api_key.clone(),
        ));

        let stages = standard_stages(
            Box::new(EnergyDetector::default()),
            Box::new(NullTranscriber::new()),
            state.generator.clone(),
            synthesizer,
            dispatcher,
            logger,
        );

        let ctx = StageContext::new(&session.id, &session.user_id);
        let pipeline = SessionPipeline::new(ctx, stages)
            .map_err(|e| crate::ServerError::Internal(e.to_string()))?;

        Ok(pipeline.run())
    }

    /// Translate one client message into pipeline frames
    async fn frames_for_message(
        message: WsMessage,
        sender: &WsSender,
        audio_sequence: &mut u64,
    ) -> ClientFrames {
        match message {
            WsMessage::Audio { data } => match BASE64.decode(&data) {
                Ok(bytes) => {
                    let frame = AudioFrame::from_pcm16(&bytes, SampleRate::Hz16000, *audio_sequence);
                    *audio_sequence += 1;
                    ClientFrames::Forward(vec![Frame::AudioInput(frame)])
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to decode audio payload");
                    ClientFrames::Forward(Vec::new())
                }
            },
            WsMessage::Text { content } => {
                if content.trim().is_empty() {
                    return ClientFrames::Forward(Vec::new());
                }
                // Text input takes the same path as a spoken utterance; the
                // voice-start marker makes it interrupt an in-flight turn
                ClientFrames::Forward(vec![
                    Frame::VoiceStart,
                    Frame::TranscriptFinal {
                        text: content,
                        confidence: 1.0,
                    },
                ])
            }
            WsMessage::Ping => {
                send_message(sender, &WsMessage::Pong).await;
                ClientFrames::Forward(Vec::new())
            }
            WsMessage::EndSession => ClientFrames::End,
            _ => ClientFrames::Forward(Vec::new()),
        }
    }

    /// Forward pipeline output frames to the client
    async fn forward_output(
        mut output: tokio::sync::mpsc::Receiver<Frame>,
        sender: WsSender,
    ) {
        while let Some(frame) = output.recv().await {
            let message = match frame {
                Frame::TranscriptPartial { text, .. } => Some(WsMessage::Transcript {
                    text,
                    is_final: false,
                }),
                Frame::TranscriptFinal { text, .. } => Some(WsMessage::Transcript {
                    text,
                    is_final: true,
                }),
                Frame::AgentChunk { text, is_final, .. } => {
                    if is_final && !text.is_empty() {
                        Some(WsMessage::Response { text })
                    } else {
                        None
                    }
                }
                Frame::AgentAudio { frame, .. } => Some(WsMessage::ResponseAudio {
                    data: BASE64.encode(frame.to_pcm16()),
                }),
                Frame::BargeIn { .. } => Some(WsMessage::Status {
                    state: "interrupted".to_string(),
                    stage: "barge_in".to_string(),
                }),
                Frame::VoiceStart => Some(WsMessage::Status {
                    state: "listening".to_string(),
                    stage: "speech_detected".to_string(),
                }),
                Frame::VoiceEnd { .. } => Some(WsMessage::Status {
                    state: "processing".to_string(),
                    stage: "speech_ended".to_string(),
                }),
                Frame::Error { message, .. } => Some(WsMessage::Error { message }),
                Frame::EndOfStream => break,
                _ => None,
            };

            if let Some(message) = message {
                send_message(&sender, &message).await;
            }
        }
    }
}

/// What a client message asks the session loop to do
enum ClientFrames {
    /// Send these frames into the pipeline
    Forward(Vec<Frame>),
    /// Close the session
    End,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_message_wire_format() {
        let msg: WsMessage = serde_json::from_str(r#"{"type":"text","content":"hi"}"#).unwrap();
        assert!(matches!(msg, WsMessage::Text { ref content } if content == "hi"));

        let json = serde_json::to_string(&WsMessage::Status {
            state: "active".to_string(),
            stage: "ready".to_string(),
        })
        .unwrap();
        assert!(json.contains(r#""type":"status""#));
    }

    #[test]
    fn test_audio_payload_round_trip() {
        let pcm: Vec<u8> = [100i16, -100, 2000, -2000]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let encoded = BASE64.encode(&pcm);
        let decoded = BASE64.decode(&encoded).unwrap();
        let frame = AudioFrame::from_pcm16(&decoded, SampleRate::Hz16000, 0);
        assert_eq!(frame.samples.len(), 4);
        assert_eq!(frame.to_pcm16(), pcm);
    }
}
