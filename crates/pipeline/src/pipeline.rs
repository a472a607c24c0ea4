//! The per-session stage chain
//!
//! Frames flow stage to stage in ordering-index order. Each stage runs in
//! its own tokio task; when one stage stops (end of stream, fatal error, or
//! cancellation), its channels close and the rest of the chain collapses
//! within one hop in each direction. After all stage tasks have stopped, the
//! supervisor invokes `on_cancel` on every stage in reverse order so
//! resources are released deterministically.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use voice_shopper_core::{Frame, PipelineStage, StageContext, StageDescriptor, StageKind};

use crate::PipelineError;

/// Capacity of the channels linking adjacent stages
pub const CHANNEL_CAPACITY: usize = 64;

/// How a pipeline run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Input stage signalled end of session
    Completed,
    /// External cancellation
    Cancelled,
    /// A stage failed irrecoverably
    Failed { stage: String, message: String },
}

/// Cloneable out-of-band cancel signal for a running pipeline
#[derive(Clone)]
pub struct PipelineCanceller {
    cancel: Arc<watch::Sender<bool>>,
}

impl PipelineCanceller {
    /// Request cooperative cancellation
    ///
    /// Every stage task observes the signal at its next suspension point.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }
}

/// An ordered chain of stages for one session
pub struct SessionPipeline {
    ctx: StageContext,
    stages: Vec<Box<dyn PipelineStage>>,
}

impl SessionPipeline {
    /// Build a pipeline, validating stage order
    ///
    /// Stages must arrive in strictly increasing `ordering_index` order and
    /// the chain must contain exactly one generator.
    pub fn new(
        ctx: StageContext,
        stages: Vec<Box<dyn PipelineStage>>,
    ) -> Result<Self, PipelineError> {
        if stages.is_empty() {
            return Err(PipelineError::Empty);
        }

        let mut last_index: Option<u8> = None;
        for stage in &stages {
            let desc = stage.descriptor();
            if let Some(last) = last_index {
                if desc.ordering_index <= last {
                    return Err(PipelineError::InvalidOrder(format!(
                        "stage {} has ordering_index {} after {}",
                        desc.name, desc.ordering_index, last
                    )));
                }
            }
            last_index = Some(desc.ordering_index);
        }

        let generators = stages
            .iter()
            .filter(|s| s.descriptor().kind == StageKind::Generator)
            .count();
        if generators != 1 {
            return Err(PipelineError::GeneratorCount(generators));
        }

        Ok(Self { ctx, stages })
    }

    /// Stage descriptors in execution order
    pub fn descriptors(&self) -> Vec<StageDescriptor> {
        self.stages.iter().map(|s| s.descriptor()).collect()
    }

    /// Spawn the stage tasks and start processing
    pub fn run(self) -> RunningPipeline {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);

        let (input_tx, mut next_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);

        let session_id = self.ctx.session_id.clone();
        let stage_count = self.stages.len();
        let mut tasks: Vec<JoinHandle<StageExit>> = Vec::with_capacity(stage_count);

        let mut stages = self.stages.into_iter().peekable();
        let mut output_rx = None;
        while let Some(stage) = stages.next() {
            let (tx, rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);
            let stage_rx = std::mem::replace(&mut next_rx, rx);

            if stages.peek().is_none() {
                output_rx = Some(std::mem::replace(&mut next_rx, mpsc::channel(1).1));
            }

            tasks.push(spawn_stage_task(
                stage,
                stage_rx,
                tx,
                self.ctx.clone(),
                cancel_rx.clone(),
            ));
        }
        let output_rx = output_rx.expect("validated non-empty");

        // Supervisor: waits for every stage task, then tears stages down in
        // reverse ordering-index order.
        let supervisor_cancel = cancel_rx.clone();
        let ctx = self.ctx;
        let done = tokio::spawn(async move {
            let mut exits = Vec::with_capacity(stage_count);
            for task in tasks {
                match task.await {
                    Ok(exit) => exits.push(exit),
                    Err(e) => {
                        tracing::error!(session_id = %ctx.session_id, error = %e, "Stage task panicked");
                    }
                }
            }

            // Reverse-order resource release, regardless of how the run ended
            exits.sort_by(|a, b| b.descriptor.ordering_index.cmp(&a.descriptor.ordering_index));
            let mut failure: Option<(String, String)> = None;
            let mut completed = false;
            for exit in &mut exits {
                if let Err(e) = exit.stage.on_cancel(&ctx).await {
                    tracing::warn!(
                        session_id = %ctx.session_id,
                        stage = exit.descriptor.name,
                        error = %e,
                        "Stage teardown failed"
                    );
                }
                tracing::debug!(
                    session_id = %ctx.session_id,
                    stage = exit.descriptor.name,
                    "Stage released"
                );
                match &exit.reason {
                    ExitReason::Failed(message) => {
                        if failure.is_none() {
                            failure = Some((exit.descriptor.name.to_string(), message.clone()));
                        }
                    }
                    ExitReason::EndOfStream => completed = true,
                    _ => {}
                }
            }

            if let Some((stage, message)) = failure {
                tracing::warn!(session_id = %ctx.session_id, stage = %stage, "Pipeline failed");
                PipelineOutcome::Failed { stage, message }
            } else if *supervisor_cancel.borrow() && !completed {
                tracing::info!(session_id = %ctx.session_id, "Pipeline cancelled");
                PipelineOutcome::Cancelled
            } else {
                tracing::info!(session_id = %ctx.session_id, "Pipeline completed");
                PipelineOutcome::Completed
            }
        });

        tracing::info!(session_id = %session_id, stages = stage_count, "Pipeline started");

        RunningPipeline {
            input: input_tx,
            output: Some(output_rx),
            canceller: PipelineCanceller { cancel: cancel_tx },
            done,
        }
    }
}

/// Handle to a running pipeline
pub struct RunningPipeline {
    /// Frames into the first stage
    pub input: mpsc::Sender<Frame>,
    output: Option<mpsc::Receiver<Frame>>,
    canceller: PipelineCanceller,
    done: JoinHandle<PipelineOutcome>,
}

impl RunningPipeline {
    /// Out-of-band cancel signal, safe to clone across tasks
    pub fn canceller(&self) -> PipelineCanceller {
        self.canceller.clone()
    }

    /// Take the output side of the last stage; panics if taken twice
    pub fn take_output(&mut self) -> mpsc::Receiver<Frame> {
        self.output.take().expect("pipeline output already taken")
    }

    /// Wait for the pipeline to reach a terminal condition
    pub async fn wait(self) -> PipelineOutcome {
        self.done.await.unwrap_or_else(|e| PipelineOutcome::Failed {
            stage: "supervisor".to_string(),
            message: e.to_string(),
        })
    }
}

/// Why a stage task stopped
enum ExitReason {
    /// Upstream closed or downstream went away
    ChannelClosed,
    /// End-of-stream frame processed and forwarded
    EndOfStream,
    /// Cancellation signal observed
    Cancelled,
    /// The stage returned an error or emitted a fatal error frame
    Failed(String),
}

struct StageExit {
    descriptor: StageDescriptor,
    stage: Box<dyn PipelineStage>,
    reason: ExitReason,
}

fn spawn_stage_task(
    mut stage: Box<dyn PipelineStage>,
    mut rx: mpsc::Receiver<Frame>,
    tx: mpsc::Sender<Frame>,
    ctx: StageContext,
    mut cancel_rx: watch::Receiver<bool>,
) -> JoinHandle<StageExit> {
    tokio::spawn(async move {
        let descriptor = stage.descriptor();

        if let Err(e) = stage.on_start(&ctx).await {
            tracing::error!(
                session_id = %ctx.session_id,
                stage = descriptor.name,
                error = %e,
                "Stage failed to start"
            );
            let _ = tx
                .send(Frame::Error {
                    stage: descriptor.name,
                    message: e.to_string(),
                    recoverable: false,
                })
                .await;
            return StageExit {
                descriptor,
                stage,
                reason: ExitReason::Failed(e.to_string()),
            };
        }

        let reason = loop {
            let frame = tokio::select! {
                biased;
                changed = cancel_rx.changed() => {
                    match changed {
                        Ok(()) => {
                            if *cancel_rx.borrow() {
                                break ExitReason::Cancelled;
                            }
                            continue;
                        }
                        // Cancel handle dropped; channel shutdown takes over
                        Err(_) => match rx.recv().await {
                            Some(frame) => frame,
                            None => break ExitReason::ChannelClosed,
                        },
                    }
                }
                frame = rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break ExitReason::ChannelClosed,
                },
            };

            let is_eos = frame.is_end_of_stream();
            let mut forwarded_eos = false;

            match stage.process(frame, &ctx).await {
                Ok(outputs) => {
                    let mut fatal = None;
                    for output in outputs {
                        if let Frame::Error {
                            recoverable: false,
                            message,
                            ..
                        } = &output
                        {
                            fatal = Some(message.clone());
                        }
                        if output.is_end_of_stream() {
                            forwarded_eos = true;
                        }
                        if tx.send(output).await.is_err() {
                            // Downstream stage is gone; collapse this one too
                            break;
                        }
                    }
                    if let Some(message) = fatal {
                        break ExitReason::Failed(message);
                    }
                }
                Err(e) => {
                    tracing::error!(
                        session_id = %ctx.session_id,
                        stage = descriptor.name,
                        error = %e,
                        "Stage error"
                    );
                    let _ = tx
                        .send(Frame::Error {
                            stage: descriptor.name,
                            message: e.to_string(),
                            recoverable: false,
                        })
                        .await;
                    break ExitReason::Failed(e.to_string());
                }
            }

            if is_eos {
                // Make sure the signal reaches the rest of the chain even if
                // the stage swallowed it
                if !forwarded_eos {
                    let _ = tx.send(Frame::EndOfStream).await;
                }
                break ExitReason::EndOfStream;
            }
        };

        tracing::trace!(
            session_id = %ctx.session_id,
            stage = descriptor.name,
            "Stage task stopped"
        );

        StageExit {
            descriptor,
            stage,
            reason,
        }
    })
}
