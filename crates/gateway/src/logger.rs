//! Best-effort conversation logging
//!
//! Turns are queued onto a bounded channel and drained by a single background
//! task per session, so submission order is preserved without ever blocking
//! the live conversation. A turn that fails to persist is dropped
//! (at-most-once, no retry); so is a turn recorded while the queue is full.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

use voice_shopper_core::{ConversationTurn, Speaker};

use crate::gateway::ActionGateway;

/// Queue capacity; a full queue drops turns rather than blocking
const QUEUE_CAPACITY: usize = 256;

/// How long teardown waits for the drain task to finish
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Fire-and-forget recorder of conversation turns for one session
pub struct ConversationLogger {
    session_id: String,
    tx: Mutex<Option<mpsc::Sender<ConversationTurn>>>,
    drain: Mutex<Option<JoinHandle<()>>>,
}

impl ConversationLogger {
    /// Create a logger bound to a session, spawning its drain task
    pub fn new(session_id: impl Into<String>, gateway: Arc<dyn ActionGateway>) -> Self {
        let session_id = session_id.into();
        let (tx, mut rx) = mpsc::channel::<ConversationTurn>(QUEUE_CAPACITY);

        let drain_session = session_id.clone();
        let drain = tokio::spawn(async move {
            while let Some(turn) = rx.recv().await {
                if let Err(e) = gateway.log_turn(&turn).await {
                    // Logging must never disturb the conversation
                    tracing::debug!(
                        session_id = %drain_session,
                        speaker = %turn.speaker,
                        error = %e,
                        "Failed to persist conversation turn"
                    );
                }
            }
        });

        Self {
            session_id,
            tx: Mutex::new(Some(tx)),
            drain: Mutex::new(Some(drain)),
        }
    }

    /// Record a turn; never blocks, never fails
    pub fn record(&self, speaker: Speaker, text: impl Into<String>) {
        let turn = ConversationTurn::new(&self.session_id, speaker, text);

        let tx = self.tx.lock();
        let Some(sender) = tx.as_ref() else {
            tracing::debug!(session_id = %self.session_id, "Logger already flushed, turn dropped");
            return;
        };

        if let Err(e) = sender.try_send(turn) {
            tracing::debug!(
                session_id = %self.session_id,
                error = %e,
                "Conversation log queue full, turn dropped"
            );
        }
    }

    /// Close the queue and wait for queued turns to drain
    ///
    /// Called during session teardown. Safe to call more than once.
    pub async fn flush(&self) {
        // Dropping the sender lets the drain task exit after the last turn
        self.tx.lock().take();

        let handle = self.drain.lock().take();
        if let Some(handle) = handle {
            if timeout(FLUSH_TIMEOUT, handle).await.is_err() {
                tracing::warn!(
                    session_id = %self.session_id,
                    "Conversation log flush timed out"
                );
            }
        }
    }

    /// Session this logger is bound to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}
