//! Session management
//!
//! One session per connection, owned by the `SessionManager`. Session state
//! only moves forward (Starting → Active → Ending → Ended); no state is ever
//! revisited and ids are never reused.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use voice_shopper_core::epoch_millis;
use voice_shopper_pipeline::PipelineCanceller;

use crate::ServerError;

/// Session lifecycle state; transitions are monotonic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Active,
    Ending,
    Ended,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Ending => "ending",
            SessionState::Ended => "ended",
        }
    }
}

/// Identity material from the incoming connection
#[derive(Debug, Clone, Default)]
pub struct ConnectParams {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

/// One voice/text conversation over one connection
pub struct Session {
    /// Session ID
    pub id: String,
    /// User ID
    pub user_id: String,
    /// Wall-clock creation time (epoch milliseconds)
    pub created_at_ms: i64,
    /// Creation instant for expiry checks
    created_at: Instant,
    state: RwLock<SessionState>,
    last_activity: RwLock<Instant>,
    canceller: Mutex<Option<PipelineCanceller>>,
}

impl Session {
    fn new(id: String, user_id: String) -> Self {
        Self {
            id,
            user_id,
            created_at_ms: epoch_millis(),
            created_at: Instant::now(),
            state: RwLock::new(SessionState::Starting),
            last_activity: RwLock::new(Instant::now()),
            canceller: Mutex::new(None),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Advance to a later state; returns false if the transition would go
    /// backwards or stand still
    pub fn advance_state(&self, to: SessionState) -> bool {
        let mut state = self.state.write();
        if to <= *state {
            tracing::warn!(
                session_id = %self.id,
                from = %state.as_str(),
                to = %to.as_str(),
                "Rejected non-monotonic session state transition"
            );
            return false;
        }
        tracing::debug!(
            session_id = %self.id,
            from = %state.as_str(),
            to = %to.as_str(),
            "Session state transition"
        );
        *state = to;
        true
    }

    /// Attach the running pipeline's cancel handle
    pub fn attach_canceller(&self, canceller: PipelineCanceller) {
        *self.canceller.lock() = Some(canceller);
    }

    /// Cancel the pipeline, if one is running
    pub fn cancel_pipeline(&self) {
        if let Some(canceller) = self.canceller.lock().take() {
            canceller.cancel();
        }
    }

    /// Update last activity
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Check if the session has been idle past the timeout
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }

    /// Session age
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Whether the session has not yet ended
    pub fn is_live(&self) -> bool {
        self.state() < SessionState::Ended
    }
}

/// Generate an id as `<prefix>_<epoch-ms>_<random-suffix>`
///
/// The timestamp keeps ids unique over time; the random suffix guards
/// against collisions within the same millisecond.
fn generate_id(prefix: &str) -> String {
    let suffix: u32 = rand::random::<u32>() & 0xff_ffff;
    format!("{prefix}_{}_{suffix:06x}", epoch_millis())
}

/// Creates, tracks, and tears down sessions
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    max_sessions: usize,
    session_timeout: Duration,
    cleanup_interval: Duration,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(max_sessions: usize) -> Self {
        Self::with_config(
            max_sessions,
            Duration::from_secs(3600),
            Duration::from_secs(300),
        )
    }

    /// Create with custom timeout and cleanup interval
    pub fn with_config(
        max_sessions: usize,
        session_timeout: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
            session_timeout,
            cleanup_interval,
        }
    }

    /// Accept a connection, resolving or generating its identity
    ///
    /// Guarantees at most one active session per id. Ids absent from the
    /// connection metadata are generated server-side.
    pub fn accept(&self, params: ConnectParams) -> Result<Arc<Session>, ServerError> {
        let session_id = match params.session_id {
            Some(id) if !id.is_empty() => id,
            _ => {
                let id = generate_id("session");
                tracing::info!(session_id = %id, "No sessionId provided, generated one");
                id
            }
        };
        let user_id = match params.user_id {
            Some(id) if !id.is_empty() => id,
            _ => {
                let id = generate_id("user");
                tracing::info!(user_id = %id, "No userId provided, generated one");
                id
            }
        };

        let mut sessions = self.sessions.write();

        if sessions.len() >= self.max_sessions {
            self.cleanup_expired_internal(&mut sessions);
            if sessions.len() >= self.max_sessions {
                return Err(ServerError::Session("Max sessions reached".to_string()));
            }
        }

        if sessions.contains_key(&session_id) {
            return Err(ServerError::Session(format!(
                "Session {session_id} is already active"
            )));
        }

        let session = Arc::new(Session::new(session_id.clone(), user_id));
        sessions.insert(session_id.clone(), session.clone());

        tracing::info!(
            session_id = %session.id,
            user_id = %session.user_id,
            active = sessions.len(),
            "Session accepted"
        );
        crate::metrics::record_session_started();

        Ok(session)
    }

    /// Get a session by ID
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Remove a session, cancelling its pipeline and marking it ended
    pub fn remove(&self, id: &str) {
        let session = self.sessions.write().remove(id);
        if let Some(session) = session {
            session.cancel_pipeline();
            session.advance_state(SessionState::Ended);
            crate::metrics::record_session_ended();
            tracing::info!(session_id = %id, "Session removed");
        }
    }

    /// Active session count
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// List session IDs
    pub fn list(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Remove sessions idle past the timeout
    pub fn cleanup_expired(&self) {
        let mut sessions = self.sessions.write();
        self.cleanup_expired_internal(&mut sessions);
    }

    fn cleanup_expired_internal(&self, sessions: &mut HashMap<String, Arc<Session>>) {
        let timeout = self.session_timeout;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_expired(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            if let Some(session) = sessions.remove(&id) {
                session.cancel_pipeline();
                session.advance_state(SessionState::Ended);
                crate::metrics::record_session_ended();
                tracing::info!(session_id = %id, "Expired session removed");
            }
        }
    }

    /// Start a background task that periodically removes expired sessions
    ///
    /// Returns a shutdown sender for stopping the task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);
        let interval = manager.cleanup_interval;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let before = manager.count();
                        manager.cleanup_expired();
                        let after = manager.count();
                        if before != after {
                            tracing::info!(
                                removed = before - after,
                                remaining = after,
                                "Session cleanup pass"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("Session cleanup task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_with_provided_identity() {
        let manager = SessionManager::new(10);
        let session = manager
            .accept(ConnectParams {
                session_id: Some("s1".to_string()),
                user_id: Some("u1".to_string()),
            })
            .unwrap();

        assert_eq!(session.id, "s1");
        assert_eq!(session.user_id, "u1");
        assert_eq!(session.state(), SessionState::Starting);
    }

    #[test]
    fn test_generated_ids_match_pattern() {
        let manager = SessionManager::new(10);
        let session = manager.accept(ConnectParams::default()).unwrap();

        assert!(session.id.starts_with("session_"));
        assert!(session.user_id.starts_with("user_"));

        // prefix_timestamp_suffix
        let parts: Vec<&str> = session.id.splitn(3, '_').collect();
        assert_eq!(parts.len(), 3);
        let timestamp: i64 = parts[1].parse().unwrap();
        assert!(timestamp > 1_600_000_000_000);
        assert!(!parts[2].is_empty());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let manager = SessionManager::new(100);
        let mut ids = std::collections::HashSet::new();
        for _ in 0..50 {
            let session = manager.accept(ConnectParams::default()).unwrap();
            assert!(ids.insert(session.id.clone()), "duplicate id {}", session.id);
        }
    }

    #[test]
    fn test_duplicate_session_id_rejected() {
        let manager = SessionManager::new(10);
        let params = ConnectParams {
            session_id: Some("s1".to_string()),
            user_id: None,
        };
        manager.accept(params.clone()).unwrap();
        assert!(manager.accept(params).is_err());
    }

    #[test]
    fn test_capacity_enforced() {
        let manager = SessionManager::new(2);
        manager.accept(ConnectParams::default()).unwrap();
        manager.accept(ConnectParams::default()).unwrap();
        assert!(manager.accept(ConnectParams::default()).is_err());
    }

    #[test]
    fn test_state_transitions_are_monotonic() {
        let manager = SessionManager::new(10);
        let session = manager.accept(ConnectParams::default()).unwrap();

        assert!(session.advance_state(SessionState::Active));
        assert!(session.advance_state(SessionState::Ending));
        assert!(session.advance_state(SessionState::Ended));

        // No state is ever revisited
        assert!(!session.advance_state(SessionState::Active));
        assert!(!session.advance_state(SessionState::Ended));
        assert_eq!(session.state(), SessionState::Ended);
    }

    #[test]
    fn test_remove_ends_session() {
        let manager = SessionManager::new(10);
        let session = manager.accept(ConnectParams::default()).unwrap();
        let id = session.id.clone();

        manager.remove(&id);
        assert!(manager.get(&id).is_none());
        assert_eq!(session.state(), SessionState::Ended);
        assert!(!session.is_live());
    }

    #[test]
    fn test_expired_cleanup() {
        let manager =
            SessionManager::with_config(10, Duration::from_millis(0), Duration::from_secs(1));
        let session = manager.accept(ConnectParams::default()).unwrap();
        let id = session.id.clone();

        std::thread::sleep(Duration::from_millis(5));
        manager.cleanup_expired();
        assert!(manager.get(&id).is_none());
    }
}
