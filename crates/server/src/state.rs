//! Application state
//!
//! Shared across all handlers. Settings are immutable after startup; the
//! only cross-session shared resources are the static tool registry, the
//! shared HTTP client pool, and the session manager itself.

use std::sync::Arc;
use std::time::Duration;

use voice_shopper_config::Settings;
use voice_shopper_core::TurnGenerator;
use voice_shopper_gateway::ActionGateway;

use crate::session::SessionManager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration
    pub settings: Arc<Settings>,
    /// Session manager
    pub sessions: Arc<SessionManager>,
    /// Backend action gateway
    pub gateway: Arc<dyn ActionGateway>,
    /// Turn-generation backend, shared across sessions
    pub generator: Arc<dyn TurnGenerator>,
    /// HTTP client pool shared by per-session engines
    pub http_client: reqwest::Client,
}

impl AppState {
    /// Build state from settings and collaborator backends
    pub fn new(
        settings: Settings,
        gateway: Arc<dyn ActionGateway>,
        generator: Arc<dyn TurnGenerator>,
        http_client: reqwest::Client,
    ) -> Self {
        let sessions = Arc::new(SessionManager::with_config(
            settings.server.max_sessions,
            Duration::from_secs(settings.server.session_timeout_secs),
            Duration::from_secs(300),
        ));

        Self {
            settings: Arc::new(settings),
            sessions,
            gateway,
            generator,
            http_client,
        }
    }
}
