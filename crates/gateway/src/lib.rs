//! Backend action gateway and conversation logging
//!
//! The gateway is the only component that talks to the backend store. Every
//! method converts transport and remote failures into `success = false`
//! outcomes with a human-readable message; failures are never allowed to
//! abort a session.

pub mod gateway;
pub mod logger;

pub use gateway::{
    ActionGateway, HttpActionGateway, PreferencesOutcome, RecordedCall, SaveItemRequest,
    SaveOutcome, SearchFilters, SearchOutcome, SearchRequest, StubActionGateway,
};
pub use logger::ConversationLogger;

use thiserror::Error;

/// Gateway errors
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned status {0}")]
    RemoteStatus(u16),

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("Client construction failed: {0}")]
    Client(String),
}
