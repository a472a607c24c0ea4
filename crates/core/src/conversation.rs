//! Conversation turns and speakers
//!
//! Turns are append-only records shipped to the backend store; they are
//! never read back by this system.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall-clock time as Unix epoch milliseconds
pub fn epoch_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Speaker attribution for a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// The human on the other end of the connection
    User,
    /// The voice agent
    Agent,
    /// Orchestrator-generated records (tool dispatches, session errors)
    System,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Agent => "agent",
            Speaker::System => "system",
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single turn in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Session this turn belongs to
    pub session_id: String,
    /// Who spoke
    pub speaker: Speaker,
    /// What was said (or done, for system turns)
    pub text: String,
    /// Wall-clock Unix epoch milliseconds
    pub timestamp_ms: i64,
}

impl ConversationTurn {
    /// Create a new turn stamped with the current wall clock
    pub fn new(session_id: impl Into<String>, speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            speaker,
            text: text.into(),
            timestamp_ms: epoch_millis(),
        }
    }

    /// Create a user turn
    pub fn user(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(session_id, Speaker::User, text)
    }

    /// Create an agent turn
    pub fn agent(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(session_id, Speaker::Agent, text)
    }

    /// Create a system turn
    pub fn system(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(session_id, Speaker::System, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_creation() {
        let turn = ConversationTurn::user("s1", "I need a new laptop");
        assert_eq!(turn.speaker, Speaker::User);
        assert_eq!(turn.session_id, "s1");
        // A real epoch timestamp, not a placeholder constant
        assert!(turn.timestamp_ms > 1_600_000_000_000);
    }

    #[test]
    fn test_speaker_serde() {
        let json = serde_json::to_string(&Speaker::System).unwrap();
        assert_eq!(json, "\"system\"");
    }
}
