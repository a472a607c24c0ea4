//! Language-model backends
//!
//! Implementations of the [`TurnGenerator`] trait. The model is an external
//! service; this crate is only the wire client.
//!
//! [`TurnGenerator`]: voice_shopper_core::TurnGenerator

pub mod gemini;

pub use gemini::{GeminiConfig, GeminiTurnGenerator};
