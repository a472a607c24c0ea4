//! Environment-derived configuration
//!
//! All configuration comes from environment variables; there is no file
//! format. Required values are validated together at startup so the
//! diagnostic lists every missing variable at once, and a missing value is a
//! fatal startup error rather than a runtime fault.

mod settings;

pub use settings::{
    BackendSettings, ConfigError, ObservabilitySettings, ServerSettings, Settings, SpeechSettings,
};
