//! Settings loaded from the process environment

use std::collections::HashMap;
use thiserror::Error;

/// Configuration errors (fatal at startup)
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    MissingRequired(Vec<String>),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

/// HTTP/WebSocket server settings
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Maximum concurrently active sessions
    pub max_sessions: usize,
    /// Idle session timeout in seconds
    pub session_timeout_secs: u64,
}

/// Backend action API settings
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Base URL for the backend HTTP endpoints
    pub base_url: String,
    /// Shared secret attached to every request
    pub shared_secret: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

/// API keys for the external speech/LLM engines
#[derive(Debug, Clone)]
pub struct SpeechSettings {
    /// Language-model API key
    pub llm_api_key: String,
    /// Speech-synthesis API key
    pub tts_api_key: String,
}

/// Observability settings
#[derive(Debug, Clone)]
pub struct ObservabilitySettings {
    /// Log level filter (trace/debug/info/warn/error)
    pub log_level: String,
    /// Emit JSON-formatted logs
    pub log_json: bool,
}

/// Complete immutable application settings
///
/// Passed by `Arc` into the server and gateway at construction; never
/// mutated after startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub backend: BackendSettings,
    pub speech: SpeechSettings,
    pub observability: ObservabilitySettings,
}

impl Settings {
    /// Load settings from the process environment
    ///
    /// Collects all missing required variables before failing so the
    /// diagnostic names every one of them.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    /// Load settings from an arbitrary lookup (used by tests)
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        const REQUIRED: &[&str] = &[
            "GOOGLE_API_KEY",
            "CARTESIA_API_KEY",
            "CONVEX_HTTP_URL",
            "PIPECAT_SERVER_SECRET",
        ];

        let mut values = HashMap::new();
        let mut missing = Vec::new();
        for name in REQUIRED {
            match lookup(name) {
                Some(value) if !value.is_empty() => {
                    values.insert(*name, value);
                }
                _ => missing.push(name.to_string()),
            }
        }

        if !missing.is_empty() {
            return Err(ConfigError::MissingRequired(missing));
        }

        let port = parse_or_default(lookup, "SERVER_PORT", 8000)?;
        let max_sessions = parse_or_default(lookup, "MAX_SESSIONS", 100)?;
        let session_timeout_secs = parse_or_default(lookup, "SESSION_TIMEOUT_SECS", 3600)?;
        let request_timeout_secs = parse_or_default(lookup, "BACKEND_TIMEOUT_SECS", 30)?;

        // Trailing slashes would double up when joining endpoint paths
        let base_url = values["CONVEX_HTTP_URL"].trim_end_matches('/').to_string();

        Ok(Self {
            server: ServerSettings {
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port,
                max_sessions,
                session_timeout_secs,
            },
            backend: BackendSettings {
                base_url,
                shared_secret: values["PIPECAT_SERVER_SECRET"].clone(),
                request_timeout_secs,
            },
            speech: SpeechSettings {
                llm_api_key: values["GOOGLE_API_KEY"].clone(),
                tts_api_key: values["CARTESIA_API_KEY"].clone(),
            },
            observability: ObservabilitySettings {
                log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
                log_json: lookup("LOG_JSON").map(|v| v == "1" || v == "true").unwrap_or(false),
            },
        })
    }
}

fn parse_or_default<T: std::str::FromStr>(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("GOOGLE_API_KEY", "gk"),
            ("CARTESIA_API_KEY", "ck"),
            ("CONVEX_HTTP_URL", "https://backend.example.com/"),
            ("PIPECAT_SERVER_SECRET", "shh"),
        ])
    }

    fn lookup_from<'a>(env: &'a HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| env.get(name).map(|v| v.to_string())
    }

    #[test]
    fn test_loads_with_defaults() {
        let env = full_env();
        let settings = Settings::from_lookup(&lookup_from(&env)).unwrap();

        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.backend.request_timeout_secs, 30);
        // Trailing slash stripped
        assert_eq!(settings.backend.base_url, "https://backend.example.com");
        assert_eq!(settings.observability.log_level, "info");
    }

    #[test]
    fn test_reports_all_missing() {
        let mut env = full_env();
        env.remove("GOOGLE_API_KEY");
        env.remove("PIPECAT_SERVER_SECRET");

        let err = Settings::from_lookup(&lookup_from(&env)).unwrap_err();
        match err {
            ConfigError::MissingRequired(names) => {
                assert_eq!(names.len(), 2);
                assert!(names.contains(&"GOOGLE_API_KEY".to_string()));
                assert!(names.contains(&"PIPECAT_SERVER_SECRET".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_value_is_missing() {
        let mut env = full_env();
        env.insert("CONVEX_HTTP_URL", "");

        assert!(matches!(
            Settings::from_lookup(&lookup_from(&env)),
            Err(ConfigError::MissingRequired(_))
        ));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let mut env = full_env();
        env.insert("SERVER_PORT", "not-a-port");

        assert!(matches!(
            Settings::from_lookup(&lookup_from(&env)),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
