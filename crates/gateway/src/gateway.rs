//! Typed client for the backend action API
//!
//! Requests carry the shared secret in the `X-Pipecat-Secret` header and are
//! bounded by the configured client timeout. The trait is implemented by the
//! production HTTP client and by a recording stub used in tests and
//! development.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;

use voice_shopper_config::BackendSettings;
use voice_shopper_core::ConversationTurn;

use crate::GatewayError;

const SECRET_HEADER: &str = "X-Pipecat-Secret";

/// Search filters extracted from tool arguments
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub brands: Vec<String>,
    pub categories: Vec<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.min_price.is_none()
            && self.max_price.is_none()
            && self.brands.is_empty()
            && self.categories.is_empty()
    }

    /// Render as the backend's `preferences` object, or `None` when empty
    pub fn to_preferences(&self) -> Option<Value> {
        if self.is_empty() {
            return None;
        }
        let mut prefs = serde_json::Map::new();
        if let Some(min) = self.min_price {
            prefs.insert("minPrice".to_string(), min.into());
        }
        if let Some(max) = self.max_price {
            prefs.insert("maxPrice".to_string(), max.into());
        }
        if !self.brands.is_empty() {
            prefs.insert("brands".to_string(), self.brands.clone().into());
        }
        if !self.categories.is_empty() {
            prefs.insert("categories".to_string(), self.categories.clone().into());
        }
        Some(Value::Object(prefs))
    }
}

/// A product search bound to a session
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub session_id: String,
    pub user_id: String,
    pub query: String,
    pub filters: SearchFilters,
}

/// Search result summary
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub success: bool,
    pub results_count: u64,
    pub message: String,
}

/// A save-item action bound to a session
#[derive(Debug, Clone)]
pub struct SaveItemRequest {
    pub session_id: String,
    pub user_id: String,
    pub product_id: String,
    pub product_name: String,
    pub description: Option<String>,
    pub price: Option<f64>,
}

/// Save result
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub success: bool,
    pub message: String,
}

/// User preferences result
#[derive(Debug, Clone)]
pub struct PreferencesOutcome {
    pub success: bool,
    pub preferences: Value,
    pub message: String,
}

/// Typed client for backend actions
///
/// Implementations must isolate failures: every method except `log_turn`
/// returns an outcome struct with `success = false` on error instead of
/// propagating. `log_turn` returns a `Result` so the conversation logger can
/// decide how to downgrade it; it must still never panic.
#[async_trait]
pub trait ActionGateway: Send + Sync {
    /// Trigger a product search on the backend
    async fn search(&self, request: &SearchRequest) -> SearchOutcome;

    /// Save a product to the user's list
    async fn save_item(&self, request: &SaveItemRequest) -> SaveOutcome;

    /// Fetch the user's shopping preferences
    async fn get_preferences(&self, user_id: &str) -> PreferencesOutcome;

    /// Persist one conversation turn
    async fn log_turn(&self, turn: &ConversationTurn) -> Result<(), GatewayError>;
}

/// Production gateway speaking HTTP+JSON to the backend
pub struct HttpActionGateway {
    client: reqwest::Client,
    base_url: String,
    shared_secret: String,
}

impl HttpActionGateway {
    /// Build a gateway from backend settings
    pub fn new(settings: &BackendSettings) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            shared_secret: settings.shared_secret.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, GatewayError> {
        let response = self
            .client
            .post(self.endpoint(path))
            .header(SECRET_HEADER, &self.shared_secret)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::RemoteStatus(status.as_u16()));
        }

        // Some endpoints return an empty body; treat that as an empty object
        let text = response.text().await?;
        if text.is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&text).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ActionGateway for HttpActionGateway {
    async fn search(&self, request: &SearchRequest) -> SearchOutcome {
        let body = serde_json::json!({
            "query": request.query,
            "sessionId": request.session_id,
            "userId": request.user_id,
            "preferences": request.filters.to_preferences(),
        });

        match self.post_json("/pipecat/trigger-research", &body).await {
            Ok(result) => {
                let count = result
                    .get("resultsCount")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                tracing::info!(
                    session_id = %request.session_id,
                    query = %request.query,
                    results_count = count,
                    "Search completed"
                );
                SearchOutcome {
                    success: true,
                    results_count: count,
                    message: format!(
                        "Found {count} products matching your criteria. I'll show them to you now."
                    ),
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %request.session_id, error = %e, "Search failed");
                SearchOutcome {
                    success: false,
                    results_count: 0,
                    message: format!("Sorry, I encountered an error while searching: {e}"),
                }
            }
        }
    }

    async fn save_item(&self, request: &SaveItemRequest) -> SaveOutcome {
        let body = serde_json::json!({
            "sessionId": request.session_id,
            "userId": request.user_id,
            "productId": request.product_id,
            "productName": request.product_name,
            "description": request.description,
            "price": request.price,
        });

        match self.post_json("/pipecat/save-item", &body).await {
            Ok(_) => {
                tracing::info!(
                    session_id = %request.session_id,
                    product = %request.product_name,
                    "Item saved"
                );
                SaveOutcome {
                    success: true,
                    message: format!("I've saved '{}' to your list!", request.product_name),
                }
            }
            Err(e) => {
                tracing::warn!(session_id = %request.session_id, error = %e, "Save failed");
                SaveOutcome {
                    success: false,
                    message: format!("Sorry, I couldn't save that item: {e}"),
                }
            }
        }
    }

    async fn get_preferences(&self, user_id: &str) -> PreferencesOutcome {
        // The backend has no preferences endpoint yet; serve the defaults the
        // frontend seeds for new users.
        tracing::debug!(user_id = %user_id, "Serving default preferences");
        PreferencesOutcome {
            success: true,
            preferences: serde_json::json!({
                "style": ["modern", "minimalist"],
                "budget": { "min": 50, "max": 500 },
                "brands": ["Apple", "Dell", "Herman Miller"],
            }),
            message: String::new(),
        }
    }

    async fn log_turn(&self, turn: &ConversationTurn) -> Result<(), GatewayError> {
        let body = serde_json::json!({
            "sessionId": turn.session_id,
            "speaker": turn.speaker.as_str(),
            "text": turn.text,
            "timestamp": turn.timestamp_ms,
        });

        self.post_json("/pipecat/log-conversation", &body).await?;
        tracing::trace!(session_id = %turn.session_id, speaker = %turn.speaker, "Turn logged");
        Ok(())
    }
}

/// Recorded call made against the stub gateway
#[derive(Debug, Clone)]
pub enum RecordedCall {
    Search(SearchRequest),
    SaveItem(SaveItemRequest),
    GetPreferences { user_id: String },
    LogTurn(ConversationTurn),
}

/// In-memory gateway stub for tests and development
///
/// Records every call in order and can be scripted to fail individual
/// operations.
#[derive(Default)]
pub struct StubActionGateway {
    calls: Mutex<Vec<RecordedCall>>,
    pub fail_search: bool,
    pub fail_save: bool,
    pub fail_log_turn: bool,
    pub results_count: u64,
}

impl StubActionGateway {
    pub fn new() -> Self {
        Self {
            results_count: 3,
            ..Default::default()
        }
    }

    pub fn with_results_count(mut self, count: u64) -> Self {
        self.results_count = count;
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn failing_save(mut self) -> Self {
        self.fail_save = true;
        self
    }

    pub fn failing_log_turn(mut self) -> Self {
        self.fail_log_turn = true;
        self
    }

    /// All recorded calls in arrival order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Logged turns in arrival order
    pub fn logged_turns(&self) -> Vec<ConversationTurn> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RecordedCall::LogTurn(turn) => Some(turn.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ActionGateway for StubActionGateway {
    async fn search(&self, request: &SearchRequest) -> SearchOutcome {
        self.calls.lock().push(RecordedCall::Search(request.clone()));
        if self.fail_search {
            return SearchOutcome {
                success: false,
                results_count: 0,
                message: "Sorry, I encountered an error while searching: backend unavailable"
                    .to_string(),
            };
        }
        SearchOutcome {
            success: true,
            results_count: self.results_count,
            message: format!(
                "Found {} products matching your criteria. I'll show them to you now.",
                self.results_count
            ),
        }
    }

    async fn save_item(&self, request: &SaveItemRequest) -> SaveOutcome {
        self.calls
            .lock()
            .push(RecordedCall::SaveItem(request.clone()));
        if self.fail_save {
            return SaveOutcome {
                success: false,
                message: "Sorry, I couldn't save that item: backend unavailable".to_string(),
            };
        }
        SaveOutcome {
            success: true,
            message: format!("I've saved '{}' to your list!", request.product_name),
        }
    }

    async fn get_preferences(&self, user_id: &str) -> PreferencesOutcome {
        self.calls.lock().push(RecordedCall::GetPreferences {
            user_id: user_id.to_string(),
        });
        PreferencesOutcome {
            success: true,
            preferences: serde_json::json!({ "brands": ["Dell"] }),
            message: String::new(),
        }
    }

    async fn log_turn(&self, turn: &ConversationTurn) -> Result<(), GatewayError> {
        self.calls.lock().push(RecordedCall::LogTurn(turn.clone()));
        if self.fail_log_turn {
            return Err(GatewayError::RemoteStatus(500));
        }
        Ok(())
    }
}
