//! Per-session tool dispatch
//!
//! The dispatcher is constructed per session with the session identity bound
//! at construction. `dispatch` never returns an error: unknown tools and
//! invalid arguments become `success = false` results that the generator
//! narrates conversationally, preserving the conversational flow.

use std::sync::Arc;

use voice_shopper_core::{Speaker, ToolCallRequest, ToolCallResult};
use voice_shopper_gateway::{
    ActionGateway, ConversationLogger, SaveItemRequest, SearchFilters, SearchRequest,
};

use crate::registry::{self, names, ToolRegistry};

/// Maps model-issued tool calls onto backend actions for one session
pub struct ToolDispatcher {
    session_id: String,
    user_id: String,
    gateway: Arc<dyn ActionGateway>,
    logger: Arc<ConversationLogger>,
    registry: &'static ToolRegistry,
}

impl ToolDispatcher {
    /// Create a dispatcher bound to a session identity
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        gateway: Arc<dyn ActionGateway>,
        logger: Arc<ConversationLogger>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            gateway,
            logger,
            registry: registry::registry(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Dispatch a single tool call
    ///
    /// Never raises. Unknown tools and missing/mistyped required parameters
    /// produce `success = false` with a descriptive message so the model can
    /// retry or ask a clarifying question.
    pub async fn dispatch(&self, request: ToolCallRequest) -> ToolCallResult {
        let Some(spec) = self.registry.get(&request.tool_name) else {
            tracing::warn!(
                session_id = %self.session_id,
                tool = %request.tool_name,
                "Unknown tool requested"
            );
            return ToolCallResult::failure(
                request.call_id,
                format!("Unknown tool: {}", request.tool_name),
            );
        };

        if let Err(e) = spec.schema.validate(&request.arguments) {
            tracing::debug!(
                session_id = %self.session_id,
                tool = %request.tool_name,
                error = %e,
                "Tool arguments rejected"
            );
            return ToolCallResult::failure(request.call_id, e.to_string());
        }

        tracing::info!(
            session_id = %self.session_id,
            tool = %request.tool_name,
            call_id = %request.call_id,
            "Dispatching tool call"
        );

        let tool = spec.name;
        let result = match tool {
            names::SEARCH_PRODUCTS => self.dispatch_search(request).await,
            names::SAVE_ITEM => self.dispatch_save(request).await,
            names::GET_USER_PREFERENCES => self.dispatch_preferences(request).await,
            // Registry and match arms are defined together above
            other => ToolCallResult::failure(
                request.call_id,
                format!("Tool {other} has no dispatch handler"),
            ),
        };

        let success = if result.success { "true" } else { "false" };
        metrics::counter!(
            "voice_shopper_tool_dispatches_total",
            "tool" => tool,
            "success" => success
        )
        .increment(1);

        result
    }

    /// Dispatch multiple calls from one model turn, sequentially in order
    ///
    /// Sequential dispatch keeps conversation logs causally ordered.
    pub async fn dispatch_all(&self, requests: Vec<ToolCallRequest>) -> Vec<ToolCallResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.dispatch(request).await);
        }
        results
    }

    async fn dispatch_search(&self, request: ToolCallRequest) -> ToolCallResult {
        // required parameter was validated above
        let query = request.get_str("query").unwrap_or_default().to_string();

        let search = SearchRequest {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            query: query.clone(),
            filters: SearchFilters {
                min_price: request.get_f64("min_price"),
                max_price: request.get_f64("max_price"),
                brands: request.get_str_array("brands").unwrap_or_default(),
                categories: request.get_str_array("categories").unwrap_or_default(),
            },
        };

        // Recorded regardless of the gateway outcome
        self.logger
            .record(Speaker::System, format!("Searched for: {query}"));

        let outcome = self.gateway.search(&search).await;
        if outcome.success {
            ToolCallResult::ok(
                request.call_id,
                serde_json::json!({ "results_count": outcome.results_count }),
                outcome.message,
            )
        } else {
            ToolCallResult::failure(request.call_id, outcome.message)
        }
    }

    async fn dispatch_save(&self, request: ToolCallRequest) -> ToolCallResult {
        let product_name = request
            .get_str("product_name")
            .unwrap_or_default()
            .to_string();

        let save = SaveItemRequest {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            product_id: request.get_str("product_id").unwrap_or_default().to_string(),
            product_name: product_name.clone(),
            description: request.get_str("description").map(String::from),
            price: request.get_f64("price"),
        };

        self.logger
            .record(Speaker::System, format!("Saved item: {product_name}"));

        let outcome = self.gateway.save_item(&save).await;
        if outcome.success {
            ToolCallResult::ok(
                request.call_id,
                serde_json::json!({ "product_name": product_name }),
                outcome.message,
            )
        } else {
            ToolCallResult::failure(request.call_id, outcome.message)
        }
    }

    async fn dispatch_preferences(&self, request: ToolCallRequest) -> ToolCallResult {
        self.logger.record(Speaker::System, "Fetched preferences");

        let outcome = self.gateway.get_preferences(&self.user_id).await;
        if outcome.success {
            ToolCallResult::ok(
                request.call_id,
                serde_json::json!({ "preferences": outcome.preferences }),
                "Here are the user's saved preferences.",
            )
        } else {
            ToolCallResult::failure(
                request.call_id,
                format!("Could not retrieve preferences: {}", outcome.message),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use voice_shopper_gateway::{RecordedCall, StubActionGateway};

    fn dispatcher_with(
        gateway: Arc<StubActionGateway>,
    ) -> (ToolDispatcher, Arc<ConversationLogger>) {
        let logger = Arc::new(ConversationLogger::new("s1", gateway.clone()));
        let dispatcher = ToolDispatcher::new("s1", "u1", gateway, logger.clone());
        (dispatcher, logger)
    }

    fn search_request(query: &str, max_price: Option<f64>) -> ToolCallRequest {
        let mut args = HashMap::new();
        args.insert("query".to_string(), serde_json::json!(query));
        if let Some(max) = max_price {
            args.insert("max_price".to_string(), serde_json::json!(max));
        }
        ToolCallRequest::new("search_products", args)
    }

    #[tokio::test]
    async fn test_unknown_tool_is_recoverable() {
        let gateway = Arc::new(StubActionGateway::new());
        let (dispatcher, _) = dispatcher_with(gateway);

        let result = dispatcher
            .dispatch(ToolCallRequest::new("order_pizza", HashMap::new()))
            .await;

        assert!(!result.success);
        assert!(result.message.contains("order_pizza"));
    }

    #[tokio::test]
    async fn test_missing_required_parameter() {
        let gateway = Arc::new(StubActionGateway::new());
        let (dispatcher, _) = dispatcher_with(gateway.clone());

        let result = dispatcher
            .dispatch(ToolCallRequest::new("search_products", HashMap::new()))
            .await;

        assert!(!result.success);
        assert!(result.message.contains("query"));
        // The gateway was never reached
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_search_happy_path() {
        let gateway = Arc::new(StubActionGateway::new().with_results_count(3));
        let (dispatcher, logger) = dispatcher_with(gateway.clone());

        let result = dispatcher
            .dispatch(search_request("gaming laptop", Some(1500.0)))
            .await;

        assert!(result.success);
        assert_eq!(result.payload["results_count"], 3);

        // The gateway saw the price filter as a preferences object
        let calls = gateway.calls();
        let search = calls
            .iter()
            .find_map(|c| match c {
                RecordedCall::Search(req) => Some(req.clone()),
                _ => None,
            })
            .expect("search call recorded");
        assert_eq!(search.query, "gaming laptop");
        assert_eq!(
            search.filters.to_preferences().unwrap(),
            serde_json::json!({ "maxPrice": 1500.0 })
        );

        // A system turn summarizing the action was recorded
        logger.flush().await;
        let turns = gateway.logged_turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].speaker, Speaker::System);
        assert_eq!(turns[0].text, "Searched for: gaming laptop");
    }

    #[tokio::test]
    async fn test_backend_failure_is_structured() {
        let gateway = Arc::new(StubActionGateway::new().failing_save());
        let (dispatcher, _) = dispatcher_with(gateway);

        let mut args = HashMap::new();
        args.insert("product_id".to_string(), serde_json::json!("p1"));
        args.insert("product_name".to_string(), serde_json::json!("Dell XPS"));
        let result = dispatcher
            .dispatch(ToolCallRequest::new("save_item", args))
            .await;

        assert!(!result.success);
        assert!(!result.message.is_empty());
    }

    #[tokio::test]
    async fn test_logging_failure_does_not_alter_result() {
        let gateway = Arc::new(StubActionGateway::new().failing_log_turn());
        let (dispatcher, logger) = dispatcher_with(gateway);

        let result = dispatcher.dispatch(search_request("laptop", None)).await;
        logger.flush().await;

        assert!(result.success);
        assert_eq!(result.payload["results_count"], 3);
    }

    #[tokio::test]
    async fn test_sequential_dispatch_preserves_log_order() {
        let gateway = Arc::new(StubActionGateway::new());
        let (dispatcher, logger) = dispatcher_with(gateway.clone());

        let mut save_args = HashMap::new();
        save_args.insert("product_id".to_string(), serde_json::json!("p1"));
        save_args.insert("product_name".to_string(), serde_json::json!("Aeron"));

        let requests = vec![
            search_request("office chair", None),
            ToolCallRequest::new("save_item", save_args),
            ToolCallRequest::new("get_user_preferences", HashMap::new()),
        ];
        let results = dispatcher.dispatch_all(requests).await;
        logger.flush().await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success));

        let turns = gateway.logged_turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].text, "Searched for: office chair");
        assert_eq!(turns[1].text, "Saved item: Aeron");
        assert_eq!(turns[2].text, "Fetched preferences");
    }

    #[tokio::test]
    async fn test_wrong_type_rejected_before_gateway() {
        let gateway = Arc::new(StubActionGateway::new());
        let (dispatcher, _) = dispatcher_with(gateway.clone());

        let mut args = HashMap::new();
        args.insert("query".to_string(), serde_json::json!("laptop"));
        args.insert("max_price".to_string(), serde_json::json!("cheap"));
        let result = dispatcher
            .dispatch(ToolCallRequest::new("search_products", args))
            .await;

        assert!(!result.success);
        assert!(gateway.calls().is_empty());
    }
}
