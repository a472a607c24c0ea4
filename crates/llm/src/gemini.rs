//! Gemini turn-generation client
//!
//! Speaks the generateContent REST API. Tool definitions arrive in
//! function-calling form and are mapped to Gemini function declarations;
//! function calls in the response come back as `ToolCallRequest`s for the
//! dispatcher.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use voice_shopper_core::{
    Error, GeneratedTurn, Result, Speaker, ToolCallRequest, TurnGenerator, TurnRequest,
};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini backend configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.7,
            max_output_tokens: 256,
        }
    }
}

/// Turn generator backed by the Gemini API
pub struct GeminiTurnGenerator {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiTurnGenerator {
    pub fn new(client: reqwest::Client, config: GeminiConfig) -> Self {
        Self { client, config }
    }

    fn endpoint(&self) -> String {
        format!(
            "{GEMINI_BASE_URL}/models/{}:generateContent",
            self.config.model
        )
    }

    fn build_body(&self, request: &TurnRequest) -> Value {
        let mut contents: Vec<Value> = request
            .history
            .iter()
            .filter_map(|(speaker, text)| {
                let role = match speaker {
                    Speaker::User => "user",
                    Speaker::Agent => "model",
                    // System context lives in systemInstruction
                    Speaker::System => return None,
                };
                Some(serde_json::json!({
                    "role": role,
                    "parts": [{ "text": text }],
                }))
            })
            .collect();

        contents.push(serde_json::json!({
            "role": "user",
            "parts": [{ "text": request.user_text }],
        }));

        if !request.tool_results.is_empty() {
            let results: Vec<Value> = request
                .tool_results
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "call_id": r.call_id,
                        "success": r.success,
                        "payload": r.payload,
                        "message": r.message,
                    })
                })
                .collect();
            contents.push(serde_json::json!({
                "role": "user",
                "parts": [{ "text": format!(
                    "Tool results:\n{}",
                    serde_json::to_string_pretty(&results).unwrap_or_default()
                )}],
            }));
        }

        let declarations: Vec<Value> = request
            .tools
            .iter()
            .filter_map(|tool| tool.get("function").cloned())
            .collect();

        let mut body = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": request.system_prompt }] },
            "contents": contents,
            "generationConfig": {
                "temperature": self.config.temperature,
                "maxOutputTokens": self.config.max_output_tokens,
            },
        });

        if !declarations.is_empty() {
            body["tools"] = serde_json::json!([{ "functionDeclarations": declarations }]);
        }

        body
    }

    fn parse_response(response: &Value) -> Result<GeneratedTurn> {
        let parts = response
            .pointer("/candidates/0/content/parts")
            .and_then(|p| p.as_array())
            .ok_or_else(|| Error::Generation("Response contained no candidates".to_string()))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for part in parts {
            if let Some(chunk) = part.get("text").and_then(|t| t.as_str()) {
                text.push_str(chunk);
            }
            if let Some(call) = part.get("functionCall") {
                let name = call
                    .get("name")
                    .and_then(|n| n.as_str())
                    .ok_or_else(|| Error::Generation("Function call without a name".to_string()))?;
                let arguments: HashMap<String, Value> = call
                    .get("args")
                    .and_then(|a| a.as_object())
                    .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
                tool_calls.push(ToolCallRequest::new(name, arguments));
            }
        }

        Ok(GeneratedTurn {
            text: text.trim().to_string(),
            tool_calls,
        })
    }
}

#[async_trait]
impl TurnGenerator for GeminiTurnGenerator {
    async fn generate(&self, request: TurnRequest) -> Result<GeneratedTurn> {
        let body = self.build_body(&request);

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Generation(format!(
                "Gemini returned status {status}: {}",
                detail.chars().take(200).collect::<String>()
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| Error::Generation(e.to_string()))?;

        let turn = Self::parse_response(&json)?;
        tracing::debug!(
            model = %self.config.model,
            response_chars = turn.text.len(),
            tool_calls = turn.tool_calls.len(),
            "Generated turn"
        );
        Ok(turn)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_shopper_core::ToolCallResult;

    fn generator() -> GeminiTurnGenerator {
        GeminiTurnGenerator::new(reqwest::Client::new(), GeminiConfig::new("test-key"))
    }

    #[test]
    fn test_body_maps_history_roles() {
        let mut request = TurnRequest::new("system prompt", "next question");
        request.history = vec![
            (Speaker::User, "hello".to_string()),
            (Speaker::Agent, "hi there".to_string()),
            (Speaker::System, "Searched for: x".to_string()),
        ];

        let body = generator().build_body(&request);
        let contents = body["contents"].as_array().unwrap();

        // System turns are excluded from contents
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "next question");
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "system prompt"
        );
    }

    #[test]
    fn test_body_includes_function_declarations() {
        let tool = serde_json::json!({
            "type": "function",
            "function": {
                "name": "search_products",
                "description": "Search",
                "parameters": { "type": "object" },
            }
        });
        let request = TurnRequest::new("sys", "find a laptop").with_tools(vec![tool]);

        let body = generator().build_body(&request);
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "search_products"
        );
    }

    #[test]
    fn test_body_appends_tool_results() {
        let request = TurnRequest::new("sys", "find a laptop").with_tool_results(vec![
            ToolCallResult::ok(
                "c1",
                serde_json::json!({ "results_count": 3 }),
                "Found 3 products",
            ),
        ]);

        let body = generator().build_body(&request);
        let contents = body["contents"].as_array().unwrap();
        let last_text = contents.last().unwrap()["parts"][0]["text"]
            .as_str()
            .unwrap();
        assert!(last_text.starts_with("Tool results:"));
        assert!(last_text.contains("results_count"));
    }

    #[test]
    fn test_parse_text_response() {
        let response = serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{ "text": "Here are some laptops." }],
                }
            }]
        });

        let turn = GeminiTurnGenerator::parse_response(&response).unwrap();
        assert_eq!(turn.text, "Here are some laptops.");
        assert!(!turn.has_tool_calls());
    }

    #[test]
    fn test_parse_function_call() {
        let response = serde_json::json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{
                        "functionCall": {
                            "name": "search_products",
                            "args": { "query": "gaming laptop", "max_price": 1500 },
                        }
                    }],
                }
            }]
        });

        let turn = GeminiTurnGenerator::parse_response(&response).unwrap();
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].tool_name, "search_products");
        assert_eq!(turn.tool_calls[0].get_str("query"), Some("gaming laptop"));
        assert_eq!(turn.tool_calls[0].get_f64("max_price"), Some(1500.0));
    }

    #[test]
    fn test_parse_empty_response_is_error() {
        let response = serde_json::json!({ "candidates": [] });
        assert!(GeminiTurnGenerator::parse_response(&response).is_err());
    }
}
