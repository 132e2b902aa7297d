//! Gemini `generateContent` provider.
//!
//! Direct REST integration with the Generative Language API: system
//! instruction, multi-part contents, native function declarations, and a
//! permissive dangerous-content safety setting (study material regularly
//! trips that category with e.g. chemistry notes).
//!
//! Error texts deliberately carry the upstream markers ("429", "quota",
//! "overloaded", "safety") so the retry executor and the turn boundary can
//! classify them without this module knowing about either.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ProviderError;

use super::{ModelProvider, ToolInvocation, TurnRequest, TurnResponse};

/// Default chat model.
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Concrete [`ModelProvider`] backed by the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    model: String,
    api_key: String,
    client: reqwest::Client,
    temperature: Option<f64>,
    max_output_tokens: Option<u32>,
}

impl GeminiProvider {
    /// Create a provider for `model`. Falls back to the `GEMINI_API_KEY`
    /// environment variable when no key is supplied.
    pub fn new(
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .ok_or_else(|| {
                ProviderError::new(
                    "Gemini API key not set. Set the GEMINI_API_KEY environment variable.",
                )
            })?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        Ok(Self {
            model: model.into(),
            api_key,
            client,
            temperature: Some(0.7),
            max_output_tokens: Some(8192),
        })
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", API_BASE, self.model)
    }

    fn generation_config(&self) -> Value {
        let mut config = serde_json::Map::new();
        if let Some(temperature) = self.temperature {
            config.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = self.max_output_tokens {
            config.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        Value::Object(config)
    }

    fn build_request_body(&self, request: &TurnRequest) -> Result<Value, ProviderError> {
        let contents = serde_json::to_value(&request.history)
            .map_err(|e| ProviderError::new(format!("failed to encode history: {e}")))?;

        let mut body = json!({
            "contents": contents,
            "generationConfig": self.generation_config(),
            "safetySettings": [{
                "category": "HARM_CATEGORY_DANGEROUS_CONTENT",
                "threshold": "BLOCK_NONE",
            }],
        });

        if !request.system_instruction.is_empty() {
            body["systemInstruction"] = json!({
                "parts": [{ "text": request.system_instruction }]
            });
        }

        if !request.tool_schemas.is_empty() {
            let declarations: Vec<Value> = request
                .tool_schemas
                .iter()
                .map(|schema| {
                    json!({
                        "name": schema.name,
                        "description": schema.description,
                        "parameters": schema.parameters,
                    })
                })
                .collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
        }

        Ok(body)
    }

    fn parse_response(response: &Value) -> Result<TurnResponse, ProviderError> {
        if let Some(feedback) = response.get("promptFeedback") {
            if let Some(reason) = feedback.get("blockReason").and_then(|r| r.as_str()) {
                return Err(ProviderError::new(format!(
                    "prompt blocked by safety filter ({reason})"
                )));
            }
        }

        let candidates = response
            .get("candidates")
            .and_then(|c| c.as_array())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                ProviderError::new(
                    "no candidates in response; generation may have been blocked by the safety filter",
                )
            })?;

        let candidate = &candidates[0];
        if candidate.get("finishReason").and_then(|r| r.as_str()) == Some("SAFETY") {
            return Err(ProviderError::new(
                "response blocked by safety filter (finishReason: SAFETY)",
            ));
        }

        let parts = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();

        let mut text_parts: Vec<String> = Vec::new();
        let mut tool_calls: Vec<ToolInvocation> = Vec::new();
        for part in &parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                text_parts.push(text.to_string());
            }
            if let Some(call) = part.get("functionCall") {
                let name = call
                    .get("name")
                    .and_then(|n| n.as_str())
                    .unwrap_or_default()
                    .to_string();
                let input = call.get("args").cloned().unwrap_or(Value::Null);
                // The raw API returns the call unresolved; a higher-level
                // runtime may fill in the output before it reaches us.
                tool_calls.push(ToolInvocation {
                    name,
                    input,
                    output: None,
                });
            }
        }

        Ok(TurnResponse {
            text: text_parts.join(""),
            tool_calls,
        })
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    async fn send_turn(&self, request: &TurnRequest) -> Result<TurnResponse, ProviderError> {
        log::debug!(
            "gemini send_turn: model={} history={} tools={}",
            self.model,
            request.history.len(),
            request.tool_schemas.len()
        );

        let body = self.build_request_body(request)?;
        let response = self
            .client
            .post(self.endpoint())
            .header("content-type", "application/json")
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::new(format!(
                "Gemini API rate limited (429): {response_text}"
            )));
        }
        if status.is_server_error() {
            // 503 bodies typically read "the model is overloaded", which
            // classifies as throttling downstream.
            return Err(ProviderError::new(format!(
                "Gemini API server error ({status}): {response_text}"
            )));
        }

        let response_json: Value = serde_json::from_str(&response_text).map_err(|e| {
            ProviderError::new(format!(
                "failed to parse Gemini response: {e} - body: {}",
                &response_text[..response_text.len().min(500)]
            ))
        })?;

        if let Some(error) = response_json.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown Gemini API error");
            return Err(ProviderError::new(format!("Gemini API error: {message}")));
        }
        if status.is_client_error() {
            return Err(ProviderError::new(format!(
                "Gemini API error ({status}): {response_text}"
            )));
        }

        Self::parse_response(&response_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Content;
    use crate::tools::ToolSchema;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(DEFAULT_CHAT_MODEL, Some("test-key".into())).unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let request = TurnRequest {
            system_instruction: "You are Gurt.".into(),
            history: vec![Content::user_text("hello")],
            tool_schemas: vec![ToolSchema {
                name: "create_quiz".into(),
                description: "Makes a quiz".into(),
                parameters: json!({ "type": "object" }),
            }],
        };
        let body = provider().build_request_body(&request).unwrap();

        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "You are Gurt."
        );
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "create_quiz"
        );
        assert_eq!(
            body["safetySettings"][0]["category"],
            "HARM_CATEGORY_DANGEROUS_CONTENT"
        );
    }

    #[test]
    fn test_parse_text_and_function_calls() {
        let response = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "Here is your quiz. " },
                        { "functionCall": { "name": "create_quiz", "args": { "topic": "wwii" } } },
                        { "text": "Good luck!" }
                    ]
                },
                "finishReason": "STOP"
            }]
        });
        let parsed = GeminiProvider::parse_response(&response).unwrap();
        assert_eq!(parsed.text, "Here is your quiz. Good luck!");
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "create_quiz");
        assert_eq!(parsed.tool_calls[0].input["topic"], "wwii");
        assert!(parsed.tool_calls[0].output.is_none());
    }

    #[test]
    fn test_safety_finish_reason_is_safety_classified() {
        let response = json!({
            "candidates": [{ "content": { "parts": [] }, "finishReason": "SAFETY" }]
        });
        let err = GeminiProvider::parse_response(&response).unwrap_err();
        assert!(err.is_safety_blocked());
    }

    #[test]
    fn test_prompt_feedback_block_is_safety_classified() {
        let response = json!({ "promptFeedback": { "blockReason": "PROHIBITED_CONTENT" } });
        let err = GeminiProvider::parse_response(&response).unwrap_err();
        assert!(err.is_safety_blocked());
    }

    #[test]
    fn test_empty_candidates_is_safety_classified() {
        let err = GeminiProvider::parse_response(&json!({ "candidates": [] })).unwrap_err();
        assert!(err.is_safety_blocked());
    }
}
