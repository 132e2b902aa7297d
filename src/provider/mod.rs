//! Model-provider abstraction and the conversation content model.
//!
//! The provider is a black box: it generates text and, internally, resolves
//! any tool calls it decides to make. Tool bodies execute behind this
//! boundary; the orchestration core never re-invokes them. Every call to a
//! provider goes through the shared [`RateLimiter`](crate::utilities::RateLimiter).

pub mod gemini;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::tools::ToolSchema;

pub use gemini::GeminiProvider;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One part of a message: plain text or inline binary data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Part {
    #[serde(rename = "text")]
    Text(String),
    #[serde(rename = "inlineData", rename_all = "camelCase")]
    InlineData { mime_type: String, data: String },
}

/// One message in a conversation: a role plus ordered parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::InlineData { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A structured capability invocation issued by the provider.
///
/// `output` stays `None` until the provider resolves the call; only
/// resolved invocations are eligible for artifact persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub input: Value,
    #[serde(default)]
    pub output: Option<Value>,
}

/// Everything the provider needs for one request/response round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub system_instruction: String,
    pub history: Vec<Content>,
    pub tool_schemas: Vec<ToolSchema>,
}

/// The provider's answer for one round: final text plus any tool calls it
/// made along the way.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolInvocation>,
}

/// External generative-language provider. Opaque; may itself retry or
/// throttle, which is why the rate limiter wraps calls to it.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Execute exactly one request/response round.
    async fn send_turn(&self, request: &TurnRequest) -> Result<TurnResponse, ProviderError>;

    /// Plain text generation for auxiliary paths (e.g. the map-reduce
    /// summarizer). Default: a tool-less single-message turn.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = TurnRequest {
            system_instruction: String::new(),
            history: vec![Content::user_text(prompt)],
            tool_schemas: Vec::new(),
        };
        Ok(self.send_turn(&request).await?.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_serialization_matches_wire_format() {
        let text = serde_json::to_value(Part::Text("hi".into())).unwrap();
        assert_eq!(text, serde_json::json!({ "text": "hi" }));

        let inline = serde_json::to_value(Part::InlineData {
            mime_type: "image/png".into(),
            data: "QUJD".into(),
        })
        .unwrap();
        assert_eq!(
            inline,
            serde_json::json!({ "inlineData": { "mimeType": "image/png", "data": "QUJD" } })
        );
    }

    #[test]
    fn test_content_text_skips_inline_data() {
        let content = Content {
            role: Role::User,
            parts: vec![
                Part::Text("look at ".into()),
                Part::InlineData {
                    mime_type: "image/png".into(),
                    data: "QUJD".into(),
                },
                Part::Text("this".into()),
            ],
        };
        assert_eq!(content.text(), "look at this");
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_value(Role::User).unwrap(), "user");
        assert_eq!(serde_json::to_value(Role::Model).unwrap(), "model");
    }
}
