//! The conversation turn orchestrator.
//!
//! One entry point, [`ChatTurnRunner::run`], drives a full turn: resolve the
//! session and persona, build the provider request, call through the rate
//! limiter, persist tool artifacts, and record the exchange. The runner
//! never returns an error; every failure mode maps to a user-safe
//! [`TurnOutput`] at the boundary.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::content::{persist_tool_artifacts, ContentPersistence};
use crate::error::TurnFailure;
use crate::persona::{PersonaCatalog, PersonaSelector};
use crate::provider::{Content, ModelProvider, Part, Role, TurnRequest, TurnResponse};
use crate::session::history::{trim_history, DEFAULT_HISTORY_TOKEN_BUDGET};
use crate::session::{SessionState, SessionStore};
use crate::tools::{default_tool_schemas, ToolSchema};
use crate::utilities::RateLimiter;

/// Fixed formatting and tool-use instructions appended to every persona
/// prompt.
pub const PLATFORM_INSTRUCTIONS: &str = "You are an expert AI assistant and a helpful, \
conversational study partner. Your responses should be well-structured and use markdown \
for formatting (e.g., headings, bold text, lists) to improve readability. If you need \
information from the user to use a tool (like source text for a quiz), and the user does \
not provide it, you must explain clearly why you need it and suggest ways the user can \
provide it (like pasting text or uploading a file). Do not try to use a tool without the \
required information.";

/// System instruction used when no persona can be resolved at all.
pub const NEUTRAL_FALLBACK_PROMPT: &str = "You are a helpful AI study assistant. Your tone \
is knowledgeable, encouraging, and clear. You provide direct and effective help without a \
strong personality. Your goal is to be a reliable and straightforward academic tool.";

const GENERIC_ERROR_RESPONSE: &str =
    "Sorry, there was an error processing your request. Please try again.";

const SAFETY_BLOCKED_RESPONSE: &str = "Sorry, the AI model did not return a response. This \
could be due to a safety filter or a temporary issue. Please try rephrasing your request.";

const EMPTY_RESPONSE_FALLBACK: &str = "Sorry, I am not sure how to help with that.";

/// A file the user attached to their message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub mime_type: String,
    /// Base64 payload, ready for the provider's inline-data part.
    pub data: String,
    /// Text extracted upstream for non-image attachments (the core does no
    /// extraction itself).
    #[serde(default)]
    pub extracted_text: Option<String>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// One user turn as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnInput {
    pub user_id: String,
    pub message: String,
    /// Chat session id to resume; `None` starts a fresh session.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Caller-selected persona id; `None` or the sentinel means auto.
    #[serde(default)]
    pub persona_id: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
}

/// What the caller gets back. Always produced, even on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutput {
    /// Chat session id, echoed or freshly minted. `None` only when session
    /// resolution itself was skipped on an early failure.
    pub session_id: Option<String>,
    pub response: String,
    pub is_error: bool,
}

/// Orchestrates conversation turns over injected adapters.
pub struct ChatTurnRunner {
    catalog: Arc<dyn PersonaCatalog>,
    provider: Arc<dyn ModelProvider>,
    sessions: Arc<dyn SessionStore>,
    content: Arc<dyn ContentPersistence>,
    limiter: RateLimiter,
    selector: PersonaSelector,
    tool_schemas: Vec<ToolSchema>,
    history_token_budget: usize,
}

impl ChatTurnRunner {
    pub fn new(
        catalog: Arc<dyn PersonaCatalog>,
        provider: Arc<dyn ModelProvider>,
        sessions: Arc<dyn SessionStore>,
        content: Arc<dyn ContentPersistence>,
        limiter: RateLimiter,
        selector: PersonaSelector,
    ) -> Self {
        Self {
            catalog,
            provider,
            sessions,
            content,
            limiter,
            selector,
            tool_schemas: default_tool_schemas(),
            history_token_budget: DEFAULT_HISTORY_TOKEN_BUDGET,
        }
    }

    pub fn with_tool_schemas(mut self, tool_schemas: Vec<ToolSchema>) -> Self {
        self.tool_schemas = tool_schemas;
        self
    }

    pub fn with_history_token_budget(mut self, budget: usize) -> Self {
        self.history_token_budget = budget;
        self
    }

    /// Run one turn. Never fails: internal errors become user-safe messages
    /// with `is_error` set.
    pub async fn run(&self, input: TurnInput) -> TurnOutput {
        let (session_id, result) = self.run_inner(&input).await;
        match result {
            Ok(response) => TurnOutput {
                session_id: Some(session_id),
                response,
                is_error: false,
            },
            Err(failure) => {
                log::error!("turn failed for session {session_id}: {failure}");
                let response = match failure {
                    TurnFailure::SafetyBlocked(_) => SAFETY_BLOCKED_RESPONSE,
                    TurnFailure::Provider(_) => GENERIC_ERROR_RESPONSE,
                };
                TurnOutput {
                    session_id: Some(session_id),
                    response: response.to_string(),
                    is_error: true,
                }
            }
        }
    }

    async fn run_inner(&self, input: &TurnInput) -> (String, Result<String, TurnFailure>) {
        let mut session = self.resolve_session(input).await;
        let session_id = session.session_id.clone();

        let system_instruction = self.resolve_system_instruction(input, &mut session).await;

        session.messages.push(build_user_message(input));

        let request = TurnRequest {
            system_instruction,
            history: trim_history(&session.messages, self.history_token_budget),
            tool_schemas: self.tool_schemas.clone(),
        };

        let provider = Arc::clone(&self.provider);
        let request = Arc::new(request);
        let response: Result<TurnResponse, _> = self
            .limiter
            .execute(move || {
                let provider = Arc::clone(&provider);
                let request = Arc::clone(&request);
                async move { provider.send_turn(&request).await }
            })
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => return (session_id, Err(TurnFailure::from(err))),
        };

        if !input.user_id.is_empty() && !response.tool_calls.is_empty() {
            persist_tool_artifacts(self.content.as_ref(), &input.user_id, &response.tool_calls)
                .await;
        }

        let text = if response.text.is_empty() {
            EMPTY_RESPONSE_FALLBACK.to_string()
        } else {
            response.text
        };

        session.messages.push(Content::model_text(text.clone()));
        session.tool_records.extend(response.tool_calls);
        session.updated_at = chrono::Utc::now();

        if let Err(err) = self
            .sessions
            .save(&input.user_id, &session_id, &session)
            .await
        {
            log::error!("failed to save session {session_id}: {err}");
        }

        (session_id, Ok(text))
    }

    /// Load the named session, or start a fresh one. A missing id keeps the
    /// caller's id so their reference stays valid; a load failure degrades
    /// to a fresh session rather than failing the turn.
    async fn resolve_session(&self, input: &TurnInput) -> SessionState {
        if let Some(id) = &input.session_id {
            match self.sessions.load(&input.user_id, id).await {
                Ok(Some(session)) => return session,
                Ok(None) => {
                    log::warn!("session {id} not found, starting fresh under the same id");
                    return SessionState::new(id.clone(), &input.message, None);
                }
                Err(err) => {
                    log::error!("failed to load session {id}, starting fresh: {err}");
                    return SessionState::new(id.clone(), &input.message, None);
                }
            }
        }
        SessionState::new(Uuid::new_v4().to_string(), &input.message, None)
    }

    /// Resolve the persona and build the full system instruction. Every
    /// failure path degrades to the neutral prompt; persona trouble never
    /// fails a turn.
    async fn resolve_system_instruction(
        &self,
        input: &TurnInput,
        session: &mut SessionState,
    ) -> String {
        let catalog = match self.catalog.fetch_all().await {
            Ok(catalog) => catalog,
            Err(err) => {
                log::warn!("persona catalog unavailable, using neutral prompt: {err}");
                return format!("{NEUTRAL_FALLBACK_PROMPT} {PLATFORM_INSTRUCTIONS}");
            }
        };

        // A session keeps the persona it started with; a fresh session takes
        // the caller's choice or resolves one from the prompt. The sentinel
        // id means "pick for me" and goes through the chain like no id.
        let explicit_id = session
            .bound_persona_id
            .as_deref()
            .or(input.persona_id.as_deref())
            .filter(|id| *id != self.selector.config().sentinel_id);

        // A named persona that no longer exists degrades straight to the
        // neutral prompt; re-selecting from the prompt would silently swap
        // the voice the session was started with.
        if let Some(id) = explicit_id {
            if !catalog.iter().any(|p| p.id == id) {
                log::warn!("persona {id:?} not in catalog, using neutral prompt");
                return format!("{NEUTRAL_FALLBACK_PROMPT} {PLATFORM_INSTRUCTIONS}");
            }
        }

        let prompt_template = match self.selector.select(&input.message, explicit_id, &catalog) {
            Ok(result) => {
                if session.bound_persona_id.is_none() {
                    session.bound_persona_id = Some(result.persona_id.clone());
                }
                catalog
                    .iter()
                    .find(|p| p.id == result.persona_id)
                    .map(|p| p.prompt_template.clone())
            }
            Err(err) => {
                log::warn!("persona selection failed, using neutral prompt: {err}");
                None
            }
        };

        match prompt_template {
            Some(template) => format!("{template} {PLATFORM_INSTRUCTIONS}"),
            None => format!("{NEUTRAL_FALLBACK_PROMPT} {PLATFORM_INSTRUCTIONS}"),
        }
    }
}

/// The user message for this turn, with any attachment folded in: images
/// ride along as an inline-data part, other files contribute their
/// extracted text ahead of the message.
fn build_user_message(input: &TurnInput) -> Content {
    let mut parts = Vec::new();
    let mut text = input.message.clone();

    if let Some(attachment) = &input.attachment {
        if attachment.is_image() {
            parts.push(Part::InlineData {
                mime_type: attachment.mime_type.clone(),
                data: attachment.data.clone(),
            });
        } else if let Some(extracted) = &attachment.extracted_text {
            text = format!("{extracted}\n\n{text}");
        }
    }

    parts.push(Part::Text(text));
    Content {
        role: Role::User,
        parts,
    }
}
