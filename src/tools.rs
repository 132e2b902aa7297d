//! Registered tool schemas and typed tool outputs.
//!
//! The provider invokes tools by name with JSON input/output; their bodies
//! execute behind the provider boundary. This module owns the declared
//! schemas and the [`ToolOutput`] sum type that turns a resolved invocation
//! back into a strictly-typed artifact at the persistence seam.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::content::ContentKind;
use crate::provider::ToolInvocation;

/// Declaration of one structured capability offered to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON-schema object describing the input.
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Tool names the core knows how to persist.
pub const TOOL_SUMMARIZE_NOTES: &str = "summarize_notes";
pub const TOOL_CREATE_FLASHCARDS: &str = "create_flashcards";
pub const TOOL_CREATE_QUIZ: &str = "create_quiz";
pub const TOOL_CREATE_STUDY_PLAN: &str = "create_study_plan";
pub const TOOL_HIGHLIGHT_INSIGHTS: &str = "highlight_key_insights";

/// The full set of capabilities declared to the provider on every turn.
/// Some (concept explanation, memory aids, discussion prompts) produce no
/// persistent artifact and exist only for the conversation itself.
pub fn default_tool_schemas() -> Vec<ToolSchema> {
    vec![
        ToolSchema::new(
            TOOL_SUMMARIZE_NOTES,
            "Summarizes a long piece of text or a document into a concise digest. \
             Use this when the user asks to summarize their notes.",
            json!({
                "type": "object",
                "properties": {
                    "notes": { "type": "string", "description": "The text to summarize." }
                },
                "required": ["notes"]
            }),
        ),
        ToolSchema::new(
            TOOL_CREATE_STUDY_PLAN,
            "Generates a structured study plan based on a topic and duration. \
             Use this when the user asks to create a study plan or schedule.",
            json!({
                "type": "object",
                "properties": {
                    "topic": { "type": "string" },
                    "duration_days": { "type": "integer", "minimum": 1 }
                },
                "required": ["topic", "duration_days"]
            }),
        ),
        ToolSchema::new(
            TOOL_CREATE_FLASHCARDS,
            "Generates a set of question-and-answer flashcards for a topic. \
             Use this when the user asks for flashcards.",
            json!({
                "type": "object",
                "properties": {
                    "topic": { "type": "string" },
                    "count": { "type": "integer", "minimum": 1 }
                },
                "required": ["topic"]
            }),
        ),
        ToolSchema::new(
            TOOL_CREATE_QUIZ,
            "Generates a multiple-choice quiz for a topic or source text. \
             Use this when the user asks to be quizzed or tested.",
            json!({
                "type": "object",
                "properties": {
                    "topic": { "type": "string" },
                    "question_count": { "type": "integer", "minimum": 1 }
                },
                "required": ["topic"]
            }),
        ),
        ToolSchema::new(
            "explain_concept",
            "Explains a single concept in depth with an analogy.",
            json!({
                "type": "object",
                "properties": { "concept": { "type": "string" } },
                "required": ["concept"]
            }),
        ),
        ToolSchema::new(
            "create_memory_aid",
            "Creates a mnemonic or memory aid for a piece of information.",
            json!({
                "type": "object",
                "properties": { "information": { "type": "string" } },
                "required": ["information"]
            }),
        ),
        ToolSchema::new(
            "create_discussion_prompts",
            "Generates discussion prompts for a topic or source text.",
            json!({
                "type": "object",
                "properties": { "topic": { "type": "string" } },
                "required": ["topic"]
            }),
        ),
        ToolSchema::new(
            TOOL_HIGHLIGHT_INSIGHTS,
            "Extracts the key insights from a piece of source text.",
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }),
        ),
    ]
}

/// A single question/answer flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}

/// One multiple-choice quiz question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryArtifact {
    #[serde(default)]
    pub title: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashcardSetArtifact {
    #[serde(default)]
    pub title: Option<String>,
    pub flashcards: Vec<Flashcard>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizArtifact {
    #[serde(default)]
    pub title: Option<String>,
    pub quiz: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPlanArtifact {
    #[serde(default)]
    pub title: Option<String>,
    /// Day-keyed plan object as produced by the tool; shape is owned by
    /// the persistence schema, not by this core.
    pub plan: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsArtifact {
    pub insights: Vec<String>,
}

/// Typed view of a resolved tool invocation, keyed by tool name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolOutput {
    Summary(SummaryArtifact),
    FlashcardSet(FlashcardSetArtifact),
    Quiz(QuizArtifact),
    StudyPlan(StudyPlanArtifact),
    Insights(InsightsArtifact),
}

impl ToolOutput {
    /// Decode a resolved invocation into a typed artifact.
    ///
    /// Returns `None` for unresolved invocations, for tool names with no
    /// persistent artifact, and for outputs that fail their schema; the
    /// last case is logged since it indicates provider drift.
    pub fn from_invocation(invocation: &ToolInvocation) -> Option<ToolOutput> {
        let output = invocation.output.as_ref()?.clone();
        let decoded = match invocation.name.as_str() {
            TOOL_SUMMARIZE_NOTES => serde_json::from_value(output).map(ToolOutput::Summary),
            TOOL_CREATE_FLASHCARDS => serde_json::from_value(output).map(ToolOutput::FlashcardSet),
            TOOL_CREATE_QUIZ => serde_json::from_value(output).map(ToolOutput::Quiz),
            TOOL_CREATE_STUDY_PLAN => serde_json::from_value(output).map(ToolOutput::StudyPlan),
            TOOL_HIGHLIGHT_INSIGHTS => serde_json::from_value(output).map(ToolOutput::Insights),
            _ => return None,
        };
        match decoded {
            Ok(artifact) => Some(artifact),
            Err(err) => {
                log::warn!(
                    "tool {} returned output that fails its schema: {err}",
                    invocation.name
                );
                None
            }
        }
    }

    /// The persistence shape this artifact maps to. Exhaustive by
    /// construction: adding a variant forces a decision here.
    pub fn content_kind(&self) -> ContentKind {
        match self {
            ToolOutput::Summary(_) => ContentKind::Summary,
            ToolOutput::FlashcardSet(_) => ContentKind::FlashcardSet,
            ToolOutput::Quiz(_) => ContentKind::Quiz,
            ToolOutput::StudyPlan(_) => ContentKind::StudyPlan,
            ToolOutput::Insights(_) => ContentKind::Insights,
        }
    }

    /// Serialize back to the persistence payload.
    pub fn into_payload(self) -> Value {
        let payload = match self {
            ToolOutput::Summary(a) => serde_json::to_value(a),
            ToolOutput::FlashcardSet(a) => serde_json::to_value(a),
            ToolOutput::Quiz(a) => serde_json::to_value(a),
            ToolOutput::StudyPlan(a) => serde_json::to_value(a),
            ToolOutput::Insights(a) => serde_json::to_value(a),
        };
        payload.unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(name: &str, output: Value) -> ToolInvocation {
        ToolInvocation {
            name: name.to_string(),
            input: json!({}),
            output: Some(output),
        }
    }

    #[test]
    fn test_summary_output_decodes() {
        let inv = invocation(
            TOOL_SUMMARIZE_NOTES,
            json!({
                "title": "Cell Biology",
                "summary": "Cells are the unit of life.",
                "keywords": ["cells", "biology"]
            }),
        );
        let output = ToolOutput::from_invocation(&inv).unwrap();
        assert_eq!(output.content_kind(), ContentKind::Summary);
        match output {
            ToolOutput::Summary(a) => {
                assert_eq!(a.title.as_deref(), Some("Cell Biology"));
                assert_eq!(a.keywords.len(), 2);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn test_quiz_output_decodes() {
        let inv = invocation(
            TOOL_CREATE_QUIZ,
            json!({
                "quiz": [{
                    "question": "2+2?",
                    "options": ["3", "4"],
                    "answer": "4"
                }]
            }),
        );
        let output = ToolOutput::from_invocation(&inv).unwrap();
        assert_eq!(output.content_kind(), ContentKind::Quiz);
    }

    #[test]
    fn test_unknown_tool_name_yields_none() {
        let inv = invocation("telepathy", json!({ "anything": true }));
        assert!(ToolOutput::from_invocation(&inv).is_none());
    }

    #[test]
    fn test_unresolved_invocation_yields_none() {
        let inv = ToolInvocation {
            name: TOOL_CREATE_QUIZ.to_string(),
            input: json!({}),
            output: None,
        };
        assert!(ToolOutput::from_invocation(&inv).is_none());
    }

    #[test]
    fn test_schema_violation_yields_none() {
        let inv = invocation(TOOL_SUMMARIZE_NOTES, json!({ "nope": 1 }));
        assert!(ToolOutput::from_invocation(&inv).is_none());
    }

    #[test]
    fn test_default_schemas_cover_persistable_tools() {
        let schemas = default_tool_schemas();
        for name in [
            TOOL_SUMMARIZE_NOTES,
            TOOL_CREATE_FLASHCARDS,
            TOOL_CREATE_QUIZ,
            TOOL_CREATE_STUDY_PLAN,
            TOOL_HIGHLIGHT_INSIGHTS,
        ] {
            assert!(schemas.iter().any(|s| s.name == name), "missing {name}");
        }
    }
}
