// Weaver — Workflow definitions and run results

pub mod action;
pub mod context;
pub mod executor;
pub mod graph;
pub mod parser;

use crate::provider::Granularity;
use crate::token::Tokens;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Definitions (read-only to the engine)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub actions: Vec<ActionDefinition>,
    #[serde(default)]
    pub output: OutputDestination,
    /// Ids of workflows whose results this one consumes.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Which provider and model an action talks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRef {
    pub provider: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionDefinition {
    Chat(ChatAction),
    Transcription(TranscriptionAction),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAction {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub provider: ProviderRef,
    pub prompt: PromptSource,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionAction {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub provider: ProviderRef,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub granularity: Granularity,
    pub source: InputSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptSource {
    Inline(String),
    File(String),
}

/// Where a transcription's audio comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InputSource {
    File { path: String },
    Url { url: String },
    /// The current selection holds a path or URL.
    Selection,
}

impl InputSource {
    pub fn tag(&self) -> &'static str {
        match self {
            InputSource::File { .. } => "file",
            InputSource::Url { .. } => "url",
            InputSource::Selection => "selection",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    NewNote,
    AppendToDocument,
    Clipboard,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputDestination {
    #[serde(default)]
    pub kind: OutputKind,
    #[serde(default)]
    pub folder: Option<String>,
}

impl ActionDefinition {
    pub fn id(&self) -> &str {
        match self {
            ActionDefinition::Chat(a) => &a.id,
            ActionDefinition::Transcription(a) => &a.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ActionDefinition::Chat(a) => &a.name,
            ActionDefinition::Transcription(a) => &a.name,
        }
    }

    pub fn provider(&self) -> &ProviderRef {
        match self {
            ActionDefinition::Chat(a) => &a.provider,
            ActionDefinition::Transcription(a) => &a.provider,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            ActionDefinition::Chat(_) => EntityKind::Chat,
            ActionDefinition::Transcription(_) => EntityKind::Transcription,
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

pub const TOKEN_PROMPT: &str = "prompt";
pub const TOKEN_RESPONSE: &str = "response";
pub const TOKEN_TRANSCRIPTION: &str = "transcription";
pub const TOKEN_TRANSCRIPTION_TIMESTAMPS: &str = "transcriptionWithTimestamps";
pub const TOKEN_TITLE: &str = "title";
pub const TOKEN_AUTHOR: &str = "author";
pub const TOKEN_SOURCE_URL: &str = "sourceUrl";
pub const TOKEN_DESCRIPTION: &str = "description";
pub const TOKEN_TAGS: &str = "tags";
/// Derived output text of a finished dependency workflow.
pub const TOKEN_OUTPUT: &str = "output";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Chat,
    Transcription,
    Workflow,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Chat => write!(f, "chat"),
            EntityKind::Transcription => write!(f, "transcription"),
            EntityKind::Workflow => write!(f, "workflow"),
        }
    }
}

/// Outcome of one action or one folded dependency workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    entity_id: String,
    kind: EntityKind,
    success: bool,
    error: Option<String>,
    tokens: Tokens,
}

impl ExecutionResult {
    pub fn succeeded(entity_id: impl Into<String>, kind: EntityKind, tokens: Tokens) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
            success: true,
            error: None,
            tokens,
        }
    }

    pub fn failed(entity_id: impl Into<String>, kind: EntityKind, error: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            kind,
            success: false,
            error: Some(error.into()),
            tokens: Tokens::new(),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn tokens(&self) -> &Tokens {
        &self.tokens
    }

    pub fn token(&self, name: &str) -> Option<&str> {
        self.tokens.get(name).map(String::as_str)
    }
}

/// Output text of a finished entity: chat ⇒ `response`; transcription ⇒
/// timestamped text when present, else plain text.
pub fn derive_output_text(result: &ExecutionResult) -> String {
    let text = match result.kind() {
        EntityKind::Chat => result.token(TOKEN_RESPONSE),
        EntityKind::Transcription => result
            .token(TOKEN_TRANSCRIPTION_TIMESTAMPS)
            .or_else(|| result.token(TOKEN_TRANSCRIPTION)),
        EntityKind::Workflow => result.token(TOKEN_OUTPUT),
    };
    text.unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_action_json() {
        let json = r#"{
            "type": "chat",
            "id": "a1",
            "name": "Summarize",
            "provider": "oa",
            "model": "gpt-4o",
            "prompt": {"inline": "Summarize: {{clipboard}}"}
        }"#;
        let action: ActionDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(action.id(), "a1");
        assert_eq!(action.kind(), EntityKind::Chat);
        assert_eq!(action.provider().model, "gpt-4o");
        match action {
            ActionDefinition::Chat(c) => {
                assert_eq!(c.prompt, PromptSource::Inline("Summarize: {{clipboard}}".into()));
                assert!(c.temperature.is_none());
            }
            _ => panic!("expected chat action"),
        }
    }

    #[test]
    fn test_parse_transcription_action_json() {
        let json = r#"{
            "type": "transcription",
            "id": "t1",
            "name": "Transcribe",
            "provider": "az",
            "model": "whisper",
            "granularity": "segment",
            "source": {"kind": "file", "path": "/tmp/a.mp3"}
        }"#;
        let action: ActionDefinition = serde_json::from_str(json).unwrap();
        match action {
            ActionDefinition::Transcription(t) => {
                assert_eq!(t.granularity, Granularity::Segment);
                assert_eq!(t.source.tag(), "file");
                assert!(t.language.is_none());
            }
            _ => panic!("expected transcription action"),
        }
    }

    #[test]
    fn test_workflow_defaults() {
        let json = r#"{"id": "w", "name": "W"}"#;
        let wf: WorkflowDefinition = serde_json::from_str(json).unwrap();
        assert!(wf.actions.is_empty());
        assert!(wf.dependencies.is_empty());
        assert_eq!(wf.output.kind, OutputKind::NewNote);
        assert!(wf.output.folder.is_none());
    }

    #[test]
    fn test_derive_output_prefers_timestamps() {
        let mut tokens = Tokens::new();
        tokens.insert(TOKEN_TRANSCRIPTION.into(), "plain".into());
        let r = ExecutionResult::succeeded("t", EntityKind::Transcription, tokens.clone());
        assert_eq!(derive_output_text(&r), "plain");

        tokens.insert(TOKEN_TRANSCRIPTION_TIMESTAMPS.into(), "[00:00] plain".into());
        let r = ExecutionResult::succeeded("t", EntityKind::Transcription, tokens);
        assert_eq!(derive_output_text(&r), "[00:00] plain");
    }

    #[test]
    fn test_failed_result_has_no_tokens() {
        let r = ExecutionResult::failed("a", EntityKind::Chat, "boom");
        assert!(!r.is_success());
        assert_eq!(r.error(), Some("boom"));
        assert!(r.tokens().is_empty());
    }
}
