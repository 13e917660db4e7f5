// Weaver — Run-scoped context and external collaborators
//
// The engine never touches the editor, clipboard, filesystem layout or
// downloaders directly; it goes through these traits. `RunScope` carries
// everything one run shares, so no global state is needed.

use crate::config::Config;
use crate::error::WeaveError;
use crate::token::{self, ContextSnapshot};
use crate::workflow::{ExecutionResult, OutputKind, WorkflowDefinition};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PromptFileLoader: Send + Sync {
    async fn load(&self, path: &str) -> Result<String, WeaveError>;
}

/// Concrete audio input, after `selection` sources have been resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioInput {
    File(PathBuf),
    Url(String),
}

/// Audio ready for upload, plus whatever metadata the source offered.
#[derive(Debug, Clone, Default)]
pub struct AcquiredAudio {
    pub path: PathBuf,
    pub title: Option<String>,
    pub author: Option<String>,
    pub source_url: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Scratch directory holding `path` when the acquirer downloaded it.
    /// Removed once the last clone is dropped.
    pub scratch: Option<Arc<tempfile::TempDir>>,
}

#[async_trait]
pub trait InputAcquirer: Send + Sync {
    async fn acquire(&self, input: &AudioInput) -> Result<AcquiredAudio, WeaveError>;
}

#[async_trait]
pub trait ContextGatherer: Send + Sync {
    async fn gather(&self) -> ContextSnapshot;
}

/// Final text of a completed run and where it should go.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOutput {
    pub workflow_id: String,
    pub title: String,
    pub text: String,
    pub kind: OutputKind,
    pub folder: String,
}

#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn deliver(&self, output: &WorkflowOutput) -> anyhow::Result<()>;
}

/// Builds a title from a transcription result that carries a source URL.
pub trait TitleDeriver: Send + Sync {
    fn derive(&self, result: &ExecutionResult) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Produces the ids of the workflows a workflow depends on.
pub trait DependencySource: Send + Sync {
    fn dependencies(&self, workflow: &WorkflowDefinition, config: &Config) -> Vec<String>;
}

/// Reads the explicit `dependencies` list.
pub struct DeclaredDependencies;

impl DependencySource for DeclaredDependencies {
    fn dependencies(&self, workflow: &WorkflowDefinition, _config: &Config) -> Vec<String> {
        workflow.dependencies.clone()
    }
}

/// Infers dependencies from `{{workflowId.token}}` references in inline
/// chat prompts. Ids of the workflow's own actions are not dependencies.
pub struct PromptReferencedDependencies;

impl DependencySource for PromptReferencedDependencies {
    fn dependencies(&self, workflow: &WorkflowDefinition, config: &Config) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        for action in &workflow.actions {
            let crate::workflow::ActionDefinition::Chat(chat) = action else {
                continue;
            };
            let crate::workflow::PromptSource::Inline(text) = &chat.prompt else {
                continue;
            };
            for id in token::referenced_entities(text) {
                let is_local = workflow.actions.iter().any(|a| a.id() == id);
                if !is_local
                    && id != workflow.id
                    && config.workflow(&id).is_some()
                    && !deps.contains(&id)
                {
                    deps.push(id);
                }
            }
        }
        deps
    }
}

/// Never reports dependencies.
pub struct NoDependencies;

impl DependencySource for NoDependencies {
    fn dependencies(&self, _workflow: &WorkflowDefinition, _config: &Config) -> Vec<String> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Collaborators {
    pub prompts: Arc<dyn PromptFileLoader>,
    pub inputs: Arc<dyn InputAcquirer>,
    pub context: Arc<dyn ContextGatherer>,
    pub output: Arc<dyn OutputSink>,
    pub titles: Arc<dyn TitleDeriver>,
    pub notifier: Arc<dyn Notifier>,
    pub dependencies: Arc<dyn DependencySource>,
}

/// State shared by everything inside one workflow run.
pub struct RunScope<'a> {
    pub config: &'a Config,
    pub collaborators: &'a Collaborators,
    snapshot: OnceCell<ContextSnapshot>,
}

impl<'a> RunScope<'a> {
    pub fn new(config: &'a Config, collaborators: &'a Collaborators) -> Self {
        Self {
            config,
            collaborators,
            snapshot: OnceCell::new(),
        }
    }

    /// The ambient context, gathered on first use and reused for the rest
    /// of the run.
    pub async fn context(&self) -> &ContextSnapshot {
        self.snapshot
            .get_or_init(|| async {
                tracing::debug!("Gathering ambient context");
                self.collaborators.context.gather().await
            })
            .await
    }

    pub fn context_gathered(&self) -> bool {
        self.snapshot.initialized()
    }
}
