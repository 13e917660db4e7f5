// Weaver — In-memory collaborators for unit tests

use crate::error::WeaveError;
use crate::token::ContextSnapshot;
use crate::workflow::context::*;
use crate::workflow::ExecutionResult;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Records everything the engine hands to collaborators.
#[derive(Clone, Default)]
pub struct Recorder {
    pub gathers: Arc<Mutex<usize>>,
    pub outputs: Arc<Mutex<Vec<WorkflowOutput>>>,
    pub notices: Arc<Mutex<Vec<Notice>>>,
}

impl Recorder {
    pub fn gather_count(&self) -> usize {
        *self.gathers.lock().unwrap()
    }

    pub fn outputs(&self) -> Vec<WorkflowOutput> {
        self.outputs.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

struct EchoPrompts;

#[async_trait]
impl PromptFileLoader for EchoPrompts {
    async fn load(&self, path: &str) -> Result<String, WeaveError> {
        Ok(format!("Loaded {} with {{{{clipboard}}}}", path))
    }
}

struct NoInputs;

#[async_trait]
impl InputAcquirer for NoInputs {
    async fn acquire(&self, input: &AudioInput) -> Result<AcquiredAudio, WeaveError> {
        Err(WeaveError::validation(format!("no audio for {:?}", input)))
    }
}

struct FixedContext(Recorder);

#[async_trait]
impl ContextGatherer for FixedContext {
    async fn gather(&self) -> ContextSnapshot {
        *self.0.gathers.lock().unwrap() += 1;
        ContextSnapshot {
            clipboard: Some("hello world".into()),
            document_name: Some("Daily".into()),
            ..Default::default()
        }
    }
}

struct RecordingSink(Recorder);

#[async_trait]
impl OutputSink for RecordingSink {
    async fn deliver(&self, output: &WorkflowOutput) -> anyhow::Result<()> {
        self.0.outputs.lock().unwrap().push(output.clone());
        Ok(())
    }
}

struct RecordingNotifier(Recorder);

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.0.notices.lock().unwrap().push(notice);
    }
}

struct TitleFromToken;

impl TitleDeriver for TitleFromToken {
    fn derive(&self, result: &ExecutionResult) -> String {
        format!("Derived - {}", result.token("title").unwrap_or_default())
    }
}

pub fn collaborators(recorder: &Recorder) -> Collaborators {
    Collaborators {
        prompts: Arc::new(EchoPrompts),
        inputs: Arc::new(NoInputs),
        context: Arc::new(FixedContext(recorder.clone())),
        output: Arc::new(RecordingSink(recorder.clone())),
        titles: Arc::new(TitleFromToken),
        notifier: Arc::new(RecordingNotifier(recorder.clone())),
        dependencies: Arc::new(DeclaredDependencies),
    }
}
