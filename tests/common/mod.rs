#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use weaver::config::Config;
use weaver::error::WeaveError;
use weaver::host::PlatformTitleDeriver;
use weaver::token::ContextSnapshot;
use weaver::workflow::context::*;
use wiremock::{Request, ResponseTemplate};

#[derive(Clone, Default)]
pub struct Recorder {
    pub gathers: Arc<Mutex<usize>>,
    pub outputs: Arc<Mutex<Vec<WorkflowOutput>>>,
    pub notices: Arc<Mutex<Vec<Notice>>>,
    pub acquired: Arc<Mutex<Vec<AudioInput>>>,
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

pub struct StubContext {
    pub snapshot: ContextSnapshot,
    pub recorder: Recorder,
}

#[async_trait]
impl ContextGatherer for StubContext {
    async fn gather(&self) -> ContextSnapshot {
        *self.recorder.gathers.lock().unwrap() += 1;
        self.snapshot.clone()
    }
}

pub struct MapPrompts(pub HashMap<String, String>);

#[async_trait]
impl PromptFileLoader for MapPrompts {
    async fn load(&self, path: &str) -> Result<String, WeaveError> {
        self.0
            .get(path)
            .cloned()
            .ok_or_else(|| WeaveError::validation(format!("no prompt file {}", path)))
    }
}

/// Hands back the same audio file for every input.
pub struct StubInputs {
    pub audio: AcquiredAudio,
    pub recorder: Recorder,
}

#[async_trait]
impl InputAcquirer for StubInputs {
    async fn acquire(&self, input: &AudioInput) -> Result<AcquiredAudio, WeaveError> {
        self.recorder.acquired.lock().unwrap().push(input.clone());
        Ok(self.audio.clone())
    }
}

pub struct RecordingSink(pub Recorder);

#[async_trait]
impl OutputSink for RecordingSink {
    async fn deliver(&self, output: &WorkflowOutput) -> anyhow::Result<()> {
        self.0.outputs.lock().unwrap().push(output.clone());
        Ok(())
    }
}

pub struct RecordingNotifier(pub Recorder);

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.0.notices.lock().unwrap().push(notice);
    }
}

pub struct Harness {
    pub recorder: Recorder,
    pub snapshot: ContextSnapshot,
    pub prompts: HashMap<String, String>,
    pub audio: AcquiredAudio,
    pub dependencies: Arc<dyn DependencySource>,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            recorder: Recorder::default(),
            snapshot: ContextSnapshot::default(),
            prompts: HashMap::new(),
            audio: AcquiredAudio::default(),
            dependencies: Arc::new(DeclaredDependencies),
        }
    }
}

impl Harness {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            prompts: Arc::new(MapPrompts(self.prompts.clone())),
            inputs: Arc::new(StubInputs {
                audio: self.audio.clone(),
                recorder: self.recorder.clone(),
            }),
            context: Arc::new(StubContext {
                snapshot: self.snapshot.clone(),
                recorder: self.recorder.clone(),
            }),
            output: Arc::new(RecordingSink(self.recorder.clone())),
            titles: Arc::new(PlatformTitleDeriver),
            notifier: Arc::new(RecordingNotifier(self.recorder.clone())),
            dependencies: self.dependencies.clone(),
        }
    }
}

/// Write a small fake audio file and return its path.
pub fn audio_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, b"fake-audio-bytes").unwrap();
    path
}

pub fn config(value: Value) -> Config {
    serde_json::from_value(value).unwrap()
}

/// An OpenAI-type provider pointed at `uri` with one chat and one
/// transcription model.
pub fn openai_provider(uri: &str) -> Value {
    json!({
        "id": "oa",
        "name": "OpenAI",
        "type": "openai",
        "endpoint": uri,
        "api_key": "sk-test",
        "models": [
            {"id": "gpt-4o", "chat": true},
            {"id": "whisper-1", "transcription": true}
        ]
    })
}

pub fn chat_action(id: &str, prompt: &str) -> Value {
    json!({
        "type": "chat",
        "id": id,
        "name": id,
        "provider": "oa",
        "model": "gpt-4o",
        "prompt": {"inline": prompt}
    })
}

pub fn chat_completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 3, "completion_tokens": 3, "total_tokens": 6}
    })
}

/// Responds with the content of the last message it was sent.
pub fn echo(request: &Request) -> ResponseTemplate {
    let body: Value = serde_json::from_slice(&request.body).unwrap_or_default();
    let content = body["messages"]
        .as_array()
        .and_then(|m| m.last())
        .and_then(|m| m["content"].as_str())
        .unwrap_or("")
        .to_string();
    ResponseTemplate::new(200).set_body_json(chat_completion(&content))
}

/// Prompt text of a recorded chat request.
pub fn sent_prompt(request: &Request) -> String {
    let body: Value = serde_json::from_slice(&request.body).unwrap();
    body["messages"][0]["content"].as_str().unwrap().to_string()
}
