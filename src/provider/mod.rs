// Weaver — LLM provider abstraction

pub mod factory;
pub mod http;

use crate::error::WeaveError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageInfo {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// Requested level of timestamp detail in a transcription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Disabled,
    Segment,
    Word,
}

impl Granularity {
    pub fn wants_timestamps(self) -> bool {
        !matches!(self, Granularity::Disabled)
    }

    /// Value of the `timestamp_granularities[]` form field, if one is sent.
    pub fn as_form_value(self) -> Option<&'static str> {
        match self {
            Granularity::Disabled => None,
            Granularity::Segment => Some("segment"),
            Granularity::Word => Some("word"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscribeOptions {
    pub language: Option<String>,
    pub granularity: Granularity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptWord {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    /// Segment-level timestamps. Always empty when granularity is disabled.
    pub chunks: Vec<TranscriptChunk>,
    /// Word-level timestamps, only when requested and returned by the API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<TranscriptWord>>,
}

// ---------------------------------------------------------------------------
// Adapter configuration
// ---------------------------------------------------------------------------

/// Provider type tag as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "azure-openai")]
    AzureOpenAI,
    #[serde(rename = "openai")]
    OpenAI,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::AzureOpenAI => write!(f, "azure-openai"),
            ProviderKind::OpenAI => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub chat: bool,
    #[serde(default)]
    pub transcription: bool,
}

/// Everything one adapter needs for one call. Built fresh from config each
/// time; adapters keep no state between invocations.
#[derive(Debug, Clone)]
pub struct ProviderAdapterConfig {
    pub id: String,
    pub name: String,
    pub kind: ProviderKind,
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub deployment: String,
    pub api_version: Option<String>,
    pub capabilities: Capabilities,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LLMProvider: Send + Sync {
    fn supports_chat(&self) -> bool;

    fn supports_transcription(&self) -> bool;

    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatResponse, WeaveError>;

    async fn transcribe(
        &self,
        audio: &Path,
        options: &TranscribeOptions,
    ) -> Result<Transcription, WeaveError>;

    fn model(&self) -> &str;
}
