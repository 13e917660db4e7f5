// Weaver — Provider factory

use super::http::{AzureOpenAI, HTTPProvider, OpenAI};
use super::*;

/// The closed set of supported providers, selected by type tag.
pub enum ProviderAdapter {
    AzureOpenAI(HTTPProvider<AzureOpenAI>),
    OpenAI(HTTPProvider<OpenAI>),
}

/// Create an adapter for one call.
///
/// Configuration problems (missing key, endpoint or deployment) surface
/// here, before any request is made.
pub fn create_provider(cfg: ProviderAdapterConfig) -> Result<ProviderAdapter, WeaveError> {
    tracing::debug!(
        provider = %cfg.id,
        kind = %cfg.kind,
        model = %cfg.model,
        endpoint = %if cfg.endpoint.is_empty() { "(default)" } else { &cfg.endpoint },
        "Creating provider adapter"
    );

    Ok(match cfg.kind {
        ProviderKind::AzureOpenAI => ProviderAdapter::AzureOpenAI(HTTPProvider::new(cfg)?),
        ProviderKind::OpenAI => ProviderAdapter::OpenAI(HTTPProvider::new(cfg)?),
    })
}

#[async_trait]
impl LLMProvider for ProviderAdapter {
    fn supports_chat(&self) -> bool {
        match self {
            ProviderAdapter::AzureOpenAI(p) => p.supports_chat(),
            ProviderAdapter::OpenAI(p) => p.supports_chat(),
        }
    }

    fn supports_transcription(&self) -> bool {
        match self {
            ProviderAdapter::AzureOpenAI(p) => p.supports_transcription(),
            ProviderAdapter::OpenAI(p) => p.supports_transcription(),
        }
    }

    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatResponse, WeaveError> {
        match self {
            ProviderAdapter::AzureOpenAI(p) => p.chat(messages, options).await,
            ProviderAdapter::OpenAI(p) => p.chat(messages, options).await,
        }
    }

    async fn transcribe(
        &self,
        audio: &Path,
        options: &TranscribeOptions,
    ) -> Result<Transcription, WeaveError> {
        match self {
            ProviderAdapter::AzureOpenAI(p) => p.transcribe(audio, options).await,
            ProviderAdapter::OpenAI(p) => p.transcribe(audio, options).await,
        }
    }

    fn model(&self) -> &str {
        match self {
            ProviderAdapter::AzureOpenAI(p) => p.model(),
            ProviderAdapter::OpenAI(p) => p.model(),
        }
    }
}
