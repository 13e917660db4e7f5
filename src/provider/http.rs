// Weaver — HTTP-based providers (OpenAI-compatible chat + audio transcription)
//
// One base type performs the request/response plumbing. The two supported
// APIs differ only in URL layout, auth header, chat body shape and extra
// upload fields, which the `Flavor` hooks supply.

use super::*;
use crate::multipart;
use reqwest::Client;
use serde_json::{json, Value};
use std::marker::PhantomData;

pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// Per-API hooks used by [`HTTPProvider`].
pub trait Flavor: Send + Sync + 'static {
    /// Check required fields before any network call.
    fn validate(cfg: &ProviderAdapterConfig) -> Result<(), WeaveError>;
    fn chat_url(cfg: &ProviderAdapterConfig) -> String;
    fn transcription_url(cfg: &ProviderAdapterConfig) -> String;
    /// Header name and value carrying the credential.
    fn auth_header(cfg: &ProviderAdapterConfig) -> (&'static str, String);
    fn chat_body(cfg: &ProviderAdapterConfig, messages: &[Message], options: &ChatOptions)
        -> Value;
    /// Form fields placed right after the file part.
    fn extra_form_fields(cfg: &ProviderAdapterConfig) -> Vec<(String, String)>;
}

/// Azure OpenAI: deployment-scoped URLs, `api-key` header, model lives in the URL.
pub struct AzureOpenAI;

/// OpenAI: bearer auth, fixed base path, model sent explicitly.
pub struct OpenAI;

impl AzureOpenAI {
    fn deployment_url(cfg: &ProviderAdapterConfig, operation: &str) -> String {
        format!(
            "{}/openai/deployments/{}/{}?api-version={}",
            cfg.endpoint.trim_end_matches('/'),
            cfg.deployment,
            operation,
            cfg.api_version.as_deref().unwrap_or(DEFAULT_AZURE_API_VERSION)
        )
    }
}

impl Flavor for AzureOpenAI {
    fn validate(cfg: &ProviderAdapterConfig) -> Result<(), WeaveError> {
        if cfg.api_key.trim().is_empty() {
            return Err(WeaveError::config(format!(
                "provider '{}' has no API key",
                cfg.id
            )));
        }
        if cfg.endpoint.trim().is_empty() {
            return Err(WeaveError::config(format!(
                "provider '{}' has no endpoint",
                cfg.id
            )));
        }
        if cfg.deployment.trim().is_empty() {
            return Err(WeaveError::config(format!(
                "model '{}' of provider '{}' has no deployment id",
                cfg.model, cfg.id
            )));
        }
        Ok(())
    }

    fn chat_url(cfg: &ProviderAdapterConfig) -> String {
        Self::deployment_url(cfg, "chat/completions")
    }

    fn transcription_url(cfg: &ProviderAdapterConfig) -> String {
        Self::deployment_url(cfg, "audio/transcriptions")
    }

    fn auth_header(cfg: &ProviderAdapterConfig) -> (&'static str, String) {
        ("api-key", cfg.api_key.clone())
    }

    fn chat_body(
        _cfg: &ProviderAdapterConfig,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Value {
        let mut body = json!({ "messages": messages });
        apply_options(&mut body, options);
        body
    }

    fn extra_form_fields(_cfg: &ProviderAdapterConfig) -> Vec<(String, String)> {
        Vec::new()
    }
}

impl OpenAI {
    fn base(cfg: &ProviderAdapterConfig) -> &str {
        let endpoint = cfg.endpoint.trim();
        if endpoint.is_empty() {
            DEFAULT_OPENAI_ENDPOINT
        } else {
            endpoint.trim_end_matches('/')
        }
    }
}

impl Flavor for OpenAI {
    fn validate(cfg: &ProviderAdapterConfig) -> Result<(), WeaveError> {
        if cfg.api_key.trim().is_empty() {
            return Err(WeaveError::config(format!(
                "provider '{}' has no API key",
                cfg.id
            )));
        }
        if cfg.model.trim().is_empty() {
            return Err(WeaveError::config(format!(
                "provider '{}' has no model id",
                cfg.id
            )));
        }
        Ok(())
    }

    fn chat_url(cfg: &ProviderAdapterConfig) -> String {
        format!("{}/chat/completions", Self::base(cfg))
    }

    fn transcription_url(cfg: &ProviderAdapterConfig) -> String {
        format!("{}/audio/transcriptions", Self::base(cfg))
    }

    fn auth_header(cfg: &ProviderAdapterConfig) -> (&'static str, String) {
        ("Authorization", format!("Bearer {}", cfg.api_key))
    }

    fn chat_body(cfg: &ProviderAdapterConfig, messages: &[Message], options: &ChatOptions) -> Value {
        let mut body = json!({
            "model": cfg.model,
            "messages": messages,
        });
        apply_options(&mut body, options);
        body
    }

    fn extra_form_fields(cfg: &ProviderAdapterConfig) -> Vec<(String, String)> {
        vec![("model".to_string(), cfg.model.clone())]
    }
}

fn apply_options(body: &mut Value, options: &ChatOptions) {
    if let Some(t) = options.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(n) = options.max_tokens {
        body["max_tokens"] = json!(n);
    }
}

/// Shared HTTP plumbing for both flavors.
pub struct HTTPProvider<F: Flavor> {
    config: ProviderAdapterConfig,
    client: Client,
    flavor: PhantomData<fn() -> F>,
}

impl<F: Flavor> HTTPProvider<F> {
    /// Validates the configuration; fails before any request is sent.
    pub fn new(config: ProviderAdapterConfig) -> Result<Self, WeaveError> {
        F::validate(&config)?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            config,
            client,
            flavor: PhantomData,
        })
    }

    async fn read_success_body(response: reqwest::Response) -> Result<String, WeaveError> {
        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            tracing::debug!(status = %status, body_len = body.len(), "Provider response received");
            return Ok(body);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "could not read body".to_string());
        tracing::warn!(status = %status, "Provider returned an error status");
        Err(WeaveError::http(status.as_u16(), body))
    }
}

#[async_trait]
impl<F: Flavor> LLMProvider for HTTPProvider<F> {
    fn supports_chat(&self) -> bool {
        self.config.capabilities.chat
    }

    fn supports_transcription(&self) -> bool {
        self.config.capabilities.transcription
    }

    async fn chat(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatResponse, WeaveError> {
        let url = F::chat_url(&self.config);
        let (header, value) = F::auth_header(&self.config);
        let body = F::chat_body(&self.config, messages, options);

        tracing::debug!(
            url = %url,
            provider = %self.config.id,
            model = %self.config.model,
            "Sending chat request"
        );

        let response = self
            .client
            .post(&url)
            .header(header, value)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let text = Self::read_success_body(response).await?;
        parse_chat_response(&text)
    }

    async fn transcribe(
        &self,
        audio: &Path,
        options: &TranscribeOptions,
    ) -> Result<Transcription, WeaveError> {
        let bytes = tokio::fs::read(audio).await.map_err(|e| {
            WeaveError::validation(format!("cannot read audio file {}: {}", audio.display(), e))
        })?;
        if bytes.is_empty() {
            return Err(WeaveError::validation(format!(
                "audio file {} is empty",
                audio.display()
            )));
        }

        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());

        let boundary = multipart::new_boundary();
        let body = multipart::build_body(
            &boundary,
            &bytes,
            &file_name,
            options.granularity,
            options.language.as_deref(),
            &F::extra_form_fields(&self.config),
        );

        let url = F::transcription_url(&self.config);
        let (header, value) = F::auth_header(&self.config);

        tracing::debug!(
            url = %url,
            provider = %self.config.id,
            file = %file_name,
            bytes = bytes.len(),
            "Sending transcription request"
        );

        let response = self
            .client
            .post(&url)
            .header(header, value)
            .header("Content-Type", multipart::content_type(&boundary))
            .body(body)
            .send()
            .await?;

        let text = Self::read_success_body(response).await?;
        parse_transcription(&text, options.granularity)
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Parse an OpenAI-compatible chat completion response.
pub fn parse_chat_response(body: &str) -> Result<ChatResponse, WeaveError> {
    let v: Value = serde_json::from_str(body)?;

    if let Some(err) = v.get("error") {
        let msg = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        return Err(WeaveError::Transport {
            status: None,
            message: format!("provider API error: {}", msg),
        });
    }

    let message = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| WeaveError::Transport {
            status: None,
            message: "no choices in provider response".to_string(),
        })?;

    let content = message
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .to_string();

    let usage = v.get("usage").map(|u| UsageInfo {
        prompt_tokens: u.get("prompt_tokens").and_then(|n| n.as_u64()).unwrap_or(0) as usize,
        completion_tokens: u
            .get("completion_tokens")
            .and_then(|n| n.as_u64())
            .unwrap_or(0) as usize,
        total_tokens: u.get("total_tokens").and_then(|n| n.as_u64()).unwrap_or(0) as usize,
    });

    Ok(ChatResponse { content, usage })
}

/// Parse a transcription response according to the requested granularity.
///
/// Disabled granularity never yields chunks, even if the response has
/// segments. Word lists are only kept for word granularity and only when
/// the response actually contains them.
pub fn parse_transcription(
    body: &str,
    granularity: Granularity,
) -> Result<Transcription, WeaveError> {
    let v: Value = serde_json::from_str(body)?;

    let text = v
        .get("text")
        .and_then(|t| t.as_str())
        .unwrap_or("")
        .trim()
        .to_string();

    let chunks = if granularity.wants_timestamps() {
        v.get("segments")
            .and_then(|s| s.as_array())
            .map(|segments| {
                segments
                    .iter()
                    .map(|seg| TranscriptChunk {
                        start: seg.get("start").and_then(|n| n.as_f64()).unwrap_or(0.0),
                        end: seg.get("end").and_then(|n| n.as_f64()).unwrap_or(0.0),
                        text: seg
                            .get("text")
                            .and_then(|t| t.as_str())
                            .unwrap_or("")
                            .trim()
                            .to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    let words = match granularity {
        Granularity::Word => v.get("words").and_then(|w| w.as_array()).map(|words| {
            words
                .iter()
                .map(|w| TranscriptWord {
                    word: w
                        .get("word")
                        .and_then(|t| t.as_str())
                        .unwrap_or("")
                        .trim()
                        .to_string(),
                    start: w.get("start").and_then(|n| n.as_f64()).unwrap_or(0.0),
                    end: w.get("end").and_then(|n| n.as_f64()).unwrap_or(0.0),
                })
                .collect()
        }),
        _ => None,
    };

    Ok(Transcription {
        text,
        chunks,
        words,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cfg(kind: ProviderKind) -> ProviderAdapterConfig {
        ProviderAdapterConfig {
            id: "p".into(),
            name: "P".into(),
            kind,
            endpoint: String::new(),
            api_key: "key".into(),
            model: "gpt-4o".into(),
            deployment: "gpt4o-prod".into(),
            api_version: None,
            capabilities: Capabilities {
                chat: true,
                transcription: true,
            },
            request_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
        }
    }

    const VERBOSE: &str = r#"{
        "text": "  Hello world. Bye. ",
        "segments": [
            {"start": 0.0, "end": 1.5, "text": " Hello world. "},
            {"start": 1.5, "end": 2.0, "text": " Bye."}
        ],
        "words": [
            {"word": "Hello", "start": 0.0, "end": 0.4},
            {"word": "world", "start": 0.4, "end": 1.0}
        ]
    }"#;

    #[test]
    fn test_parse_simple_chat_response() {
        let json = r#"{
            "choices": [{
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;

        let resp = parse_chat_response(json).unwrap();
        assert_eq!(resp.content, "Hello!");
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_parse_chat_error_response() {
        let json = r#"{"error": {"message": "Invalid API key", "type": "auth_error"}}"#;
        let result = parse_chat_response(json);
        assert!(result.unwrap_err().to_string().contains("Invalid API key"));
    }

    #[test]
    fn test_parse_chat_without_choices() {
        assert!(parse_chat_response(r#"{"choices": []}"#).is_err());
    }

    #[test]
    fn test_disabled_granularity_drops_segments() {
        let t = parse_transcription(VERBOSE, Granularity::Disabled).unwrap();
        assert_eq!(t.text, "Hello world. Bye.");
        assert!(t.chunks.is_empty());
        assert!(t.words.is_none());
    }

    #[test]
    fn test_segment_granularity_trims_chunks() {
        let t = parse_transcription(VERBOSE, Granularity::Segment).unwrap();
        assert_eq!(t.chunks.len(), 2);
        assert_eq!(t.chunks[0].text, "Hello world.");
        assert_eq!(t.chunks[1].start, 1.5);
        assert!(t.words.is_none());
    }

    #[test]
    fn test_word_granularity_uses_supplied_words() {
        let t = parse_transcription(VERBOSE, Granularity::Word).unwrap();
        assert_eq!(t.chunks.len(), 2);
        let words = t.words.unwrap();
        assert_eq!(words.len(), 2);
        assert_eq!(words[1].word, "world");
    }

    #[test]
    fn test_word_granularity_without_words_omits_list() {
        let body = r#"{"text": "hi", "segments": [{"start": 0, "end": 1, "text": "hi"}]}"#;
        let t = parse_transcription(body, Granularity::Word).unwrap();
        assert_eq!(t.chunks.len(), 1);
        assert!(t.words.is_none());
    }

    #[test]
    fn test_azure_urls_and_auth() {
        let mut c = cfg(ProviderKind::AzureOpenAI);
        c.endpoint = "https://res.openai.azure.com/".into();
        assert_eq!(
            AzureOpenAI::chat_url(&c),
            "https://res.openai.azure.com/openai/deployments/gpt4o-prod/chat/completions?api-version=2024-06-01"
        );
        assert!(AzureOpenAI::transcription_url(&c).contains("/audio/transcriptions?"));
        assert_eq!(AzureOpenAI::auth_header(&c), ("api-key", "key".to_string()));
        let body = AzureOpenAI::chat_body(&c, &[Message::user("hi")], &ChatOptions::default());
        assert!(body.get("model").is_none());
        assert!(AzureOpenAI::extra_form_fields(&c).is_empty());
    }

    #[test]
    fn test_openai_defaults() {
        let c = cfg(ProviderKind::OpenAI);
        assert_eq!(
            OpenAI::chat_url(&c),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            OpenAI::auth_header(&c),
            ("Authorization", "Bearer key".to_string())
        );
        let opts = ChatOptions {
            temperature: Some(0.2),
            max_tokens: None,
        };
        let body = OpenAI::chat_body(&c, &[Message::user("hi")], &opts);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], 0.2);
        assert!(body.get("max_tokens").is_none());
        assert_eq!(
            OpenAI::extra_form_fields(&c),
            vec![("model".to_string(), "gpt-4o".to_string())]
        );
    }

    #[test]
    fn test_validation_runs_before_any_call() {
        let mut c = cfg(ProviderKind::AzureOpenAI);
        c.endpoint = "https://res.openai.azure.com".into();
        c.deployment = String::new();
        let err = HTTPProvider::<AzureOpenAI>::new(c).err().unwrap();
        assert!(matches!(err, WeaveError::Configuration(_)));

        let mut c = cfg(ProviderKind::OpenAI);
        c.api_key = " ".into();
        let err = HTTPProvider::<OpenAI>::new(c).err().unwrap();
        assert!(err.to_string().contains("no API key"));
    }
}
