// Weaver — Action executor
//
// Runs one chat or transcription action and turns whatever happens into an
// `ExecutionResult`. Errors never propagate past `execute`.

use crate::error::WeaveError;
use crate::provider::factory::{create_provider, ProviderAdapter};
use crate::provider::{ChatOptions, LLMProvider, Message, TranscribeOptions, Transcription};
use crate::token::{self, ResultsById, Tokens};
use crate::workflow::context::{AudioInput, RunScope};
use crate::workflow::*;
use std::path::Path;
use std::time::Instant;

/// Execute `action` against the results finished so far in this run.
///
/// `local` holds earlier actions of the same workflow, `dependencies` the
/// folded results of dependency workflows. Lookups try `local` first.
pub async fn execute(
    action: &ActionDefinition,
    run: &RunScope<'_>,
    local: &ResultsById,
    dependencies: &ResultsById,
) -> ExecutionResult {
    let start = Instant::now();
    tracing::info!(action = %action.id(), kind = %action.kind(), name = %action.name(), "Executing action");

    let outcome = match action {
        ActionDefinition::Chat(chat) => execute_chat(chat, run, local, dependencies).await,
        ActionDefinition::Transcription(t) => execute_transcription(t, run).await,
    };
    let duration = start.elapsed();

    match outcome {
        Ok(tokens) => {
            tracing::info!(
                action = %action.id(),
                duration_ms = %duration.as_millis(),
                tokens = tokens.len(),
                "Action completed"
            );
            ExecutionResult::succeeded(action.id(), action.kind(), tokens)
        }
        Err(e) => {
            tracing::error!(
                action = %action.id(),
                duration_ms = %duration.as_millis(),
                error = %e,
                "Action failed"
            );
            ExecutionResult::failed(action.id(), action.kind(), e.to_string())
        }
    }
}

fn adapter_for(run: &RunScope<'_>, reference: &ProviderRef) -> Result<ProviderAdapter, WeaveError> {
    let cfg = run.config.resolve_provider(reference)?;
    create_provider(cfg)
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

async fn execute_chat(
    chat: &ChatAction,
    run: &RunScope<'_>,
    local: &ResultsById,
    dependencies: &ResultsById,
) -> Result<Tokens, WeaveError> {
    let provider = adapter_for(run, &chat.provider)?;
    if !provider.supports_chat() {
        return Err(WeaveError::capability(format!(
            "model '{}' of provider '{}' does not support chat",
            chat.provider.model, chat.provider.provider
        )));
    }

    let prompt = resolve_prompt(chat, run, local, dependencies).await?;

    let options = ChatOptions {
        temperature: chat.temperature.or(run.config.defaults.temperature),
        max_tokens: chat.max_tokens.or(run.config.defaults.max_tokens),
    };
    let response = provider
        .chat(&[Message::user(prompt.clone())], &options)
        .await?;

    if let Some(usage) = &response.usage {
        tracing::debug!(
            action = %chat.id,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Chat usage"
        );
    }

    let mut tokens = Tokens::new();
    tokens.insert(TOKEN_PROMPT.to_string(), prompt);
    tokens.insert(TOKEN_RESPONSE.to_string(), response.content);
    Ok(tokens)
}

/// Load the prompt and resolve every token it references.
///
/// Entity tokens are resolved first; context is gathered only when a bare
/// context token is still present afterwards.
pub async fn resolve_prompt(
    chat: &ChatAction,
    run: &RunScope<'_>,
    local: &ResultsById,
    dependencies: &ResultsById,
) -> Result<String, WeaveError> {
    let raw = match &chat.prompt {
        PromptSource::Inline(text) => text.clone(),
        PromptSource::File(path) => run.collaborators.prompts.load(path).await?,
    };

    let mut text = token::substitute_entities_in(&raw, &[local, dependencies]);
    if token::has_context_tokens(&text) {
        text = token::substitute_context(&text, run.context().await);
    }

    if text.trim().is_empty() {
        return Err(WeaveError::validation("empty prompt"));
    }
    Ok(text)
}

// ---------------------------------------------------------------------------
// Transcription
// ---------------------------------------------------------------------------

async fn execute_transcription(
    action: &TranscriptionAction,
    run: &RunScope<'_>,
) -> Result<Tokens, WeaveError> {
    let provider = adapter_for(run, &action.provider)?;
    if !provider.supports_transcription() {
        return Err(WeaveError::capability(format!(
            "model '{}' of provider '{}' does not support transcription",
            action.provider.model, action.provider.provider
        )));
    }

    let input = resolve_input(&action.source, run).await?;
    tracing::debug!(action = %action.id, source = %action.source.tag(), "Acquiring audio input");
    let audio = run.collaborators.inputs.acquire(&input).await?;

    let options = TranscribeOptions {
        language: action.language.clone().filter(|l| !l.trim().is_empty()),
        granularity: action.granularity,
    };
    let transcript = provider.transcribe(&audio.path, &options).await?;

    let source_url = audio.source_url.clone().or(match &input {
        AudioInput::Url(url) => Some(url.clone()),
        AudioInput::File(_) => None,
    });
    let title = audio
        .title
        .clone()
        .unwrap_or_else(|| file_stem(&audio.path));

    let mut tokens = Tokens::new();
    tokens.insert(TOKEN_TRANSCRIPTION.to_string(), transcript.text.clone());
    tokens.insert(TOKEN_TITLE.to_string(), title);
    tokens.insert(TOKEN_AUTHOR.to_string(), audio.author.clone().unwrap_or_default());
    tokens.insert(TOKEN_SOURCE_URL.to_string(), source_url.unwrap_or_default());
    tokens.insert(
        TOKEN_DESCRIPTION.to_string(),
        audio.description.clone().unwrap_or_default(),
    );
    tokens.insert(TOKEN_TAGS.to_string(), audio.tags.join(", "));
    if action.granularity.wants_timestamps() {
        tokens.insert(
            TOKEN_TRANSCRIPTION_TIMESTAMPS.to_string(),
            format_timestamped(&transcript),
        );
    }
    Ok(tokens)
}

async fn resolve_input(source: &InputSource, run: &RunScope<'_>) -> Result<AudioInput, WeaveError> {
    match source {
        InputSource::File { path } => {
            if path.trim().is_empty() {
                return Err(WeaveError::validation("no input file configured"));
            }
            Ok(AudioInput::File(path.into()))
        }
        InputSource::Url { url } => {
            if url.trim().is_empty() {
                return Err(WeaveError::validation("no input URL configured"));
            }
            Ok(AudioInput::Url(url.trim().to_string()))
        }
        InputSource::Selection => {
            let selection = run
                .context()
                .await
                .selection
                .as_deref()
                .map(str::trim)
                .unwrap_or_default();
            if selection.is_empty() {
                return Err(WeaveError::validation("nothing selected to transcribe"));
            }
            if selection.starts_with("http://") || selection.starts_with("https://") {
                Ok(AudioInput::Url(selection.to_string()))
            } else {
                Ok(AudioInput::File(selection.into()))
            }
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// One `[start - end] text` line per chunk; plain text when there are none.
pub fn format_timestamped(transcript: &Transcription) -> String {
    if transcript.chunks.is_empty() {
        return transcript.text.clone();
    }
    transcript
        .chunks
        .iter()
        .map(|c| {
            format!(
                "[{} - {}] {}",
                format_timestamp(c.start),
                format_timestamp(c.end),
                c.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `MM:SS`, or `H:MM:SS` from one hour on.
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::provider::TranscriptChunk;
    use crate::testing::{collaborators, Recorder};

    fn chat(prompt: PromptSource) -> ChatAction {
        ChatAction {
            id: "a1".into(),
            name: "A1".into(),
            provider: ProviderRef {
                provider: "p".into(),
                model: "m".into(),
            },
            prompt,
            temperature: None,
            max_tokens: None,
        }
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(75.9), "01:15");
        assert_eq!(format_timestamp(3725.0), "1:02:05");
    }

    #[test]
    fn test_format_timestamped_lines() {
        let t = Transcription {
            text: "a b".into(),
            chunks: vec![
                TranscriptChunk {
                    start: 0.0,
                    end: 1.2,
                    text: "a".into(),
                },
                TranscriptChunk {
                    start: 61.0,
                    end: 62.5,
                    text: "b".into(),
                },
            ],
            words: None,
        };
        assert_eq!(format_timestamped(&t), "[00:00 - 00:01] a\n[01:01 - 01:02] b");
        assert_eq!(format_timestamped(&Transcription::default()), "");
    }

    #[tokio::test]
    async fn test_prompt_skips_context_when_not_referenced() {
        let recorder = Recorder::default();
        let collab = collaborators(&recorder);
        let config = Config::default();
        let run = RunScope::new(&config, &collab);

        let mut local = ResultsById::new();
        local.insert("prev".into(), Tokens::from([("response".into(), "42".into())]));
        let action = chat(PromptSource::Inline("Answer: {{prev.response}}".into()));

        let prompt = resolve_prompt(&action, &run, &local, &ResultsById::new())
            .await
            .unwrap();
        assert_eq!(prompt, "Answer: 42");
        assert!(!run.context_gathered());
    }

    #[tokio::test]
    async fn test_prompt_from_file_with_context() {
        let recorder = Recorder::default();
        let collab = collaborators(&recorder);
        let config = Config::default();
        let run = RunScope::new(&config, &collab);

        let action = chat(PromptSource::File("greeting.md".into()));
        let prompt = resolve_prompt(&action, &run, &ResultsById::new(), &ResultsById::new())
            .await
            .unwrap();
        assert_eq!(prompt, "Loaded greeting.md with hello world");
        assert!(run.context_gathered());
    }

    #[tokio::test]
    async fn test_blank_prompt_is_validation_error() {
        let recorder = Recorder::default();
        let collab = collaborators(&recorder);
        let config = Config::default();
        let run = RunScope::new(&config, &collab);

        // an absent selection leaves the literal token, so this is not blank
        let action = chat(PromptSource::Inline("   {{selection}}  ".into()));
        let prompt = resolve_prompt(&action, &run, &ResultsById::new(), &ResultsById::new())
            .await
            .unwrap();
        assert_eq!(prompt, "   {{selection}}  ");

        let action = chat(PromptSource::Inline("  \n ".into()));
        let err = resolve_prompt(&action, &run, &ResultsById::new(), &ResultsById::new())
            .await
            .unwrap_err();
        assert_eq!(err, WeaveError::validation("empty prompt"));
    }

    #[tokio::test]
    async fn test_missing_provider_becomes_failed_result() {
        let recorder = Recorder::default();
        let collab = collaborators(&recorder);
        let config = Config::default();
        let run = RunScope::new(&config, &collab);

        let action = ActionDefinition::Chat(chat(PromptSource::Inline("hi".into())));
        let result = execute(&action, &run, &ResultsById::new(), &ResultsById::new()).await;
        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("provider 'p' is not configured"));
        assert_eq!(result.kind(), EntityKind::Chat);
    }

    #[tokio::test]
    async fn test_selection_input_resolution() {
        let recorder = Recorder::default();
        let collab = collaborators(&recorder);
        let config = Config::default();
        let run = RunScope::new(&config, &collab);

        // the test gatherer has no selection
        let err = resolve_input(&InputSource::Selection, &run).await.unwrap_err();
        assert!(matches!(err, WeaveError::Validation(_)));

        let input = resolve_input(
            &InputSource::Url {
                url: " https://youtu.be/x ".into(),
            },
            &run,
        )
        .await
        .unwrap();
        assert_eq!(input, AudioInput::Url("https://youtu.be/x".into()));
    }
}
