// Weaver — Filesystem/terminal implementations of the engine's collaborators

use crate::error::WeaveError;
use crate::token::ContextSnapshot;
use crate::workflow::context::*;
use crate::workflow::{ExecutionResult, OutputKind, TOKEN_SOURCE_URL, TOKEN_TITLE};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

// ---------------------------------------------------------------------------
// Prompt files
// ---------------------------------------------------------------------------

/// Reads prompt files relative to a base directory.
pub struct FsPromptLoader {
    base: PathBuf,
}

impl FsPromptLoader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl PromptFileLoader for FsPromptLoader {
    async fn load(&self, path: &str) -> Result<String, WeaveError> {
        let full = self.base.join(crate::config::expand_home(path));
        tokio::fs::read_to_string(&full).await.map_err(|e| {
            WeaveError::validation(format!("cannot read prompt file {}: {}", full.display(), e))
        })
    }
}

// ---------------------------------------------------------------------------
// Audio input
// ---------------------------------------------------------------------------

/// Local files as-is; URLs through an optional external extractor command.
pub struct LocalInputAcquirer {
    extractor: Vec<String>,
    work_dir: PathBuf,
}

impl LocalInputAcquirer {
    pub fn new(extractor: Vec<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            extractor,
            work_dir: work_dir.into(),
        }
    }

    async fn extract(&self, url: &str) -> Result<AcquiredAudio, WeaveError> {
        let Some((program, args)) = self.extractor.split_first() else {
            return Err(WeaveError::config(
                "no audio extractor configured for URL inputs (defaults.audio_extractor)",
            ));
        };

        tokio::fs::create_dir_all(&self.work_dir).await.map_err(|e| {
            WeaveError::validation(format!("cannot create {}: {}", self.work_dir.display(), e))
        })?;
        let scratch = tempfile::Builder::new()
            .prefix("extract-")
            .tempdir_in(&self.work_dir)
            .map_err(|e| {
                WeaveError::validation(format!("cannot create scratch dir: {}", e))
            })?;
        let output = scratch.path().join("audio.mp3");
        let output_str = output.to_string_lossy().to_string();
        let args: Vec<String> = args
            .iter()
            .map(|a| a.replace("{url}", url).replace("{output}", &output_str))
            .collect();

        tracing::info!(program = %program, url = %url, "Extracting audio");
        let result = tokio::process::Command::new(program)
            .args(&args)
            .output()
            .await
            .map_err(|e| WeaveError::validation(format!("failed to run {}: {}", program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(WeaveError::validation(format!(
                "audio extraction failed ({}): {}",
                result.status,
                stderr.trim()
            )));
        }
        if !output.exists() {
            return Err(WeaveError::validation(format!(
                "audio extractor did not produce {}",
                output.display()
            )));
        }

        Ok(AcquiredAudio {
            path: output,
            source_url: Some(url.to_string()),
            scratch: Some(Arc::new(scratch)),
            ..Default::default()
        })
    }
}

#[async_trait]
impl InputAcquirer for LocalInputAcquirer {
    async fn acquire(&self, input: &AudioInput) -> Result<AcquiredAudio, WeaveError> {
        match input {
            AudioInput::File(path) => {
                let path = PathBuf::from(crate::config::expand_home(&path.to_string_lossy()));
                let meta = tokio::fs::metadata(&path).await.map_err(|_| {
                    WeaveError::validation(format!("input file {} not found", path.display()))
                })?;
                if meta.len() == 0 {
                    return Err(WeaveError::validation(format!(
                        "input file {} is empty",
                        path.display()
                    )));
                }
                Ok(AcquiredAudio {
                    title: path.file_stem().map(|s| s.to_string_lossy().to_string()),
                    path,
                    ..Default::default()
                })
            }
            AudioInput::Url(url) => self.extract(url).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Ambient context
// ---------------------------------------------------------------------------

/// A snapshot fixed up front (e.g. from command-line flags).
pub struct StaticContextGatherer {
    snapshot: ContextSnapshot,
}

impl StaticContextGatherer {
    pub fn new(snapshot: ContextSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl ContextGatherer for StaticContextGatherer {
    async fn gather(&self) -> ContextSnapshot {
        self.snapshot.clone()
    }
}

// ---------------------------------------------------------------------------
// Titles
// ---------------------------------------------------------------------------

const PLATFORMS: &[(&str, &str)] = &[
    ("youtube.com", "YouTube"),
    ("youtu.be", "YouTube"),
    ("vimeo.com", "Vimeo"),
    ("tiktok.com", "TikTok"),
    ("twitter.com", "X"),
    ("x.com", "X"),
    ("instagram.com", "Instagram"),
    ("soundcloud.com", "SoundCloud"),
    ("twitch.tv", "Twitch"),
];

/// `"<Platform> - <title>"` for well-known hosts.
pub struct PlatformTitleDeriver;

impl PlatformTitleDeriver {
    fn platform(host: &str) -> Option<&'static str> {
        let host = host.trim_start_matches("www.").trim_start_matches("m.");
        PLATFORMS
            .iter()
            .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{}", domain)))
            .map(|(_, name)| *name)
    }
}

impl TitleDeriver for PlatformTitleDeriver {
    fn derive(&self, result: &ExecutionResult) -> String {
        let title = result
            .token(TOKEN_TITLE)
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let host = result
            .token(TOKEN_SOURCE_URL)
            .and_then(|u| url::Url::parse(u.trim()).ok())
            .and_then(|u| u.host_str().map(str::to_string));

        match (host.as_deref().and_then(Self::platform), title, host.as_deref()) {
            (Some(platform), Some(title), _) => format!("{} - {}", platform, title),
            (None, Some(title), _) => title.to_string(),
            (Some(platform), None, _) => format!("{} video", platform),
            (None, None, Some(host)) => host.to_string(),
            (None, None, None) => String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Writes notes to disk; clipboard output goes to stdout.
pub struct FsOutputSink {
    root: PathBuf,
    document: Option<PathBuf>,
}

impl FsOutputSink {
    pub fn new(root: impl Into<PathBuf>, document: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            document,
        }
    }

    async fn write_note(&self, folder: &str, title: &str, text: &str) -> anyhow::Result<PathBuf> {
        let dir = self.root.join(crate::config::expand_home(folder));
        tokio::fs::create_dir_all(&dir).await?;
        let path = unique_path(&dir, &sanitize_file_name(title));
        tokio::fs::write(&path, text).await?;
        Ok(path)
    }
}

#[async_trait]
impl OutputSink for FsOutputSink {
    async fn deliver(&self, output: &WorkflowOutput) -> anyhow::Result<()> {
        match output.kind {
            OutputKind::NewNote => {
                let path = self
                    .write_note(&output.folder, &output.title, &output.text)
                    .await?;
                tracing::info!(path = %path.display(), "Wrote output note");
            }
            OutputKind::AppendToDocument => {
                let doc = self
                    .document
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("no active document to append to"))?;
                let mut file = tokio::fs::OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(doc)
                    .await?;
                file.write_all(format!("\n\n{}\n", output.text).as_bytes())
                    .await?;
                tracing::info!(path = %doc.display(), "Appended output to document");
            }
            OutputKind::Clipboard => {
                println!("{}", output.text);
            }
        }
        Ok(())
    }
}

/// Strip characters that are not allowed in file names.
pub fn sanitize_file_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' | '^' | '[' | ']' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        "Untitled".to_string()
    } else {
        collapsed
    }
}

/// `<dir>/<name>.md`, or `<name> 1.md`, `<name> 2.md`, … if taken.
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let first = dir.join(format!("{}.md", name));
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|n| dir.join(format!("{} {}.md", name, n)))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => eprintln!("✅ {}", notice.message),
            NoticeLevel::Error => eprintln!("❌ {}", notice.message),
        }
    }
}

/// Host wiring used by the CLI.
pub struct HostOptions {
    pub base_dir: PathBuf,
    pub snapshot: ContextSnapshot,
    pub document: Option<PathBuf>,
    pub audio_extractor: Vec<String>,
    pub dependencies: Arc<dyn DependencySource>,
}

pub fn collaborators(options: HostOptions) -> Collaborators {
    Collaborators {
        prompts: Arc::new(FsPromptLoader::new(options.base_dir.clone())),
        inputs: Arc::new(LocalInputAcquirer::new(
            options.audio_extractor,
            std::env::temp_dir().join("weaver-audio"),
        )),
        context: Arc::new(StaticContextGatherer::new(options.snapshot)),
        output: Arc::new(FsOutputSink::new(options.base_dir, options.document)),
        titles: Arc::new(PlatformTitleDeriver),
        notifier: Arc::new(StderrNotifier),
        dependencies: options.dependencies,
    }
}
