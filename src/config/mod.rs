// Weaver — Token-linked LLM workflows in Rust
// License: Apache-2.0

use crate::error::WeaveError;
use crate::provider::{Capabilities, ProviderAdapterConfig, ProviderKind};
use crate::token;
use crate::workflow::{ActionDefinition, ProviderRef, WorkflowDefinition};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("home directory not found")]
    NoHomeDir,
    #[error("{0}")]
    Invalid(String),
}

impl From<ConfigError> for WeaveError {
    fn from(e: ConfigError) -> Self {
        WeaveError::Configuration(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
    #[serde(default)]
    pub workflows: Vec<WorkflowDefinition>,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_output_folder")]
    pub output_folder: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<usize>,
    /// Extra YAML workflow files are loaded from here.
    #[serde(default)]
    pub workflows_dir: Option<String>,
    /// Command used to pull audio out of a video URL. `{url}` and
    /// `{output}` are substituted.
    #[serde(default)]
    pub audio_extractor: Vec<String>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output_folder: default_output_folder(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            temperature: None,
            max_tokens: None,
            workflows_dir: None,
            audio_extractor: Vec::new(),
        }
    }
}

fn default_output_folder() -> String {
    "Weaver".to_string()
}
fn default_request_timeout() -> u64 {
    120
}
fn default_connect_timeout() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    /// Azure deployment name; unused by plain OpenAI.
    #[serde(default)]
    pub deployment: String,
    #[serde(flatten)]
    pub capabilities: Capabilities,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a JSON file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            let mut config = Config::default();
            config.apply_env_overrides();
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (prefix: WEAVER_)
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WEAVER_DEFAULTS_OUTPUT_FOLDER") {
            self.defaults.output_folder = v;
        }
        if let Ok(v) = std::env::var("WEAVER_DEFAULTS_REQUEST_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.defaults.request_timeout_secs = n;
            }
        }
        for provider in &mut self.providers {
            let prefix = format!("WEAVER_PROVIDERS_{}", env_key(&provider.id));
            if let Ok(v) = std::env::var(format!("{}_API_KEY", prefix)) {
                provider.api_key = v;
            }
            if let Ok(v) = std::env::var(format!("{}_ENDPOINT", prefix)) {
                provider.endpoint = v;
            }
        }
    }

    /// Get the default config file path: ~/.weaver/config.json
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
        Ok(home.join(".weaver").join("config.json"))
    }

    pub fn workflow(&self, id: &str) -> Option<&WorkflowDefinition> {
        self.workflows.iter().find(|w| w.id == id)
    }

    pub fn provider(&self, id: &str) -> Option<&ProviderEntry> {
        self.providers.iter().find(|p| p.id == id)
    }

    /// Build the adapter configuration for one provider/model pair.
    pub fn resolve_provider(&self, reference: &ProviderRef) -> Result<ProviderAdapterConfig, WeaveError> {
        let provider = self.provider(&reference.provider).ok_or_else(|| {
            WeaveError::config(format!("provider '{}' is not configured", reference.provider))
        })?;
        let model = provider
            .models
            .iter()
            .find(|m| m.id == reference.model)
            .ok_or_else(|| {
                WeaveError::config(format!(
                    "model '{}' is not configured for provider '{}'",
                    reference.model, reference.provider
                ))
            })?;

        Ok(ProviderAdapterConfig {
            id: provider.id.clone(),
            name: if provider.name.is_empty() {
                provider.id.clone()
            } else {
                provider.name.clone()
            },
            kind: provider.kind,
            endpoint: provider.endpoint.clone(),
            api_key: provider.api_key.clone(),
            model: model.id.clone(),
            deployment: model.deployment.clone(),
            api_version: provider.api_version.clone(),
            capabilities: model.capabilities,
            request_timeout: Duration::from_secs(self.defaults.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.defaults.connect_timeout_secs),
        })
    }

    /// Load additional workflows from `defaults.workflows_dir`, if set.
    pub fn load_workflow_dir(&mut self) -> anyhow::Result<usize> {
        let Some(dir) = self.defaults.workflows_dir.clone() else {
            return Ok(0);
        };
        let loaded = crate::workflow::parser::load_dir(Path::new(&expand_home(&dir)))?;
        let count = loaded.len();
        self.workflows.extend(loaded);
        Ok(count)
    }

    /// Validate configuration for basic correctness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        let mut provider_ids = HashSet::new();
        for provider in &self.providers {
            if !provider_ids.insert(provider.id.as_str()) {
                problems.push(format!("duplicate provider id '{}'", provider.id));
            }
        }

        let mut workflow_ids = HashSet::new();
        for wf in &self.workflows {
            if !workflow_ids.insert(wf.id.as_str()) {
                problems.push(format!("duplicate workflow id '{}'", wf.id));
            }
            if !token::is_valid_entity_id(&wf.id) {
                problems.push(format!("workflow id '{}' cannot be used in tokens", wf.id));
            }

            let mut action_ids = HashSet::new();
            for action in &wf.actions {
                let id = action.id();
                if !action_ids.insert(id) {
                    problems.push(format!("workflow '{}': duplicate action id '{}'", wf.id, id));
                }
                if !token::is_valid_entity_id(id) {
                    problems.push(format!(
                        "workflow '{}': action id '{}' cannot be used in tokens",
                        wf.id, id
                    ));
                }
                if let Err(e) = self.resolve_provider(action.provider()) {
                    problems.push(format!("workflow '{}', action '{}': {}", wf.id, id, e));
                    continue;
                }
                if let Err(e) = self.check_capability(action) {
                    problems.push(format!("workflow '{}', action '{}': {}", wf.id, id, e));
                }
            }
        }

        if self.providers.iter().all(|p| p.api_key.is_empty()) && !self.providers.is_empty() {
            tracing::warn!("No provider has an API key configured");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("\n")))
        }
    }

    fn check_capability(&self, action: &ActionDefinition) -> Result<(), WeaveError> {
        let cfg = self.resolve_provider(action.provider())?;
        let ok = match action {
            ActionDefinition::Chat(_) => cfg.capabilities.chat,
            ActionDefinition::Transcription(_) => cfg.capabilities.transcription,
        };
        if ok {
            Ok(())
        } else {
            Err(WeaveError::capability(format!(
                "model '{}' of provider '{}' does not support {}",
                cfg.model,
                cfg.id,
                action.kind()
            )))
        }
    }
}

fn env_key(id: &str) -> String {
    id.to_uppercase().replace('-', "_")
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().to_string();
        }
    }
    path.to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
