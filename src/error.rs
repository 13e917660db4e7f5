// Weaver — Run-time error taxonomy

use thiserror::Error;

/// Every failure an action or workflow run can hit.
///
/// None of these escape a workflow run: the action executor and the
/// dependency resolver fold them into a failed `ExecutionResult`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeaveError {
    /// Missing provider, model, credential or endpoint. Raised before any call.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Empty prompt, missing input file, and similar caller mistakes.
    #[error("validation error: {0}")]
    Validation(String),
    /// Network or HTTP failure.
    #[error("transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },
    /// The selected provider/model cannot perform the requested operation.
    #[error("capability error: {0}")]
    Capability(String),
    #[error("dependency error: {0}")]
    Graph(#[from] GraphError),
}

impl WeaveError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn capability(msg: impl Into<String>) -> Self {
        Self::Capability(msg.into())
    }

    /// Non-success HTTP status; the message embeds both status and body.
    pub fn http(status: u16, body: impl AsRef<str>) -> Self {
        Self::Transport {
            status: Some(status),
            message: format!("provider API error ({}): {}", status, body.as_ref()),
        }
    }
}

impl From<reqwest::Error> for WeaveError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for WeaveError {
    fn from(e: serde_json::Error) -> Self {
        Self::Transport {
            status: None,
            message: format!("malformed provider response: {}", e),
        }
    }
}

/// Problems in the dependency graph between workflows.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("circular dependency: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },
    #[error("workflow '{id}' (required by '{referenced_by}') not found")]
    NotFound { id: String, referenced_by: String },
}
