use std::fmt;

use http::StatusCode;
use thiserror::Error;

/// Lifecycle step that failed while bringing a cluster up or down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PrepareWorkdir,
    FetchTool,
    BuildTemplates,
    EnsureResourceGroup,
    ValidateDeployment,
    DeployTemplate,
    ExportConfig,
    DeleteResourceGroup,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::PrepareWorkdir => "prepare working directory",
            Stage::FetchTool => "fetch template tool",
            Stage::BuildTemplates => "build templates",
            Stage::EnsureResourceGroup => "ensure resource group",
            Stage::ValidateDeployment => "validate deployment",
            Stage::DeployTemplate => "deploy template",
            Stage::ExportConfig => "export cluster access config",
            Stage::DeleteResourceGroup => "delete resource group",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DeployerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    #[error("Integrity error: expected checksum {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    #[error("Template generation failed: {0}")]
    Generation(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Template invalid: {0}")]
    TemplateInvalid(String),

    #[error("Deployment failed: {0}")]
    DeploymentFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Cluster is not reachable: {0}")]
    Liveness(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to {stage}: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<DeployerError>,
    },
}

pub type DeployerResult<T> = Result<T, DeployerError>;

impl DeployerError {
    /// Wrap an error with the lifecycle step it came from.
    pub fn at(self, stage: Stage) -> Self {
        DeployerError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// Only transport-level failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeployerError::TransientNetwork(_) => true,
            DeployerError::Stage { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Innermost error, skipping stage wrappers.
    pub fn root(&self) -> &DeployerError {
        match self {
            DeployerError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            DeployerError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DeployerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DeployerError::Parse(err.to_string())
        } else {
            DeployerError::TransientNetwork(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DeployerError {
    fn from(err: serde_json::Error) -> Self {
        DeployerError::Parse(err.to_string())
    }
}

/// Which remote call produced a non-success status; a 400 means different
/// things for a dry-run validation and for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCall {
    Validation,
    Other,
}

/// Map a non-success HTTP status from the control plane to the error taxonomy,
/// keeping the remote body as the diagnostic.
pub fn classify_status(status: StatusCode, body: &str, call: RemoteCall) -> DeployerError {
    let detail = if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body.trim())
    };

    match status {
        StatusCode::BAD_REQUEST => match call {
            RemoteCall::Validation => DeployerError::TemplateInvalid(detail),
            RemoteCall::Other => DeployerError::DeploymentFailed(detail),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DeployerError::Authentication(detail),
        StatusCode::NOT_FOUND => DeployerError::NotFound(detail),
        StatusCode::CONFLICT | StatusCode::TOO_MANY_REQUESTS => DeployerError::Conflict(detail),
        s if s.is_server_error() || s == StatusCode::REQUEST_TIMEOUT => {
            DeployerError::TransientNetwork(detail)
        }
        _ => DeployerError::DeploymentFailed(detail),
    }
}
