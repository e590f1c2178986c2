use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::template::template_documents::{DeploymentParameters, DeploymentTemplate};
use crate::errors::DeployerResult;

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGroup {
    pub name: String,
    pub location: String,
    pub tags: Tags,
}

/// Remote lifecycle state of a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningState {
    Accepted,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Other(String),
}

impl ProvisioningState {
    pub fn from_code(code: &str) -> Self {
        match code {
            "Accepted" | "Created" | "Creating" => ProvisioningState::Accepted,
            "Running" | "Updating" | "Deploying" => ProvisioningState::Running,
            "Succeeded" => ProvisioningState::Succeeded,
            "Failed" => ProvisioningState::Failed,
            "Canceled" | "Cancelled" => ProvisioningState::Canceled,
            other => ProvisioningState::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisioningState::Succeeded | ProvisioningState::Failed | ProvisioningState::Canceled
        )
    }
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DeploymentResult {
    pub name: String,
    pub state: ProvisioningState,
    pub timestamp: Option<DateTime<Utc>>,
    pub outputs: Option<Value>,
}

/// Authenticated handle to the cloud control plane. Implementations hold
/// credentials fixed at construction and are shared read-only.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// Create or update a group; existing tags survive a re-ensure.
    async fn ensure_resource_group(
        &self,
        name: &str,
        location: &str,
        tags: Option<&Tags>,
    ) -> DeployerResult<ResourceGroup>;

    /// Dry run. Must succeed before `deploy_template` is called.
    async fn validate_deployment(
        &self,
        resource_group: &str,
        deployment_name: &str,
        template: &DeploymentTemplate,
        parameters: &DeploymentParameters,
    ) -> DeployerResult<ValidationResult>;

    /// Submit in incremental mode and wait for a terminal state.
    async fn deploy_template(
        &self,
        resource_group: &str,
        deployment_name: &str,
        template: &DeploymentTemplate,
        parameters: &DeploymentParameters,
        cancel: CancellationToken,
    ) -> DeployerResult<DeploymentResult>;

    /// Request deletion; does not wait for it to finish.
    async fn delete_resource_group(&self, name: &str) -> DeployerResult<()>;

    async fn deployment_created_at(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> DeployerResult<DateTime<Utc>>;
}

/// Union of tag sets; on a key clash the existing value is kept.
pub fn merge_tags(existing: &Tags, requested: Option<&Tags>) -> Tags {
    let mut merged = requested.cloned().unwrap_or_default();
    merged.extend(existing.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}
