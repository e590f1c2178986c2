use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::core::client::control_plane_client_trait::{
    ControlPlaneClient, DeploymentResult, ResourceGroup, Tags, ValidationResult,
};
use crate::core::config::deployer_config::DeployerConfig;
use crate::core::persistence::credentials::credential_entity::CredentialEntity;
use crate::core::template::template_documents::{DeploymentParameters, DeploymentTemplate};
use crate::errors::{DeployerError, DeployerResult};

use super::arm_control_plane::{connect_http, poll_settings};
use super::arm_http::ArmHttp;
use super::poller::PollSettings;
use super::{managed_clusters, resource_groups};

/// Provisions through the managed-cluster resource instead of a template
/// deployment. The template document is the managed-cluster body.
pub struct ManagedClusterControlPlane {
    http: ArmHttp,
    poll: PollSettings,
}

impl ManagedClusterControlPlane {
    pub fn new(http: ArmHttp, poll: PollSettings) -> Self {
        Self { http, poll }
    }

    pub async fn connect(config: &DeployerConfig, creds: &CredentialEntity) -> DeployerResult<Self> {
        let http = connect_http(config, creds).await?;
        Ok(Self::new(http, poll_settings(config)))
    }
}

#[async_trait]
impl ControlPlaneClient for ManagedClusterControlPlane {
    async fn ensure_resource_group(
        &self,
        name: &str,
        location: &str,
        tags: Option<&Tags>,
    ) -> DeployerResult<ResourceGroup> {
        resource_groups::ensure_resource_group(&self.http, name, location, tags).await
    }

    async fn validate_deployment(
        &self,
        _resource_group: &str,
        _deployment_name: &str,
        template: &DeploymentTemplate,
        parameters: &DeploymentParameters,
    ) -> DeployerResult<ValidationResult> {
        managed_clusters::validate(&managed_clusters::cluster_body(template, parameters))
    }

    async fn deploy_template(
        &self,
        resource_group: &str,
        deployment_name: &str,
        template: &DeploymentTemplate,
        parameters: &DeploymentParameters,
        cancel: CancellationToken,
    ) -> DeployerResult<DeploymentResult> {
        let body = managed_clusters::cluster_body(template, parameters);
        managed_clusters::create_or_update(&self.http, resource_group, deployment_name, &body).await?;
        managed_clusters::wait_for_completion(&self.http, resource_group, deployment_name, self.poll, &cancel)
            .await
    }

    async fn delete_resource_group(&self, name: &str) -> DeployerResult<()> {
        resource_groups::delete_resource_group(&self.http, name).await
    }

    async fn deployment_created_at(
        &self,
        _resource_group: &str,
        _deployment_name: &str,
    ) -> DeployerResult<DateTime<Utc>> {
        Err(DeployerError::NotImplemented(
            "creation time is not tracked for managed clusters".into(),
        ))
    }
}
