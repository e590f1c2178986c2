use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::core::client::control_plane_client_trait::{
    ControlPlaneClient, DeploymentResult, ResourceGroup, Tags, ValidationResult,
};
use crate::core::config::deployer_config::DeployerConfig;
use crate::core::persistence::credentials::credential_entity::CredentialEntity;
use crate::core::template::template_documents::{DeploymentParameters, DeploymentTemplate};
use crate::errors::DeployerResult;

use super::arm_http::ArmHttp;
use super::azure_auth::AzureAuthorizer;
use super::poller::PollSettings;
use super::{deployments, resource_groups};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Template deployments through the resource manager REST API.
pub struct ArmControlPlane {
    http: ArmHttp,
    poll: PollSettings,
}

impl ArmControlPlane {
    pub fn new(http: ArmHttp, poll: PollSettings) -> Self {
        Self { http, poll }
    }

    /// Authorize once with the service principal and build the client.
    pub async fn connect(config: &DeployerConfig, creds: &CredentialEntity) -> DeployerResult<Self> {
        let http = connect_http(config, creds).await?;
        Ok(Self::new(http, poll_settings(config)))
    }
}

pub(crate) async fn connect_http(
    config: &DeployerConfig,
    creds: &CredentialEntity,
) -> DeployerResult<ArmHttp> {
    let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
    let auth = AzureAuthorizer::authorize(
        &client,
        &config.active_directory_endpoint,
        &config.resource_manager_endpoint,
        creds,
    )
    .await?;

    Ok(ArmHttp::new(
        client,
        config.resource_manager_endpoint.as_str(),
        creds.subscription_id.as_str(),
        auth,
    ))
}

pub(crate) fn poll_settings(config: &DeployerConfig) -> PollSettings {
    PollSettings {
        interval: config.deploy_poll_interval,
        timeout: config.deploy_timeout,
    }
}

#[async_trait]
impl ControlPlaneClient for ArmControlPlane {
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
        resource_group: &str,
        deployment_name: &str,
        template: &DeploymentTemplate,
        parameters: &DeploymentParameters,
    ) -> DeployerResult<ValidationResult> {
        deployments::validate(&self.http, resource_group, deployment_name, template, parameters).await
    }

    async fn deploy_template(
        &self,
        resource_group: &str,
        deployment_name: &str,
        template: &DeploymentTemplate,
        parameters: &DeploymentParameters,
        cancel: CancellationToken,
    ) -> DeployerResult<DeploymentResult> {
        deployments::submit(&self.http, resource_group, deployment_name, template, parameters).await?;
        deployments::wait_for_completion(&self.http, resource_group, deployment_name, self.poll, &cancel)
            .await
    }

    async fn delete_resource_group(&self, name: &str) -> DeployerResult<()> {
        resource_groups::delete_resource_group(&self.http, name).await
    }

    async fn deployment_created_at(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> DeployerResult<DateTime<Utc>> {
        deployments::created_at(&self.http, resource_group, deployment_name).await
    }
}
