use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::artifact::artifact_fetcher::ArtifactFetcher;
use crate::core::artifact::http_artifact_source::HttpArtifactSource;
use crate::core::client::azure::arm_control_plane::ArmControlPlane;
use crate::core::client::azure::managed_cluster_control_plane::ManagedClusterControlPlane;
use crate::core::client::control_plane_client_trait::ControlPlaneClient;
use crate::core::config::deployer_config::{ControlPlaneBackend, DeployerConfig, TemplateStrategy};
use crate::core::persistence::credentials::credential_entity::CredentialEntity;
use crate::core::persistence::credentials::credential_repository::CredentialRepository;
use crate::core::persistence::workdir::working_directory::WorkingDirectory;
use crate::core::template::external_tool_template_builder::ExternalToolTemplateBuilder;
use crate::core::template::library_template_builder::{LibraryTemplateBuilder, TemplateGenerator};
use crate::core::template::template_builder_trait::TemplateBuilder;
use crate::errors::{DeployerError, DeployerResult};

use super::cluster_orchestrator::{ClusterOrchestrator, ToolDownload};

const TOOL_ARCHIVE: &str = "template-tool.tar.gz";

/// Wire an orchestrator from configuration: credentials, working directory,
/// template strategy and control-plane backend.
pub async fn build_orchestrator(
    config: &DeployerConfig,
    generator: Option<Arc<dyn TemplateGenerator>>,
    cancel: CancellationToken,
) -> DeployerResult<ClusterOrchestrator> {
    config.check()?;

    let creds = CredentialRepository::new(&config.credentials_path).load()?;
    let workdir = WorkingDirectory::create(&config.workdir_root)?;
    info!(
        cluster = %config.cluster.name,
        workdir = %workdir.path().display(),
        strategy = ?config.template_strategy,
        backend = ?config.control_plane,
        "Building orchestrator"
    );

    let builder = template_builder(config, &creds, generator)?;
    let control_plane = control_plane(config, &creds).await?;

    let mut orchestrator =
        ClusterOrchestrator::new(config.cluster.clone(), workdir.clone(), builder, control_plane)
            .with_cancellation(cancel);

    if let (true, Some(url)) = (config.requires_tool_download(), config.tool_url.as_ref()) {
        let fetcher = ArtifactFetcher::new(
            Arc::new(HttpArtifactSource::default()),
            workdir.join(TOOL_ARCHIVE),
            workdir.path(),
            config.tool_binary_name.as_str(),
        )
        .with_base_delay(config.retry_base_delay);

        orchestrator = orchestrator.with_tool_download(ToolDownload {
            fetcher,
            url: url.clone(),
            checksum: config.tool_checksum.clone().unwrap_or_default(),
            max_attempts: config.download_attempts,
        });
    }

    if let Some(path) = &config.existing_kubeconfig {
        info!(path = %path.display(), "Using inherited kubeconfig until one is exported");
        orchestrator = orchestrator.with_inherited_config(path.clone());
    }

    Ok(orchestrator)
}

fn template_builder(
    config: &DeployerConfig,
    creds: &CredentialEntity,
    generator: Option<Arc<dyn TemplateGenerator>>,
) -> DeployerResult<Arc<dyn TemplateBuilder>> {
    match config.template_strategy {
        TemplateStrategy::ExternalTool => Ok(Arc::new(ExternalToolTemplateBuilder::new(
            creds.clone(),
            config.api_model_path.clone(),
            config.tool_binary_name.as_str(),
        ))),
        TemplateStrategy::Library => {
            let generator = generator.ok_or_else(|| {
                DeployerError::Configuration(
                    "library template strategy needs an in-process generator".into(),
                )
            })?;
            Ok(Arc::new(LibraryTemplateBuilder::new(
                creds.clone(),
                config.api_model_path.clone(),
                generator,
            )))
        }
    }
}

async fn control_plane(
    config: &DeployerConfig,
    creds: &CredentialEntity,
) -> DeployerResult<Arc<dyn ControlPlaneClient>> {
    Ok(match config.control_plane {
        ControlPlaneBackend::Arm => Arc::new(ArmControlPlane::connect(config, creds).await?),
        ControlPlaneBackend::ManagedCluster => {
            Arc::new(ManagedClusterControlPlane::connect(config, creds).await?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::cluster_spec::ClusterSpec;

    #[tokio::test]
    async fn library_strategy_without_generator_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let creds_path = dir.path().join("creds.toml");
        std::fs::write(
            &creds_path,
            "[Creds]\nClientID = \"id\"\nClientSecret = \"secret\"\nTenantID = \"t\"\nSubscriptionID = \"s\"\n",
        )
        .unwrap();

        let mut config = DeployerConfig::new(ClusterSpec::new("kt-1", "azureuser"), &creds_path);
        config.workdir_root = dir.path().to_path_buf();
        config.template_strategy = TemplateStrategy::Library;

        let err = build_orchestrator(&config, None, CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DeployerError::Configuration(_)));
    }

    #[tokio::test]
    async fn unreadable_credentials_fail_before_any_remote_call() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DeployerConfig::new(
            ClusterSpec::new("kt-1", "azureuser"),
            dir.path().join("missing.toml"),
        );
        config.workdir_root = dir.path().to_path_buf();

        let err = build_orchestrator(&config, None, CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DeployerError::Credential(_)));
    }
}
