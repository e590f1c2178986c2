use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::artifact::artifact_fetcher::ArtifactFetcher;
use crate::core::client::control_plane_client_trait::ControlPlaneClient;
use crate::core::client::kube_client::build_kube_client;
use crate::core::client::nodes::{check_nodes_ready, fetch_nodes, NodeSummary};
use crate::core::config::cluster_spec::ClusterSpec;
use crate::core::persistence::workdir::working_directory::WorkingDirectory;
use crate::core::template::template_builder_trait::{BuildContext, TemplateBuilder};
use crate::errors::{DeployerError, DeployerResult, Stage};

use super::cluster_state::ClusterState;
use super::deployer_trait::Deployer;

pub const NODES_DUMP_FILE: &str = "nodes.json";

/// Generator download performed at the start of `up`.
pub struct ToolDownload {
    pub fetcher: ArtifactFetcher,
    pub url: String,
    pub checksum: String,
    pub max_attempts: u32,
}

/// Drives one cluster through its lifecycle against the injected collaborators.
pub struct ClusterOrchestrator {
    spec: ClusterSpec,
    workdir: WorkingDirectory,
    builder: Arc<dyn TemplateBuilder>,
    control_plane: Arc<dyn ControlPlaneClient>,
    tool: Option<ToolDownload>,
    cancel: CancellationToken,
    history: Vec<ClusterState>,
    exported_config: Option<PathBuf>,
    inherited_config: Option<PathBuf>,
}

impl ClusterOrchestrator {
    pub fn new(
        spec: ClusterSpec,
        workdir: WorkingDirectory,
        builder: Arc<dyn TemplateBuilder>,
        control_plane: Arc<dyn ControlPlaneClient>,
    ) -> Self {
        Self {
            spec,
            workdir,
            builder,
            control_plane,
            tool: None,
            cancel: CancellationToken::new(),
            history: vec![ClusterState::Initialized],
            exported_config: None,
            inherited_config: None,
        }
    }

    pub fn with_tool_download(mut self, tool: ToolDownload) -> Self {
        self.tool = Some(tool);
        self
    }

    /// Token that aborts the deployment wait when cancelled.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Config of a cluster brought up by an earlier run, used until this run exports its own.
    pub fn with_inherited_config(mut self, path: PathBuf) -> Self {
        self.inherited_config = Some(path);
        self
    }

    pub fn spec(&self) -> &ClusterSpec {
        &self.spec
    }

    pub fn workdir(&self) -> &WorkingDirectory {
        &self.workdir
    }

    pub fn state(&self) -> ClusterState {
        self.history
            .last()
            .copied()
            .unwrap_or(ClusterState::Initialized)
    }

    pub fn state_history(&self) -> &[ClusterState] {
        &self.history
    }

    /// Config exported by this orchestrator. Callers publish it as `KUBECONFIG`.
    pub fn exported_config(&self) -> Option<&Path> {
        self.exported_config.as_deref()
    }

    fn transition(&mut self, next: ClusterState) {
        info!(
            cluster = %self.spec.name,
            from = %self.state(),
            to = %next,
            "Cluster state changed"
        );
        self.history.push(next);
    }

    async fn fetch_tool(&self) -> DeployerResult<Option<PathBuf>> {
        match &self.tool {
            Some(tool) => {
                let path = tool
                    .fetcher
                    .fetch(&tool.url, &tool.checksum, tool.max_attempts)
                    .await?;
                Ok(Some(path))
            }
            None => Ok(None),
        }
    }

    fn export_config(&mut self, path: PathBuf) {
        info!(path = %path.display(), "Cluster access config exported");
        self.exported_config = Some(path);
    }

    fn require_config(&self) -> DeployerResult<&Path> {
        self.exported_config
            .as_deref()
            .or(self.inherited_config.as_deref())
            .ok_or_else(|| DeployerError::Liveness("no cluster access config has been exported".into()))
    }
}

#[async_trait]
impl Deployer for ClusterOrchestrator {
    async fn up(&mut self) -> DeployerResult<()> {
        let rg = self.spec.resource_group.clone();
        let name = self.spec.name.clone();
        info!(cluster = %name, group = %rg, location = %self.spec.location, "Bringing cluster up");

        self.workdir
            .ensure_exists()
            .map_err(|e| e.at(Stage::PrepareWorkdir))?;

        let tool_path = self.fetch_tool().await.map_err(|e| e.at(Stage::FetchTool))?;

        let templates = self
            .builder
            .build(
                &self.spec,
                BuildContext {
                    workdir: &self.workdir,
                    tool_path: tool_path.as_deref(),
                },
            )
            .await
            .map_err(|e| e.at(Stage::BuildTemplates))?;
        self.transition(ClusterState::TemplatesReady);

        let tags = (!self.spec.tags.is_empty()).then_some(&self.spec.tags);
        self.control_plane
            .ensure_resource_group(&rg, &self.spec.location, tags)
            .await
            .map_err(|e| e.at(Stage::EnsureResourceGroup))?;
        self.transition(ClusterState::GroupEnsured);

        self.control_plane
            .validate_deployment(&rg, &name, &templates.template, &templates.parameters)
            .await
            .map_err(|e| e.at(Stage::ValidateDeployment))?;
        self.transition(ClusterState::Validated);

        let result = self
            .control_plane
            .deploy_template(
                &rg,
                &name,
                &templates.template,
                &templates.parameters,
                self.cancel.clone(),
            )
            .await
            .map_err(|e| e.at(Stage::DeployTemplate))?;
        debug!(deployment = %result.name, state = ?result.state, "Deployment finished");
        self.transition(ClusterState::Deployed);

        let kubeconfig = self
            .workdir
            .locate_kubeconfig()
            .map_err(|e| e.at(Stage::ExportConfig))?;
        self.export_config(kubeconfig);
        self.transition(ClusterState::ConfigExported);

        Ok(())
    }

    async fn down(&mut self) -> DeployerResult<()> {
        let rg = self.spec.resource_group.clone();
        info!(group = %rg, "Tearing cluster down");

        self.control_plane
            .delete_resource_group(&rg)
            .await
            .map_err(|e| e.at(Stage::DeleteResourceGroup))?;
        self.transition(ClusterState::GroupDeleted);
        Ok(())
    }

    async fn is_up(&self) -> DeployerResult<()> {
        let config = self.require_config()?;
        let client = build_kube_client(config).await?;
        let nodes = fetch_nodes(&client).await?;
        check_nodes_ready(&nodes)?;

        info!(nodes = nodes.len(), "Cluster is up");
        Ok(())
    }

    async fn test_setup(&mut self) -> DeployerResult<()> {
        if self.exported_config.is_some() {
            return Ok(());
        }

        match self.workdir.locate_kubeconfig() {
            Ok(path) => self.export_config(path),
            Err(e) => match self.inherited_config.clone() {
                Some(path) => self.export_config(path),
                None => debug!(error = %e, "No kubeconfig to export"),
            },
        }
        Ok(())
    }

    async fn dump_cluster_logs(&self, local_path: &Path, remote_path: &str) -> DeployerResult<()> {
        let config = self.require_config()?;
        let client = build_kube_client(config).await?;
        let nodes = fetch_nodes(&client).await?;

        let summaries: Vec<NodeSummary> = nodes.iter().map(NodeSummary::from).collect();
        tokio::fs::create_dir_all(local_path).await?;
        let dest = local_path.join(NODES_DUMP_FILE);
        tokio::fs::write(&dest, serde_json::to_vec_pretty(&summaries)?).await?;

        info!(path = %dest.display(), nodes = summaries.len(), "Node state dumped");
        if !remote_path.is_empty() {
            warn!(remote = %remote_path, "Remote log upload is not supported; skipping");
        }
        Ok(())
    }

    async fn get_cluster_created(&self, name: &str) -> DeployerResult<DateTime<Utc>> {
        self.control_plane
            .deployment_created_at(&self.spec.resource_group, name)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::{json, Map};

    use super::*;
    use crate::core::artifact::archive::tests::tarball;
    use crate::core::artifact::artifact_source_trait::ArtifactSource;
    use crate::core::client::control_plane_client_trait::{
        DeploymentResult, ProvisioningState, ResourceGroup, Tags, ValidationResult,
    };
    use crate::core::template::template_builder_trait::GeneratedTemplates;
    use crate::core::template::template_documents::{DeploymentParameters, DeploymentTemplate};

    /// Writes a kubeconfig and returns fixed documents.
    struct StubBuilder {
        write_kubeconfig: bool,
        fail: bool,
        tool_paths: Mutex<Vec<Option<PathBuf>>>,
    }

    impl StubBuilder {
        fn new() -> Self {
            Self {
                write_kubeconfig: true,
                fail: false,
                tool_paths: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TemplateBuilder for StubBuilder {
        async fn build(
            &self,
            spec: &ClusterSpec,
            ctx: BuildContext<'_>,
        ) -> DeployerResult<GeneratedTemplates> {
            self.tool_paths
                .lock()
                .unwrap()
                .push(ctx.tool_path.map(Path::to_path_buf));
            if self.fail {
                return Err(DeployerError::Generation("generator crashed".into()));
            }
            if self.write_kubeconfig {
                let dir = ctx.workdir.kubeconfig_dir();
                std::fs::create_dir_all(&dir)?;
                std::fs::write(dir.join(format!("kubeconfig.{}.json", spec.location)), "{}")?;
            }

            let mut params = Map::new();
            params.insert("location".into(), json!({"value": spec.location}));
            Ok(GeneratedTemplates {
                template: DeploymentTemplate::from_value(json!({"resources": []}))?,
                parameters: DeploymentParameters::from_values(params),
            })
        }
    }

    /// Records every call in order.
    #[derive(Default)]
    struct RecordingControlPlane {
        calls: Mutex<Vec<String>>,
        reject_validation: bool,
    }

    impl RecordingControlPlane {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ControlPlaneClient for RecordingControlPlane {
        async fn ensure_resource_group(
            &self,
            name: &str,
            location: &str,
            tags: Option<&Tags>,
        ) -> DeployerResult<ResourceGroup> {
            self.record(format!("ensure:{}:{}", name, location));
            Ok(ResourceGroup {
                name: name.to_string(),
                location: location.to_string(),
                tags: tags.cloned().unwrap_or_default(),
            })
        }

        async fn validate_deployment(
            &self,
            resource_group: &str,
            deployment_name: &str,
            _template: &DeploymentTemplate,
            _parameters: &DeploymentParameters,
        ) -> DeployerResult<ValidationResult> {
            self.record(format!("validate:{}:{}", resource_group, deployment_name));
            if self.reject_validation {
                return Err(DeployerError::TemplateInvalid("InvalidTemplate".into()));
            }
            Ok(ValidationResult {
                provisioning_state: Some("Succeeded".into()),
            })
        }

        async fn deploy_template(
            &self,
            resource_group: &str,
            deployment_name: &str,
            _template: &DeploymentTemplate,
            _parameters: &DeploymentParameters,
            _cancel: CancellationToken,
        ) -> DeployerResult<DeploymentResult> {
            self.record(format!("deploy:{}:{}", resource_group, deployment_name));
            Ok(DeploymentResult {
                name: deployment_name.to_string(),
                state: ProvisioningState::Succeeded,
                timestamp: None,
                outputs: None,
            })
        }

        async fn delete_resource_group(&self, name: &str) -> DeployerResult<()> {
            self.record(format!("delete:{}", name));
            Ok(())
        }

        async fn deployment_created_at(
            &self,
            resource_group: &str,
            deployment_name: &str,
        ) -> DeployerResult<DateTime<Utc>> {
            self.record(format!("created:{}:{}", resource_group, deployment_name));
            Ok(DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc))
        }
    }

    fn spec() -> ClusterSpec {
        let mut spec = ClusterSpec::new("kt-1", "azureuser");
        spec.agent_count = 2;
        spec
    }

    fn orchestrator(
        root: &Path,
        builder: Arc<StubBuilder>,
        plane: Arc<RecordingControlPlane>,
    ) -> ClusterOrchestrator {
        let workdir = WorkingDirectory::create(root).unwrap();
        ClusterOrchestrator::new(spec(), workdir, builder, plane)
    }

    #[tokio::test]
    async fn up_walks_every_state_and_down_deletes_once() {
        let root = tempfile::tempdir().unwrap();
        let plane = Arc::new(RecordingControlPlane::default());
        let mut orch = orchestrator(root.path(), Arc::new(StubBuilder::new()), plane.clone());

        orch.up().await.unwrap();

        assert_eq!(
            orch.state_history(),
            &[
                ClusterState::Initialized,
                ClusterState::TemplatesReady,
                ClusterState::GroupEnsured,
                ClusterState::Validated,
                ClusterState::Deployed,
                ClusterState::ConfigExported,
            ]
        );
        assert_eq!(
            plane.calls(),
            vec![
                "ensure:kt-1-rg:westus2",
                "validate:kt-1-rg:kt-1",
                "deploy:kt-1-rg:kt-1",
            ]
        );
        let exported = orch.exported_config().unwrap();
        assert!(exported.starts_with(orch.workdir().kubeconfig_dir()));

        orch.down().await.unwrap();
        let deletes: Vec<String> = plane
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("delete:"))
            .collect();
        assert_eq!(deletes, vec!["delete:kt-1-rg"]);
        assert_eq!(orch.state(), ClusterState::GroupDeleted);
    }

    #[tokio::test]
    async fn rejected_validation_never_deploys() {
        let root = tempfile::tempdir().unwrap();
        let plane = Arc::new(RecordingControlPlane {
            reject_validation: true,
            ..Default::default()
        });
        let mut orch = orchestrator(root.path(), Arc::new(StubBuilder::new()), plane.clone());

        let err = orch.up().await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::ValidateDeployment));
        assert!(matches!(err.root(), DeployerError::TemplateInvalid(_)));
        assert!(!plane.calls().iter().any(|c| c.starts_with("deploy:")));
        assert_eq!(orch.state(), ClusterState::GroupEnsured);
        assert!(orch.exported_config().is_none());
    }

    #[tokio::test]
    async fn build_failure_touches_no_remote_state() {
        let root = tempfile::tempdir().unwrap();
        let plane = Arc::new(RecordingControlPlane::default());
        let builder = Arc::new(StubBuilder {
            fail: true,
            ..StubBuilder::new()
        });
        let mut orch = orchestrator(root.path(), builder, plane.clone());

        let err = orch.up().await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::BuildTemplates));
        assert!(plane.calls().is_empty());
        assert_eq!(orch.state_history(), &[ClusterState::Initialized]);
    }

    #[tokio::test]
    async fn missing_kubeconfig_fails_export_stage() {
        let root = tempfile::tempdir().unwrap();
        let plane = Arc::new(RecordingControlPlane::default());
        let builder = Arc::new(StubBuilder {
            write_kubeconfig: false,
            ..StubBuilder::new()
        });
        let mut orch = orchestrator(root.path(), builder, plane);

        let err = orch.up().await.unwrap_err();

        assert_eq!(err.stage(), Some(Stage::ExportConfig));
        assert_eq!(orch.state(), ClusterState::Deployed);
    }

    #[tokio::test]
    async fn liveness_queries_need_an_exported_config() {
        let root = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            root.path(),
            Arc::new(StubBuilder::new()),
            Arc::new(RecordingControlPlane::default()),
        );

        assert!(matches!(orch.is_up().await, Err(DeployerError::Liveness(_))));
        assert!(matches!(
            orch.dump_cluster_logs(root.path(), "").await,
            Err(DeployerError::Liveness(_))
        ));
    }

    #[tokio::test]
    async fn test_setup_exports_existing_kubeconfig() {
        let root = tempfile::tempdir().unwrap();
        let mut orch = orchestrator(
            root.path(),
            Arc::new(StubBuilder::new()),
            Arc::new(RecordingControlPlane::default()),
        );

        orch.test_setup().await.unwrap();
        assert!(orch.exported_config().is_none());

        let dir = orch.workdir().kubeconfig_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("kubeconfig.westus2.json"), "{}").unwrap();

        orch.test_setup().await.unwrap();
        assert_eq!(
            orch.exported_config(),
            Some(dir.join("kubeconfig.westus2.json").as_path())
        );
    }

    #[tokio::test]
    async fn inherited_config_serves_a_fresh_run() {
        let root = tempfile::tempdir().unwrap();
        let inherited = root.path().join("kubeconfig.json");
        std::fs::write(&inherited, "{}").unwrap();
        let mut orch = orchestrator(
            root.path(),
            Arc::new(StubBuilder::new()),
            Arc::new(RecordingControlPlane::default()),
        )
        .with_inherited_config(inherited.clone());

        // The empty file is found, then fails client construction.
        match orch.is_up().await {
            Err(DeployerError::Liveness(m)) => {
                assert!(m.contains("kubeconfig"), "{}", m);
                assert!(!m.contains("no cluster access config"), "{}", m);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        orch.test_setup().await.unwrap();
        assert_eq!(orch.exported_config(), Some(inherited.as_path()));
    }

    #[tokio::test]
    async fn own_kubeconfig_beats_the_inherited_one() {
        let root = tempfile::tempdir().unwrap();
        let inherited = root.path().join("kubeconfig.json");
        std::fs::write(&inherited, "{}").unwrap();
        let mut orch = orchestrator(
            root.path(),
            Arc::new(StubBuilder::new()),
            Arc::new(RecordingControlPlane::default()),
        )
        .with_inherited_config(inherited.clone());

        orch.up().await.unwrap();
        let own = orch.exported_config().unwrap().to_path_buf();
        assert_ne!(own, inherited);

        orch.test_setup().await.unwrap();
        assert_eq!(orch.exported_config(), Some(own.as_path()));
    }

    #[tokio::test]
    async fn cluster_created_asks_the_configured_group() {
        let root = tempfile::tempdir().unwrap();
        let plane = Arc::new(RecordingControlPlane::default());
        let orch = orchestrator(root.path(), Arc::new(StubBuilder::new()), plane.clone());

        let created = orch.get_cluster_created("kt-1").await.unwrap();

        assert_eq!(created.to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(plane.calls(), vec!["created:kt-1-rg:kt-1"]);
    }

    struct TarballSource(Vec<u8>);

    #[async_trait]
    impl ArtifactSource for TarballSource {
        async fn download(&self, _url: &str, dest: &Path) -> DeployerResult<()> {
            tokio::fs::write(dest, &self.0).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn downloaded_tool_is_handed_to_the_builder() {
        let root = tempfile::tempdir().unwrap();
        let workdir = WorkingDirectory::create(root.path()).unwrap();
        let source = Arc::new(TarballSource(tarball(&[(
            "acs-engine-v0.1/acs-engine",
            0o755,
            b"#!/bin/sh\n",
        )])));
        let fetcher = ArtifactFetcher::new(
            source,
            workdir.join("acs-engine.tar.gz"),
            workdir.path(),
            "acs-engine",
        );

        let builder = Arc::new(StubBuilder::new());
        let mut orch = ClusterOrchestrator::new(
            spec(),
            workdir.clone(),
            builder.clone(),
            Arc::new(RecordingControlPlane::default()),
        )
        .with_tool_download(ToolDownload {
            fetcher,
            url: "https://example.invalid/acs-engine.tar.gz".into(),
            checksum: String::new(),
            max_attempts: 1,
        });

        orch.up().await.unwrap();

        let seen = builder.tool_paths.lock().unwrap().clone();
        assert_eq!(seen, vec![Some(workdir.join("acs-engine"))]);
    }
}
