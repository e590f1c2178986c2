use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::core::config::cluster_spec::ClusterSpec;
use crate::core::persistence::credentials::credential_entity::CredentialEntity;
use crate::core::persistence::workdir::working_directory::WorkingDirectory;
use crate::errors::{DeployerError, DeployerResult};

use super::api_model_entity::ApiModel;
use super::api_model_loader::{apply_parameter_overrides, ApiModelLoader};
use super::template_builder_trait::{BuildContext, GeneratedTemplates, TemplateBuilder};
use super::template_documents::{DeploymentParameters, DeploymentTemplate};

/// Runs an external generator (`<tool> generate <model> --output-directory <dir>`)
/// and reads back the template and parameters it writes.
pub struct ExternalToolTemplateBuilder {
    loader: ApiModelLoader,
    default_tool: PathBuf,
}

impl ExternalToolTemplateBuilder {
    pub fn new(
        credentials: CredentialEntity,
        api_model_path: Option<PathBuf>,
        default_tool: impl Into<PathBuf>,
    ) -> Self {
        Self {
            loader: ApiModelLoader::new(credentials, api_model_path),
            default_tool: default_tool.into(),
        }
    }

    async fn write_api_model(&self, model: &ApiModel, workdir: &WorkingDirectory) -> DeployerResult<PathBuf> {
        let path = workdir.api_model_path();
        let body = serde_json::to_vec_pretty(model)?;
        tokio::fs::write(&path, body).await?;
        debug!(path = %path.display(), "API model written");
        Ok(path)
    }

    async fn run_generator(&self, tool: &Path, model_path: &Path, out_dir: &Path) -> DeployerResult<()> {
        info!(tool = %tool.display(), "Generating deployment templates");

        let output = Command::new(tool)
            .arg("generate")
            .arg(model_path)
            .arg("--output-directory")
            .arg(out_dir)
            .output()
            .await
            .map_err(|e| {
                DeployerError::Generation(format!("failed to run {}: {}", tool.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = %output.status, "Template generator exited with failure");
            return Err(DeployerError::Generation(format!(
                "{} exited with {}: {}",
                tool.display(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl TemplateBuilder for ExternalToolTemplateBuilder {
    async fn build(
        &self,
        spec: &ClusterSpec,
        ctx: BuildContext<'_>,
    ) -> DeployerResult<GeneratedTemplates> {
        let model = self.loader.resolve(spec).await?;
        let model_path = self.write_api_model(&model, ctx.workdir).await?;

        let tool = ctx.tool_path.unwrap_or(self.default_tool.as_path());
        self.run_generator(tool, &model_path, ctx.workdir.path()).await?;

        let template = read_document(&ctx.workdir.template_path())
            .await
            .and_then(|bytes| DeploymentTemplate::parse(&bytes))?;
        let mut parameters = read_document(&ctx.workdir.parameters_path())
            .await
            .and_then(|bytes| DeploymentParameters::parse_document(&bytes))?;

        apply_parameter_overrides(&mut parameters, spec);

        Ok(GeneratedTemplates {
            template,
            parameters,
        })
    }
}

async fn read_document(path: &Path) -> DeployerResult<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|e| {
        DeployerError::Generation(format!("expected output {} missing: {}", path.display(), e))
    })
}
