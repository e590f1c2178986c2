use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::core::config::cluster_spec::ClusterSpec;
use crate::core::persistence::credentials::credential_entity::CredentialEntity;
use crate::core::persistence::workdir::working_directory::WorkingDirectory;
use crate::errors::{DeployerError, DeployerResult};

use super::api_model_entity::ApiModel;
use super::api_model_loader::{apply_parameter_overrides, ApiModelLoader};
use super::template_builder_trait::{BuildContext, GeneratedTemplates, TemplateBuilder};
use super::template_documents::{DeploymentParameters, DeploymentTemplate};

/// Everything an in-process generator produces for one model.
#[derive(Debug, Clone, Default)]
pub struct GeneratedArtifacts {
    pub template: Value,
    /// Parameter entries, without the outer `parameters` wrapper.
    pub parameters: Map<String, Value>,
    /// TLS material keyed by file name.
    pub certificates: BTreeMap<String, String>,
    /// Kubeconfigs keyed by file name.
    pub kubeconfigs: BTreeMap<String, String>,
}

/// In-process template generation library.
pub trait TemplateGenerator: Send + Sync {
    fn generate(&self, model: &ApiModel) -> DeployerResult<GeneratedArtifacts>;
}

pub struct LibraryTemplateBuilder {
    loader: ApiModelLoader,
    generator: Arc<dyn TemplateGenerator>,
}

impl LibraryTemplateBuilder {
    pub fn new(
        credentials: CredentialEntity,
        api_model_path: Option<PathBuf>,
        generator: Arc<dyn TemplateGenerator>,
    ) -> Self {
        Self {
            loader: ApiModelLoader::new(credentials, api_model_path),
            generator,
        }
    }

    async fn persist(
        &self,
        workdir: &WorkingDirectory,
        templates: &GeneratedTemplates,
        artifacts: &GeneratedArtifacts,
    ) -> DeployerResult<()> {
        write_json(&workdir.template_path(), &templates.template.to_value()).await?;
        write_json(&workdir.parameters_path(), &templates.parameters.to_document()).await?;

        for (name, body) in &artifacts.certificates {
            let path = artifact_path(workdir.path(), name)?;
            tokio::fs::write(&path, body).await?;
        }

        if !artifacts.kubeconfigs.is_empty() {
            let dir = workdir.kubeconfig_dir();
            tokio::fs::create_dir_all(&dir).await?;
            for (name, body) in &artifacts.kubeconfigs {
                let path = artifact_path(&dir, name)?;
                tokio::fs::write(&path, body).await?;
            }
        }

        debug!(
            certificates = artifacts.certificates.len(),
            kubeconfigs = artifacts.kubeconfigs.len(),
            "Generated artifacts persisted"
        );
        Ok(())
    }
}

#[async_trait]
impl TemplateBuilder for LibraryTemplateBuilder {
    async fn build(
        &self,
        spec: &ClusterSpec,
        ctx: BuildContext<'_>,
    ) -> DeployerResult<GeneratedTemplates> {
        let model = self.loader.resolve(spec).await?;
        info!(cluster = %spec.name, "Generating deployment templates in-process");

        let artifacts = self.generator.generate(&model)?;

        let template = DeploymentTemplate::from_value(artifacts.template.clone())?;
        let mut parameters = DeploymentParameters::from_values(artifacts.parameters.clone());
        apply_parameter_overrides(&mut parameters, spec);

        let templates = GeneratedTemplates {
            template,
            parameters,
        };
        self.persist(ctx.workdir, &templates, &artifacts).await?;

        Ok(templates)
    }
}

async fn write_json(path: &Path, value: &Value) -> DeployerResult<()> {
    let body = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, body).await?;
    Ok(())
}

/// Artifact names must be plain file names.
fn artifact_path(dir: &Path, name: &str) -> DeployerResult<PathBuf> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(file)), None) => Ok(dir.join(file)),
        _ => Err(DeployerError::Generation(format!(
            "generator produced an invalid artifact name: {}",
            name
        ))),
    }
}
