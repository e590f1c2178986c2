use std::path::Path;

use async_trait::async_trait;

use crate::core::config::cluster_spec::ClusterSpec;
use crate::core::persistence::workdir::working_directory::WorkingDirectory;
use crate::errors::DeployerResult;

use super::template_documents::{DeploymentParameters, DeploymentTemplate};

/// Output of a template build.
#[derive(Debug, Clone)]
pub struct GeneratedTemplates {
    pub template: DeploymentTemplate,
    pub parameters: DeploymentParameters,
}

/// Where a build writes, and the generator binary if one was downloaded.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub workdir: &'a WorkingDirectory,
    pub tool_path: Option<&'a Path>,
}

/// Turns a cluster spec into deployment template + parameters and writes them
/// into the working directory.
#[async_trait]
pub trait TemplateBuilder: Send + Sync {
    async fn build(
        &self,
        spec: &ClusterSpec,
        ctx: BuildContext<'_>,
    ) -> DeployerResult<GeneratedTemplates>;
}
