use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::core::config::cluster_spec::ClusterSpec;
use crate::core::persistence::credentials::credential_entity::CredentialEntity;
use crate::errors::{DeployerError, DeployerResult};

use super::api_model_entity::ApiModel;
use super::template_documents::DeploymentParameters;

/// Source of the API model: a user file, or synthesised from the spec.
#[derive(Debug, Clone)]
pub struct ApiModelLoader {
    credentials: CredentialEntity,
    api_model_path: Option<PathBuf>,
}

impl ApiModelLoader {
    pub fn new(credentials: CredentialEntity, api_model_path: Option<PathBuf>) -> Self {
        Self {
            credentials,
            api_model_path,
        }
    }

    /// Load or synthesise the model, with the spec's overrides applied.
    pub async fn resolve(&self, spec: &ClusterSpec) -> DeployerResult<ApiModel> {
        match &self.api_model_path {
            Some(path) => {
                info!(path = %path.display(), "Using provided API model");
                let mut model = read_api_model(path).await?;
                model.apply_overrides(spec);
                Ok(model)
            }
            None => Ok(ApiModel::from_spec(spec, &self.credentials)),
        }
    }
}

async fn read_api_model(path: &Path) -> DeployerResult<ApiModel> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        DeployerError::Configuration(format!("error reading API model {}: {}", path.display(), e))
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|e| DeployerError::Parse(format!("API model {}: {}", path.display(), e)))
}

/// Spec values win over generator defaults in the parameters, too.
pub fn apply_parameter_overrides(params: &mut DeploymentParameters, spec: &ClusterSpec) {
    params.override_value("location", Value::String(spec.location.clone()));
}
