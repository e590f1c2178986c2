use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::DeployerResult;

use super::credential_entity::CredentialEntity;
use super::credential_fs_adapter::CredentialFsAdapter;
use super::credential_fs_adapter_trait::CredentialFsAdapterTrait;

/// Loads credentials once; read-only afterwards.
pub struct CredentialRepository {
    path: PathBuf,
    adapter: Box<dyn CredentialFsAdapterTrait>,
}

impl CredentialRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_adapter(path, Box::new(CredentialFsAdapter))
    }

    pub fn with_adapter(path: impl Into<PathBuf>, adapter: Box<dyn CredentialFsAdapterTrait>) -> Self {
        Self {
            path: path.into(),
            adapter,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> DeployerResult<CredentialEntity> {
        let creds = self.adapter.read(&self.path)?;
        debug!(
            path = %self.path.display(),
            subscription = %creds.subscription_id,
            "Loaded credentials"
        );
        Ok(creds)
    }
}
