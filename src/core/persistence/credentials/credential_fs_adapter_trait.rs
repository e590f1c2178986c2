use std::path::Path;

use crate::errors::DeployerResult;

use super::credential_entity::CredentialEntity;

/// Read-only file access for credential documents.
pub trait CredentialFsAdapterTrait: Send + Sync {
    fn read(&self, path: &Path) -> DeployerResult<CredentialEntity>;
}
