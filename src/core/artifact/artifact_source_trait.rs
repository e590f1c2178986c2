use std::path::Path;

use async_trait::async_trait;

use crate::errors::DeployerResult;

/// Transport for release archives.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Download `url` into `dest`, replacing whatever was there.
    async fn download(&self, url: &str, dest: &Path) -> DeployerResult<()>;
}
