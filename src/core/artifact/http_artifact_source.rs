use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::errors::{classify_status, DeployerError, DeployerResult, RemoteCall};

use super::artifact_source_trait::ArtifactSource;

/// Streams an HTTP(S) download straight to disk.
pub struct HttpArtifactSource {
    client: Client,
}

impl Default for HttpArtifactSource {
    fn default() -> Self {
        Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

impl HttpArtifactSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ArtifactSource for HttpArtifactSource {
    async fn download(&self, url: &str, dest: &Path) -> DeployerResult<()> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DeployerError::TransientNetwork(format!("url={} failed: {}", url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(status, &body, RemoteCall::Other));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = resp.bytes_stream();
        let mut written = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                DeployerError::TransientNetwork(format!("url={} interrupted: {}", url, e))
            })?;
            file.write_all(&chunk).await?;
            written += chunk.len();
        }

        file.flush().await?;
        file.sync_all().await?;

        debug!(url, bytes = written, dest = %dest.display(), "Download finished");
        Ok(())
    }
}
