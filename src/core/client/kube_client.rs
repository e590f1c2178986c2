use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tracing::debug;

use crate::errors::{DeployerError, DeployerResult};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Creates a Kubernetes client from the kubeconfig exported after deploy.
pub async fn build_kube_client(kubeconfig: &Path) -> DeployerResult<Client> {
    let raw = Kubeconfig::read_from(kubeconfig).map_err(|e| {
        DeployerError::Liveness(format!(
            "failed to read kubeconfig {}: {}",
            kubeconfig.display(),
            e
        ))
    })?;

    let mut config = Config::from_custom_kubeconfig(raw, &KubeConfigOptions::default())
        .await
        .map_err(|e| DeployerError::Liveness(format!("failed to load kubeconfig: {}", e)))?;
    config.connect_timeout = Some(CONNECT_TIMEOUT);
    config.read_timeout = Some(READ_TIMEOUT);

    let client = Client::try_from(config)
        .map_err(|e| DeployerError::Liveness(format!("failed to create client: {}", e)))?;

    debug!(path = %kubeconfig.display(), "Kubernetes client initialized");
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreadable_kubeconfig_is_liveness_error() {
        let err = build_kube_client(Path::new("/nonexistent/kubeconfig.json"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DeployerError::Liveness(_)));
    }

    #[tokio::test]
    async fn garbage_kubeconfig_is_liveness_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubeconfig.json");
        std::fs::write(&path, "::: not yaml :::").unwrap();

        let err = build_kube_client(&path).await.err().unwrap();
        assert!(matches!(err, DeployerError::Liveness(_)));
    }
}
