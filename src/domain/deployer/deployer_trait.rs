use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::DeployerResult;

/// Lifecycle contract the test harness drives, one implementation per provider.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Bring the cluster up and export its access config. Fails as a whole.
    async fn up(&mut self) -> DeployerResult<()>;

    /// Request teardown of everything the cluster owns.
    async fn down(&mut self) -> DeployerResult<()>;

    /// `Ok` when the cluster answers and its nodes are ready.
    async fn is_up(&self) -> DeployerResult<()>;

    /// Prepare the environment for a test run against an existing cluster.
    async fn test_setup(&mut self) -> DeployerResult<()>;

    async fn dump_cluster_logs(&self, local_path: &Path, remote_path: &str) -> DeployerResult<()>;

    async fn get_cluster_created(&self, name: &str) -> DeployerResult<DateTime<Utc>>;
}
