use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use crate::errors::{DeployerError, DeployerResult};

pub const API_MODEL_FILE: &str = "kubernetes.json";
pub const TEMPLATE_FILE: &str = "azuredeploy.json";
pub const PARAMETERS_FILE: &str = "azuredeploy.parameters.json";
pub const KUBECONFIG_DIR: &str = "kubeconfig";

/// Per-orchestrator scratch directory holding generated templates, extracted
/// tools and kubeconfigs. Never removed here; cleanup belongs to the caller.
#[derive(Debug, Clone)]
pub struct WorkingDirectory {
    root: PathBuf,
}

impl WorkingDirectory {
    /// Create a fresh `acs<uuid>` directory under `parent`.
    pub fn create(parent: &Path) -> DeployerResult<Self> {
        let root = parent.join(format!("acs{}", Uuid::new_v4().simple()));
        Self::open(root)
    }

    /// Use `root` as-is, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> DeployerResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(path = %root.display(), "Working directory ready");
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Re-create the directory if something removed it underneath us.
    pub fn ensure_exists(&self) -> DeployerResult<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.root.join(name)
    }

    pub fn api_model_path(&self) -> PathBuf {
        self.join(API_MODEL_FILE)
    }

    pub fn template_path(&self) -> PathBuf {
        self.join(TEMPLATE_FILE)
    }

    pub fn parameters_path(&self) -> PathBuf {
        self.join(PARAMETERS_FILE)
    }

    pub fn kubeconfig_dir(&self) -> PathBuf {
        self.join(KUBECONFIG_DIR)
    }

    /// First kubeconfig file (by name) in `<workdir>/kubeconfig/`.
    pub fn locate_kubeconfig(&self) -> DeployerResult<PathBuf> {
        let dir = self.kubeconfig_dir();
        let entries = fs::read_dir(&dir).map_err(|e| {
            DeployerError::Configuration(format!(
                "no kubeconfig directory at {}: {}",
                dir.display(),
                e
            ))
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        files.sort();

        files.into_iter().next().ok_or_else(|| {
            DeployerError::Configuration(format!("no kubeconfig file found in {}", dir.display()))
        })
    }
}
