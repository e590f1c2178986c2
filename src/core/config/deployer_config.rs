use std::path::PathBuf;
use std::time::Duration;

use crate::core::config::cluster_spec::{AgentOsType, ClusterSpec};
use crate::core::config::secret::Secret;
use crate::errors::{DeployerError, DeployerResult};

pub const ENV_PREFIX: &str = "KUBETEST_AZURE_";
pub const KUBECONFIG_ENV: &str = "KUBECONFIG";
pub const DEFAULT_TOOL_BINARY: &str = "acs-engine";
pub const DEFAULT_RESOURCE_MANAGER_ENDPOINT: &str = "https://management.azure.com";
pub const DEFAULT_ACTIVE_DIRECTORY_ENDPOINT: &str = "https://login.microsoftonline.com";

/// How deployment templates are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateStrategy {
    /// Run the external generator binary and read its output files.
    ExternalTool,
    /// Call an in-process generator.
    Library,
}

impl TemplateStrategy {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "tool" | "external" | "external-tool" => Some(TemplateStrategy::ExternalTool),
            "library" | "lib" => Some(TemplateStrategy::Library),
            _ => None,
        }
    }
}

/// Which control-plane API the cluster is provisioned through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPlaneBackend {
    /// Resource-manager template deployments.
    Arm,
    /// Managed Kubernetes cluster resource.
    ManagedCluster,
}

impl ControlPlaneBackend {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "arm" | "template" => Some(ControlPlaneBackend::Arm),
            "managed-cluster" | "aks" => Some(ControlPlaneBackend::ManagedCluster),
            _ => None,
        }
    }
}

/// Immutable deployer configuration, built once and handed to the orchestrator.
#[derive(Debug, Clone)]
pub struct DeployerConfig {
    pub cluster: ClusterSpec,
    /// No resource name was given, so `cluster.name` is fresh for this run.
    pub name_synthesized: bool,
    pub credentials_path: PathBuf,
    pub workdir_root: PathBuf,
    pub template_strategy: TemplateStrategy,
    pub control_plane: ControlPlaneBackend,
    /// User-provided API model; one is synthesised from `cluster` when absent.
    pub api_model_path: Option<PathBuf>,
    pub tool_url: Option<String>,
    pub tool_checksum: Option<String>,
    pub tool_binary_name: String,
    pub download_attempts: u32,
    pub retry_base_delay: Duration,
    pub deploy_poll_interval: Duration,
    pub deploy_timeout: Duration,
    pub resource_manager_endpoint: String,
    pub active_directory_endpoint: String,
    /// Kubeconfig inherited through `KUBECONFIG`, used when this run exported none.
    pub existing_kubeconfig: Option<PathBuf>,
}

impl DeployerConfig {
    pub fn new(cluster: ClusterSpec, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            cluster,
            name_synthesized: false,
            credentials_path: credentials_path.into(),
            workdir_root: home_dir(),
            template_strategy: TemplateStrategy::ExternalTool,
            control_plane: ControlPlaneBackend::Arm,
            api_model_path: None,
            tool_url: None,
            tool_checksum: None,
            tool_binary_name: DEFAULT_TOOL_BINARY.to_string(),
            download_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            deploy_poll_interval: Duration::from_secs(5),
            deploy_timeout: Duration::from_secs(60 * 60),
            resource_manager_endpoint: DEFAULT_RESOURCE_MANAGER_ENDPOINT.to_string(),
            active_directory_endpoint: DEFAULT_ACTIVE_DIRECTORY_ENDPOINT.to_string(),
            existing_kubeconfig: None,
        }
    }

    /// Read configuration from `KUBETEST_AZURE_*` environment variables.
    pub fn from_env() -> DeployerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; keys are given without the prefix.
    pub fn from_lookup<F>(lookup: F) -> DeployerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, key))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let credentials_path = get("CREDENTIALS").ok_or_else(|| {
            DeployerError::Configuration("no credentials file path specified".into())
        })?;

        let admin_username = get("ADMIN_USERNAME").ok_or_else(|| {
            DeployerError::Configuration("no admin username specified".into())
        })?;

        let explicit_name = get("RESOURCE_NAME");
        let name_synthesized = explicit_name.is_none();
        let name = explicit_name.unwrap_or_else(ClusterSpec::synthesize_name);
        let mut cluster = ClusterSpec::new(name, admin_username);

        if let Some(v) = get("RESOURCE_GROUP") {
            cluster.resource_group = v;
        }
        if let Some(v) = get("DNS_PREFIX") {
            cluster.dns_prefix = v;
        }
        if let Some(v) = get("LOCATION") {
            cluster.location = v;
        }
        if let Some(v) = get("MASTER_VM_SIZE") {
            cluster.master_vm_size = v;
        }
        if let Some(v) = get("AGENT_VM_SIZE") {
            cluster.agent_vm_size = v;
        }
        if let Some(v) = get("AGENT_COUNT") {
            cluster.agent_count = parse_number(&v, "AGENT_COUNT")?;
        }
        if let Some(v) = get("AGENT_OS") {
            cluster.agent_os_type = AgentOsType::from_code(&v).ok_or_else(|| {
                DeployerError::Configuration(format!("unknown agent OS type: {}", v))
            })?;
        }
        cluster.admin_password = get("ADMIN_PASSWORD").map(Secret::from);
        cluster.custom_hyperkube_image = get("HYPERKUBE_IMAGE");
        cluster.custom_windows_package_url = get("WINDOWS_PACKAGE_URL");

        let key_path = get("SSH_PUBLIC_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| home_dir().join(".ssh").join("id_rsa.pub"));
        cluster.ssh_public_key = std::fs::read_to_string(&key_path)
            .map_err(|e| {
                DeployerError::Configuration(format!(
                    "error reading SSH key {}: {}",
                    key_path.display(),
                    e
                ))
            })?
            .trim()
            .to_string();

        cluster.check()?;

        let mut config = DeployerConfig::new(cluster, credentials_path);
        config.name_synthesized = name_synthesized;
        config.existing_kubeconfig = lookup(KUBECONFIG_ENV)
            .and_then(|v| std::env::split_paths(&v).find(|p| p.is_file()));

        if let Some(v) = get("WORKDIR_ROOT") {
            config.workdir_root = PathBuf::from(v);
        }
        if let Some(v) = get("TEMPLATE_STRATEGY") {
            config.template_strategy = TemplateStrategy::from_code(&v).ok_or_else(|| {
                DeployerError::Configuration(format!("unknown template strategy: {}", v))
            })?;
        }
        if let Some(v) = get("CONTROL_PLANE") {
            config.control_plane = ControlPlaneBackend::from_code(&v).ok_or_else(|| {
                DeployerError::Configuration(format!("unknown control plane backend: {}", v))
            })?;
        }
        config.api_model_path = get("API_MODEL_PATH").map(PathBuf::from);
        config.tool_url = get("TOOL_URL");
        config.tool_checksum = get("TOOL_CHECKSUM");
        if let Some(v) = get("TOOL_BINARY") {
            config.tool_binary_name = v;
        }
        if let Some(v) = get("DOWNLOAD_ATTEMPTS") {
            config.download_attempts = parse_number(&v, "DOWNLOAD_ATTEMPTS")?;
        }
        if let Some(v) = get("RETRY_BASE_DELAY_SECS") {
            config.retry_base_delay = Duration::from_secs(parse_number(&v, "RETRY_BASE_DELAY_SECS")?);
        }
        if let Some(v) = get("DEPLOY_POLL_INTERVAL_SECS") {
            config.deploy_poll_interval =
                Duration::from_secs(parse_number(&v, "DEPLOY_POLL_INTERVAL_SECS")?);
        }
        if let Some(v) = get("DEPLOY_TIMEOUT_SECS") {
            config.deploy_timeout = Duration::from_secs(parse_number(&v, "DEPLOY_TIMEOUT_SECS")?);
        }
        if let Some(v) = get("RESOURCE_MANAGER_ENDPOINT") {
            config.resource_manager_endpoint = v;
        }
        if let Some(v) = get("ACTIVE_DIRECTORY_ENDPOINT") {
            config.active_directory_endpoint = v;
        }

        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> DeployerResult<()> {
        self.cluster.check()?;
        if self.download_attempts == 0 {
            return Err(DeployerError::Configuration(
                "download attempts must be at least 1".into(),
            ));
        }
        if self.deploy_poll_interval.is_zero() {
            return Err(DeployerError::Configuration(
                "deploy poll interval must be positive".into(),
            ));
        }
        Ok(())
    }

    /// The external tool has to be downloaded before templates can be generated.
    pub fn requires_tool_download(&self) -> bool {
        self.template_strategy == TemplateStrategy::ExternalTool && self.tool_url.is_some()
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, key: &str) -> DeployerResult<T> {
    value.parse().map_err(|_| {
        DeployerError::Configuration(format!("{}{} is not a valid number: {}", ENV_PREFIX, key, value))
    })
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
}
