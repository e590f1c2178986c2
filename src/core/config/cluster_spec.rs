use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::core::config::secret::Secret;
use crate::errors::{DeployerError, DeployerResult};

pub const DEFAULT_LOCATION: &str = "westus2";
pub const DEFAULT_VM_SIZE: &str = "Standard_D2s_v3";
pub const DEFAULT_AGENT_COUNT: u32 = 2;

/// Operating system of the agent pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentOsType {
    Linux,
    Windows,
}

impl AgentOsType {
    pub fn as_code(&self) -> &'static str {
        match self {
            AgentOsType::Linux => "Linux",
            AgentOsType::Windows => "Windows",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_lowercase().as_str() {
            "linux" => Some(AgentOsType::Linux),
            "windows" => Some(AgentOsType::Windows),
            _ => None,
        }
    }
}

/// Immutable description of the cluster to provision.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClusterSpec {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub resource_group: String,
    #[validate(length(min = 1))]
    pub location: String,
    #[validate(length(min = 1))]
    pub dns_prefix: String,
    #[validate(length(min = 1))]
    pub master_vm_size: String,
    #[validate(length(min = 1))]
    pub agent_vm_size: String,
    #[validate(range(min = 1))]
    pub agent_count: u32,
    pub agent_os_type: AgentOsType,
    #[validate(length(min = 1))]
    pub admin_username: String,
    #[serde(skip_serializing)]
    pub admin_password: Option<Secret>,
    /// SSH public key material (not a path).
    pub ssh_public_key: String,
    pub custom_hyperkube_image: Option<String>,
    pub custom_windows_package_url: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl ClusterSpec {
    /// Spec with the usual defaults; resource group and DNS prefix follow the name.
    pub fn new(name: impl Into<String>, admin_username: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            resource_group: format!("{}-rg", name),
            dns_prefix: name.clone(),
            name,
            location: DEFAULT_LOCATION.to_string(),
            master_vm_size: DEFAULT_VM_SIZE.to_string(),
            agent_vm_size: DEFAULT_VM_SIZE.to_string(),
            agent_count: DEFAULT_AGENT_COUNT,
            agent_os_type: AgentOsType::Linux,
            admin_username: admin_username.into(),
            admin_password: None,
            ssh_public_key: String::new(),
            custom_hyperkube_image: None,
            custom_windows_package_url: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn synthesize_name() -> String {
        format!("kubetest-{}", Uuid::new_v4())
    }

    /// Validate field constraints plus the rules validator can't express.
    pub fn check(&self) -> DeployerResult<()> {
        self.validate()
            .map_err(|e| DeployerError::Configuration(format!("invalid cluster spec: {}", e)))?;

        if self.agent_os_type == AgentOsType::Windows
            && self.admin_password.as_ref().map_or(true, Secret::is_empty)
        {
            return Err(DeployerError::Configuration(
                "an admin password is required for Windows agent pools".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_name() {
        let spec = ClusterSpec::new("kt-1", "azureuser");
        assert_eq!(spec.resource_group, "kt-1-rg");
        assert_eq!(spec.dns_prefix, "kt-1");
        assert_eq!(spec.location, "westus2");
        assert!(spec.check().is_ok());
    }

    #[test]
    fn empty_name_is_a_configuration_error() {
        let mut spec = ClusterSpec::new("kt-1", "azureuser");
        spec.name.clear();
        assert!(matches!(spec.check(), Err(DeployerError::Configuration(_))));
    }

    #[test]
    fn windows_pool_requires_password() {
        let mut spec = ClusterSpec::new("kt-1", "azureuser");
        spec.agent_os_type = AgentOsType::Windows;
        assert!(spec.check().is_err());

        spec.admin_password = Some(Secret::new("P@ssw0rd!"));
        assert!(spec.check().is_ok());
    }

    #[test]
    fn synthesized_names_are_unique() {
        let a = ClusterSpec::synthesize_name();
        let b = ClusterSpec::synthesize_name();
        assert!(a.starts_with("kubetest-"));
        assert_ne!(a, b);
    }
}
