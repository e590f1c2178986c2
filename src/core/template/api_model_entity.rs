use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::skip_serializing_none;

use crate::core::config::cluster_spec::{AgentOsType, ClusterSpec};
use crate::core::persistence::credentials::credential_entity::CredentialEntity;

pub const API_VERSION: &str = "vlabs";
pub const ORCHESTRATOR_KUBERNETES: &str = "Kubernetes";
pub const AGENT_POOL_NAME: &str = "agentpool0";
pub const AVAILABILITY_SET: &str = "AvailabilitySet";

/// Cluster definition fed to the template generator.
///
/// Unknown fields of a user-supplied model are kept in `extra` so loading and
/// re-writing a model never drops settings this crate doesn't know about.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiModel {
    pub api_version: String,
    pub location: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub properties: Properties,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Properties {
    pub orchestrator_profile: Option<OrchestratorProfile>,
    pub master_profile: Option<MasterProfile>,
    #[serde(default)]
    pub agent_pool_profiles: Vec<AgentPoolProfile>,
    pub linux_profile: Option<LinuxProfile>,
    pub windows_profile: Option<WindowsProfile>,
    pub service_principal_profile: Option<ServicePrincipalProfile>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorProfile {
    pub orchestrator_type: String,
    pub orchestrator_version: Option<String>,
    pub kubernetes_config: Option<KubernetesConfig>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesConfig {
    pub custom_hyperkube_image: Option<String>,
    #[serde(rename = "customWindowsPackageURL")]
    pub custom_windows_package_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterProfile {
    pub count: u32,
    pub dns_prefix: String,
    pub vm_size: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPoolProfile {
    pub name: String,
    pub count: u32,
    pub vm_size: String,
    pub os_type: Option<String>,
    pub availability_profile: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinuxProfile {
    pub admin_username: String,
    pub ssh: Ssh,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ssh {
    pub public_keys: Vec<PublicKey>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    pub key_data: String,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowsProfile {
    pub admin_username: String,
    pub admin_password: String,
}

impl std::fmt::Debug for WindowsProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowsProfile")
            .field("admin_username", &self.admin_username)
            .field("admin_password", &"***")
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipalProfile {
    pub client_id: String,
    pub secret: String,
}

impl std::fmt::Debug for ServicePrincipalProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipalProfile")
            .field("client_id", &self.client_id)
            .field("secret", &"***")
            .finish()
    }
}

impl ApiModel {
    /// Synthesise a single-master, single-pool Kubernetes model from the spec.
    pub fn from_spec(spec: &ClusterSpec, creds: &CredentialEntity) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert("date".to_string(), Utc::now().to_rfc3339());

        let windows_profile = match (spec.agent_os_type, spec.admin_password.as_ref()) {
            (AgentOsType::Windows, Some(password)) => Some(WindowsProfile {
                admin_username: spec.admin_username.clone(),
                admin_password: password.expose().to_string(),
            }),
            _ => None,
        };

        let mut model = Self {
            api_version: API_VERSION.to_string(),
            location: Some(spec.location.clone()),
            name: Some(spec.name.clone()),
            tags,
            properties: Properties {
                orchestrator_profile: Some(OrchestratorProfile {
                    orchestrator_type: ORCHESTRATOR_KUBERNETES.to_string(),
                    ..Default::default()
                }),
                master_profile: Some(MasterProfile {
                    count: 1,
                    dns_prefix: spec.dns_prefix.clone(),
                    vm_size: spec.master_vm_size.clone(),
                    ..Default::default()
                }),
                agent_pool_profiles: vec![AgentPoolProfile {
                    name: AGENT_POOL_NAME.to_string(),
                    count: spec.agent_count,
                    vm_size: spec.agent_vm_size.clone(),
                    os_type: Some(spec.agent_os_type.as_code().to_string()),
                    availability_profile: Some(AVAILABILITY_SET.to_string()),
                    ..Default::default()
                }],
                linux_profile: Some(LinuxProfile {
                    admin_username: spec.admin_username.clone(),
                    ssh: Ssh {
                        public_keys: vec![PublicKey {
                            key_data: spec.ssh_public_key.clone(),
                        }],
                    },
                }),
                windows_profile,
                service_principal_profile: Some(ServicePrincipalProfile {
                    client_id: creds.client_id.clone(),
                    secret: creds.client_secret.expose().to_string(),
                }),
                ..Default::default()
            },
            ..Default::default()
        };

        model.apply_overrides(spec);
        model
    }

    /// Overlay the spec's values; they always win over whatever the model had.
    pub fn apply_overrides(&mut self, spec: &ClusterSpec) {
        self.name = Some(spec.name.clone());
        self.location = Some(spec.location.clone());
        for (key, value) in &spec.tags {
            self.tags.insert(key.clone(), value.clone());
        }

        if let Some(master) = self.properties.master_profile.as_mut() {
            master.dns_prefix = spec.dns_prefix.clone();
        }

        if spec.custom_hyperkube_image.is_none() && spec.custom_windows_package_url.is_none() {
            return;
        }

        let orchestrator = self
            .properties
            .orchestrator_profile
            .get_or_insert_with(|| OrchestratorProfile {
                orchestrator_type: ORCHESTRATOR_KUBERNETES.to_string(),
                ..Default::default()
            });
        let kubernetes = orchestrator
            .kubernetes_config
            .get_or_insert_with(KubernetesConfig::default);

        if let Some(image) = &spec.custom_hyperkube_image {
            kubernetes.custom_hyperkube_image = Some(image.clone());
        }
        if let Some(url) = &spec.custom_windows_package_url {
            kubernetes.custom_windows_package_url = Some(url.clone());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::config::secret::Secret;

    pub(crate) fn creds() -> CredentialEntity {
        CredentialEntity {
            client_id: "client-id".into(),
            client_secret: Secret::new("client-secret-value"),
            tenant_id: "tenant".into(),
            subscription_id: "sub".into(),
            storage_account_name: None,
            storage_account_key: None,
        }
    }

    #[test]
    fn synthesized_model_serializes_in_generator_shape() {
        let mut spec = ClusterSpec::new("kt-1", "azureuser");
        spec.ssh_public_key = "ssh-rsa AAAA".into();
        spec.custom_hyperkube_image = Some("example.io/hyperkube:v1".into());

        let json = serde_json::to_value(ApiModel::from_spec(&spec, &creds())).unwrap();

        assert_eq!(json["apiVersion"], "vlabs");
        assert_eq!(json["name"], "kt-1");
        assert_eq!(json["properties"]["masterProfile"]["dnsPrefix"], "kt-1");
        assert_eq!(json["properties"]["agentPoolProfiles"][0]["count"], 2);
        assert_eq!(
            json["properties"]["linuxProfile"]["ssh"]["publicKeys"][0]["keyData"],
            "ssh-rsa AAAA"
        );
        assert_eq!(
            json["properties"]["orchestratorProfile"]["kubernetesConfig"]["customHyperkubeImage"],
            "example.io/hyperkube:v1"
        );
        assert!(json["properties"].get("windowsProfile").is_none());
        assert!(json["tags"].get("date").is_some());
    }

    #[test]
    fn overrides_win_and_unknown_fields_survive() {
        let user_model = serde_json::json!({
            "apiVersion": "vlabs",
            "name": "from-file",
            "location": "eastus",
            "tags": {"owner": "file"},
            "properties": {
                "masterProfile": {"count": 3, "dnsPrefix": "file-dns", "vmSize": "Standard_D4s_v3", "storageProfile": "ManagedDisks"},
                "agentPoolProfiles": [],
                "featureFlags": {"enableTelemetry": false}
            }
        });
        let mut model: ApiModel = serde_json::from_value(user_model).unwrap();

        let mut spec = ClusterSpec::new("kt-1", "azureuser");
        spec.tags.insert("owner".into(), "spec".into());
        model.apply_overrides(&spec);

        let json = serde_json::to_value(&model).unwrap();
        assert_eq!(json["name"], "kt-1");
        assert_eq!(json["location"], "westus2");
        assert_eq!(json["tags"]["owner"], "spec");
        assert_eq!(json["properties"]["masterProfile"]["dnsPrefix"], "kt-1");
        assert_eq!(json["properties"]["masterProfile"]["count"], 3);
        assert_eq!(json["properties"]["masterProfile"]["storageProfile"], "ManagedDisks");
        assert_eq!(json["properties"]["featureFlags"]["enableTelemetry"], false);
    }

    #[test]
    fn debug_output_hides_service_principal_secret() {
        let spec = ClusterSpec::new("kt-1", "azureuser");
        let model = ApiModel::from_spec(&spec, &creds());
        assert!(!format!("{:?}", model).contains("client-secret-value"));
    }
}
