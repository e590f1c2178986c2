use serde::Deserialize;

use crate::core::config::secret::Secret;
use crate::errors::{DeployerError, DeployerResult};

/// Service-principal credentials for the target subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialEntity {
    pub client_id: String,
    pub client_secret: Secret,
    pub tenant_id: String,
    pub subscription_id: String,
    pub storage_account_name: Option<String>,
    pub storage_account_key: Option<Secret>,
}

/// On-disk shape; every field optional so missing ones are reported by name.
#[derive(Debug, Default, Deserialize)]
pub struct RawCredentialRecord {
    #[serde(rename = "ClientID", alias = "ClientId")]
    pub client_id: Option<String>,
    #[serde(rename = "ClientSecret")]
    pub client_secret: Option<String>,
    #[serde(rename = "TenantID", alias = "TenantId", alias = "TennantID")]
    pub tenant_id: Option<String>,
    #[serde(rename = "SubscriptionID", alias = "SubscriptionId")]
    pub subscription_id: Option<String>,
    #[serde(rename = "StorageAccountName")]
    pub storage_account_name: Option<String>,
    #[serde(rename = "StorageAccountKey")]
    pub storage_account_key: Option<String>,
}

impl TryFrom<RawCredentialRecord> for CredentialEntity {
    type Error = DeployerError;

    fn try_from(raw: RawCredentialRecord) -> DeployerResult<Self> {
        Ok(Self {
            client_id: required(raw.client_id, "ClientID")?,
            client_secret: Secret::new(required(raw.client_secret, "ClientSecret")?),
            tenant_id: required(raw.tenant_id, "TenantID")?,
            subscription_id: required(raw.subscription_id, "SubscriptionID")?,
            storage_account_name: non_empty(raw.storage_account_name),
            storage_account_key: non_empty(raw.storage_account_key).map(Secret::new),
        })
    }
}

fn required(value: Option<String>, field: &str) -> DeployerResult<String> {
    non_empty(value)
        .ok_or_else(|| DeployerError::Credential(format!("missing required field {}", field)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
