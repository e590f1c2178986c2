use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::errors::{DeployerError, DeployerResult};

use super::credential_entity::{CredentialEntity, RawCredentialRecord};
use super::credential_fs_adapter_trait::CredentialFsAdapterTrait;

/// Name of the table that wraps the fields in the legacy layout.
const CREDS_TABLE: &str = "Creds";

/// FS adapter for credential files.
///
/// `.json` files are parsed as JSON, anything else as TOML. The fields may sit
/// at the top level or inside a `Creds` table.
#[derive(Debug, Default)]
pub struct CredentialFsAdapter;

impl CredentialFsAdapterTrait for CredentialFsAdapter {
    fn read(&self, path: &Path) -> DeployerResult<CredentialEntity> {
        let content = fs::read_to_string(path).map_err(|e| {
            DeployerError::Credential(format!(
                "error reading credentials file {}: {}",
                path.display(),
                e
            ))
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let raw = if is_json {
            parse_json(&content)
        } else {
            parse_toml(&content)
        }
        .map_err(|e| {
            DeployerError::Credential(format!(
                "error parsing credentials file {}: {}",
                path.display(),
                e
            ))
        })?;

        CredentialEntity::try_from(raw)
    }
}

fn parse_json(content: &str) -> Result<RawCredentialRecord, String> {
    let mut value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let inner = if value.get(CREDS_TABLE).is_some() {
        value[CREDS_TABLE].take()
    } else {
        value
    };
    decode(serde_json::from_value(inner))
}

fn parse_toml(content: &str) -> Result<RawCredentialRecord, String> {
    let mut table: toml::Table = content.parse().map_err(|e: toml::de::Error| e.to_string())?;
    let inner = match table.remove(CREDS_TABLE) {
        Some(toml::Value::Table(creds)) => creds,
        _ => table,
    };
    decode(toml::Value::Table(inner).try_into())
}

fn decode<T: DeserializeOwned, E: std::fmt::Display>(result: Result<T, E>) -> Result<T, String> {
    result.map_err(|e| e.to_string())
}
