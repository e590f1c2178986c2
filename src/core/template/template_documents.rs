use serde_json::{json, Map, Value};

use crate::errors::{DeployerError, DeployerResult};

pub const PARAMETERS_KEY: &str = "parameters";
const PARAMETERS_SCHEMA: &str =
    "https://schema.management.azure.com/schemas/2015-01-01/deploymentParameters.json#";

/// Deployment template, handed verbatim to the control plane.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentTemplate(Map<String, Value>);

/// Deployment parameter values (already unwrapped from the `parameters` key).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeploymentParameters(Map<String, Value>);

impl DeploymentTemplate {
    pub fn parse(bytes: &[u8]) -> DeployerResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| DeployerError::Parse(format!("deployment template: {}", e)))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> DeployerResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(DeployerError::Parse(format!(
                "deployment template must be a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl DeploymentParameters {
    /// Parse a parameters file and unwrap its top-level `parameters` object.
    pub fn parse_document(bytes: &[u8]) -> DeployerResult<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| DeployerError::Parse(format!("deployment parameters: {}", e)))?;
        Self::from_document(value)
    }

    pub fn from_document(value: Value) -> DeployerResult<Self> {
        let Value::Object(mut doc) = value else {
            return Err(DeployerError::Parse(
                "deployment parameters must be a JSON object".into(),
            ));
        };
        match doc.remove(PARAMETERS_KEY) {
            Some(Value::Object(params)) => Ok(Self(params)),
            Some(other) => Err(DeployerError::Parse(format!(
                "`{}` must be a JSON object, got {}",
                PARAMETERS_KEY,
                type_name(&other)
            ))),
            None => Err(DeployerError::Parse(format!(
                "deployment parameters have no `{}` key",
                PARAMETERS_KEY
            ))),
        }
    }

    pub fn from_values(values: Map<String, Value>) -> Self {
        Self(values)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Replace the value of an existing parameter; absent parameters are left alone.
    pub fn override_value(&mut self, key: &str, value: Value) -> bool {
        match self.0.get_mut(key) {
            Some(slot) => {
                *slot = json!({ "value": value });
                true
            }
            None => false,
        }
    }

    /// Plain `name -> value` view, dropping the `{"value": ..}` wrappers.
    pub fn plain_values(&self) -> Map<String, Value> {
        self.0
            .iter()
            .map(|(k, v)| {
                let inner = v.get("value").cloned().unwrap_or_else(|| v.clone());
                (k.clone(), inner)
            })
            .collect()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Full parameters file with the `parameters` wrapper.
    pub fn to_document(&self) -> Value {
        json!({
            "$schema": PARAMETERS_SCHEMA,
            "contentVersion": "1.0.0.0",
            "parameters": self.to_value(),
        })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_must_be_object() {
        assert!(DeploymentTemplate::parse(br#"{"resources": []}"#).is_ok());
        assert!(matches!(
            DeploymentTemplate::parse(b"[1, 2]"),
            Err(DeployerError::Parse(_))
        ));
        assert!(matches!(
            DeploymentTemplate::parse(b"not json"),
            Err(DeployerError::Parse(_))
        ));
    }

    #[test]
    fn parameters_are_unwrapped() {
        let params = DeploymentParameters::parse_document(
            br#"{"contentVersion": "1.0.0.0", "parameters": {"location": {"value": "eastus"}}}"#,
        )
        .unwrap();

        assert_eq!(params.get("location"), Some(&json!({"value": "eastus"})));
        assert_eq!(params.plain_values()["location"], "eastus");
    }

    #[test]
    fn parameters_without_wrapper_are_rejected() {
        assert!(DeploymentParameters::parse_document(br#"{"location": {}}"#).is_err());
        assert!(DeploymentParameters::parse_document(br#"{"parameters": 3}"#).is_err());
    }

    #[test]
    fn override_only_touches_existing_keys() {
        let mut params = DeploymentParameters::from_values(
            serde_json::from_value(json!({"location": {"value": "eastus"}})).unwrap(),
        );

        assert!(params.override_value("location", json!("westus2")));
        assert!(!params.override_value("missing", json!(1)));
        assert_eq!(params.plain_values()["location"], "westus2");
        assert!(params.get("missing").is_none());

        let doc = params.to_document();
        assert_eq!(doc["parameters"]["location"]["value"], "westus2");
    }
}
