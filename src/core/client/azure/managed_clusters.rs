use reqwest::Method;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::client::control_plane_client_trait::{
    DeploymentResult, ProvisioningState, ValidationResult,
};
use crate::core::template::template_documents::{DeploymentParameters, DeploymentTemplate};
use crate::errors::{DeployerError, DeployerResult, RemoteCall};

use super::arm_http::{segment, ArmHttp};
use super::deployments::terminal_result;
use super::poller::{poll_until, PollSettings};

pub const MANAGED_CLUSTERS_API_VERSION: &str = "2024-05-01";

fn cluster_path(http: &ArmHttp, resource_group: &str, name: &str) -> String {
    http.resource_group_path(
        resource_group,
        &format!(
            "/providers/Microsoft.ContainerService/managedClusters/{}",
            segment(name)
        ),
    )
}

/// Template document with parameter values laid over its `properties`.
pub fn cluster_body(template: &DeploymentTemplate, parameters: &DeploymentParameters) -> Value {
    let mut body = template.as_map().clone();
    let values = parameters.plain_values();

    if let Some(location) = values.get("location") {
        body.insert("location".into(), location.clone());
    }

    let properties = body
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(props) = properties {
        for (key, value) in values.into_iter().filter(|(k, _)| k != "location") {
            props.insert(key, value);
        }
    }

    Value::Object(body)
}

/// Local structural check; the managed-cluster API has no dry run.
pub fn validate(body: &Value) -> DeployerResult<ValidationResult> {
    let mut problems = Vec::new();

    if body.get("location").and_then(Value::as_str).map_or(true, str::is_empty) {
        problems.push("location is required");
    }
    match body.pointer("/properties/agentPoolProfiles").and_then(Value::as_array) {
        Some(pools) if !pools.is_empty() => {}
        _ => problems.push("properties.agentPoolProfiles must list at least one pool"),
    }
    if body.pointer("/properties/dnsPrefix").and_then(Value::as_str).map_or(true, str::is_empty) {
        problems.push("properties.dnsPrefix is required");
    }

    if problems.is_empty() {
        Ok(ValidationResult {
            provisioning_state: None,
        })
    } else {
        Err(DeployerError::TemplateInvalid(problems.join("; ")))
    }
}

pub async fn create_or_update(
    http: &ArmHttp,
    resource_group: &str,
    name: &str,
    body: &Value,
) -> DeployerResult<()> {
    http.send(
        Method::PUT,
        &cluster_path(http, resource_group, name),
        MANAGED_CLUSTERS_API_VERSION,
        Some(body),
    )
    .await?
    .into_json(RemoteCall::Other)?;

    info!(group = %resource_group, cluster = %name, "Managed cluster submitted");
    Ok(())
}

pub async fn wait_for_completion(
    http: &ArmHttp,
    resource_group: &str,
    name: &str,
    settings: PollSettings,
    cancel: &CancellationToken,
) -> DeployerResult<DeploymentResult> {
    let path = cluster_path(http, resource_group, name);
    let path = path.as_str();
    let what = format!("managed cluster {}", name);

    let doc = poll_until(&what, settings, cancel, move || terminal_document(http, path)).await?;

    terminal_result(name, &doc)
}

async fn terminal_document(http: &ArmHttp, path: &str) -> DeployerResult<Option<Value>> {
    let doc = http
        .send(Method::GET, path, MANAGED_CLUSTERS_API_VERSION, None)
        .await?
        .into_json(RemoteCall::Other)?;
    let state = doc
        .pointer("/properties/provisioningState")
        .and_then(Value::as_str)
        .map(ProvisioningState::from_code)
        .unwrap_or(ProvisioningState::Accepted);
    Ok(state.is_terminal().then_some(doc))
}
