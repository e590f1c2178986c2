use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::client::control_plane_client_trait::{
    DeploymentResult, ProvisioningState, ValidationResult,
};
use crate::core::template::template_documents::{DeploymentParameters, DeploymentTemplate};
use crate::errors::{DeployerError, DeployerResult, RemoteCall};

use super::arm_http::{segment, ArmHttp};
use super::poller::{poll_until, PollSettings};

pub const DEPLOYMENTS_API_VERSION: &str = "2021-04-01";
const INCREMENTAL: &str = "Incremental";

fn deployment_path(http: &ArmHttp, resource_group: &str, name: &str, tail: &str) -> String {
    http.resource_group_path(
        resource_group,
        &format!(
            "/providers/Microsoft.Resources/deployments/{}{}",
            segment(name),
            tail
        ),
    )
}

fn deployment_body(template: &DeploymentTemplate, parameters: &DeploymentParameters) -> Value {
    json!({
        "properties": {
            "mode": INCREMENTAL,
            "template": template.to_value(),
            "parameters": parameters.to_value(),
        }
    })
}

fn provisioning_state(doc: &Value) -> Option<&str> {
    doc.pointer("/properties/provisioningState").and_then(Value::as_str)
}

fn timestamp(doc: &Value) -> Option<DateTime<Utc>> {
    doc.pointer("/properties/timestamp")
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

/// Remote diagnostic for a failed deployment, or the whole document.
fn error_detail(doc: &Value) -> String {
    doc.pointer("/properties/error")
        .or_else(|| doc.get("error"))
        .unwrap_or(doc)
        .to_string()
}

pub async fn validate(
    http: &ArmHttp,
    resource_group: &str,
    name: &str,
    template: &DeploymentTemplate,
    parameters: &DeploymentParameters,
) -> DeployerResult<ValidationResult> {
    let body = deployment_body(template, parameters);
    let doc = http
        .send(
            Method::POST,
            &deployment_path(http, resource_group, name, "/validate"),
            DEPLOYMENTS_API_VERSION,
            Some(&body),
        )
        .await?
        .into_json(RemoteCall::Validation)?;

    // Older API versions report rejection in a 200 body.
    if let Some(error) = doc.get("error").filter(|e| !e.is_null()) {
        return Err(DeployerError::TemplateInvalid(error.to_string()));
    }

    let state = provisioning_state(&doc).map(str::to_string);
    info!(group = %resource_group, deployment = %name, state = ?state, "Deployment validated");
    Ok(ValidationResult {
        provisioning_state: state,
    })
}

pub async fn submit(
    http: &ArmHttp,
    resource_group: &str,
    name: &str,
    template: &DeploymentTemplate,
    parameters: &DeploymentParameters,
) -> DeployerResult<()> {
    let body = deployment_body(template, parameters);
    http.send(
        Method::PUT,
        &deployment_path(http, resource_group, name, ""),
        DEPLOYMENTS_API_VERSION,
        Some(&body),
    )
    .await?
    .into_json(RemoteCall::Other)?;

    info!(group = %resource_group, deployment = %name, mode = INCREMENTAL, "Deployment submitted");
    Ok(())
}

pub async fn get(http: &ArmHttp, resource_group: &str, name: &str) -> DeployerResult<Value> {
    http.send(
        Method::GET,
        &deployment_path(http, resource_group, name, ""),
        DEPLOYMENTS_API_VERSION,
        None,
    )
    .await?
    .into_json(RemoteCall::Other)
}

/// Poll until the deployment reaches a terminal state.
pub async fn wait_for_completion(
    http: &ArmHttp,
    resource_group: &str,
    name: &str,
    settings: PollSettings,
    cancel: &CancellationToken,
) -> DeployerResult<DeploymentResult> {
    let what = format!("deployment {}", name);
    let doc = poll_until(&what, settings, cancel, move || {
        terminal_document(http, resource_group, name)
    })
    .await?;

    terminal_result(name, &doc)
}

/// Deployment document once it is terminal, `None` while still running.
async fn terminal_document(
    http: &ArmHttp,
    resource_group: &str,
    name: &str,
) -> DeployerResult<Option<Value>> {
    let doc = get(http, resource_group, name).await?;
    let state = ProvisioningState::from_code(provisioning_state(&doc).unwrap_or_default());
    Ok(state.is_terminal().then_some(doc))
}

pub(crate) fn terminal_result(name: &str, doc: &Value) -> DeployerResult<DeploymentResult> {
    let state = ProvisioningState::from_code(provisioning_state(doc).unwrap_or_default());
    match state {
        ProvisioningState::Succeeded => {
            info!(deployment = %name, "Deployment succeeded");
            Ok(DeploymentResult {
                name: name.to_string(),
                state,
                timestamp: timestamp(doc),
                outputs: doc.pointer("/properties/outputs").cloned(),
            })
        }
        ProvisioningState::Canceled => {
            warn!(deployment = %name, "Deployment was canceled remotely");
            Err(DeployerError::DeploymentFailed(format!(
                "deployment {} was canceled",
                name
            )))
        }
        _ => {
            let detail = error_detail(doc);
            warn!(deployment = %name, error = %detail, "Deployment failed");
            Err(DeployerError::DeploymentFailed(detail))
        }
    }
}

pub async fn created_at(
    http: &ArmHttp,
    resource_group: &str,
    name: &str,
) -> DeployerResult<DateTime<Utc>> {
    let doc = get(http, resource_group, name).await?;
    timestamp(&doc).ok_or_else(|| {
        DeployerError::Parse(format!("deployment {} has no timestamp", name))
    })
}
