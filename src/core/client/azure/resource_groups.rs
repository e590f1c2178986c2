use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::client::control_plane_client_trait::{merge_tags, ResourceGroup, Tags};
use crate::errors::{DeployerResult, RemoteCall};

use super::arm_http::ArmHttp;

pub const RESOURCE_GROUPS_API_VERSION: &str = "2021-04-01";

#[derive(Debug, Serialize, Deserialize)]
struct ResourceGroupBody {
    #[serde(default, skip_serializing)]
    name: Option<String>,
    location: String,
    #[serde(default)]
    tags: Tags,
}

fn group_path(http: &ArmHttp, name: &str) -> String {
    http.resource_group_path(name, "")
}

/// Existing group, or `None` when it does not exist.
pub async fn get_resource_group(http: &ArmHttp, name: &str) -> DeployerResult<Option<ResourceGroup>> {
    let resp = http
        .send(Method::GET, &group_path(http, name), RESOURCE_GROUPS_API_VERSION, None)
        .await?;

    if resp.status == StatusCode::NOT_FOUND {
        debug!(group = %name, "Resource group does not exist yet");
        return Ok(None);
    }

    let body: ResourceGroupBody = serde_json::from_value(resp.into_json(RemoteCall::Other)?)?;
    Ok(Some(ResourceGroup {
        name: body.name.unwrap_or_else(|| name.to_string()),
        location: body.location,
        tags: body.tags,
    }))
}

/// Create-or-update keeping any tags the group already carries.
pub async fn ensure_resource_group(
    http: &ArmHttp,
    name: &str,
    location: &str,
    tags: Option<&Tags>,
) -> DeployerResult<ResourceGroup> {
    let existing = get_resource_group(http, name).await?;
    let merged = match &existing {
        Some(group) => merge_tags(&group.tags, tags),
        None => tags.cloned().unwrap_or_default(),
    };

    let body = serde_json::to_value(ResourceGroupBody {
        name: None,
        location: location.to_string(),
        tags: merged,
    })?;
    let resp = http
        .send(Method::PUT, &group_path(http, name), RESOURCE_GROUPS_API_VERSION, Some(&body))
        .await?;
    let created: ResourceGroupBody = serde_json::from_value(resp.into_json(RemoteCall::Other)?)?;

    info!(group = %name, location = %location, existed = existing.is_some(), "Resource group ensured");
    Ok(ResourceGroup {
        name: name.to_string(),
        location: created.location,
        tags: created.tags,
    })
}

/// Accepted deletion is enough; completion is not awaited.
pub async fn delete_resource_group(http: &ArmHttp, name: &str) -> DeployerResult<()> {
    let resp = http
        .send(Method::DELETE, &group_path(http, name), RESOURCE_GROUPS_API_VERSION, None)
        .await?;

    match resp.status {
        StatusCode::OK | StatusCode::ACCEPTED | StatusCode::NO_CONTENT => {
            info!(group = %name, status = %resp.status, "Resource group deletion accepted");
            Ok(())
        }
        _ => Err(resp.into_error(RemoteCall::Other)),
    }
}
