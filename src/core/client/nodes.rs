use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::{Api, Client};
use serde::Serialize;
use tracing::debug;

use crate::errors::{DeployerError, DeployerResult};

/// Fetch all nodes in the cluster
pub async fn fetch_nodes(client: &Client) -> DeployerResult<Vec<Node>> {
    let nodes: Api<Node> = Api::all(client.clone());
    let node_list = nodes
        .list(&ListParams::default())
        .await
        .map_err(|e| DeployerError::Liveness(format!("failed to list nodes: {}", e)))?;

    debug!("Discovered {} node(s)", node_list.items.len());
    Ok(node_list.items)
}

/// Check if a node has the Ready condition set to True.
pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
        .unwrap_or(false)
}

/// A cluster counts as up once it has nodes and all of them are Ready.
pub fn check_nodes_ready(nodes: &[Node]) -> DeployerResult<()> {
    if nodes.is_empty() {
        return Err(DeployerError::Liveness("cluster has no nodes".into()));
    }

    let not_ready: Vec<String> = nodes
        .iter()
        .filter(|n| !is_node_ready(n))
        .map(|n| n.metadata.name.clone().unwrap_or_default())
        .collect();

    if not_ready.is_empty() {
        Ok(())
    } else {
        Err(DeployerError::Liveness(format!(
            "nodes not ready: {}",
            not_ready.join(", ")
        )))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConditionSummary {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// Node state written out by a log dump.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub name: String,
    pub ready: bool,
    pub kubelet_version: Option<String>,
    pub conditions: Vec<ConditionSummary>,
}

impl From<&Node> for NodeSummary {
    fn from(node: &Node) -> Self {
        let status = node.status.as_ref();
        let conditions = status
            .and_then(|s| s.conditions.as_ref())
            .map(|conds| {
                conds
                    .iter()
                    .map(|c| ConditionSummary {
                        type_: c.type_.clone(),
                        status: c.status.clone(),
                        reason: c.reason.clone(),
                        message: c.message.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: node.metadata.name.clone().unwrap_or_default(),
            ready: is_node_ready(node),
            kubelet_version: status
                .and_then(|s| s.node_info.as_ref())
                .map(|info| info.kubelet_version.clone()),
            conditions,
        }
    }
}
