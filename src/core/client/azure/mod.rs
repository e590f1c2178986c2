pub mod arm_control_plane;
pub mod arm_http;
pub mod azure_auth;
pub mod deployments;
pub mod managed_cluster_control_plane;
pub mod managed_clusters;
pub mod poller;
pub mod resource_groups;
