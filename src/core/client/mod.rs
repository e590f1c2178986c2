pub mod azure;
pub mod control_plane_client_trait;

// Kube-rs based Kubernetes client
pub mod kube_client;
pub mod nodes;
