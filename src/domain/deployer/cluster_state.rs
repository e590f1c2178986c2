use std::fmt;

/// Orchestrator lifecycle states. Up: Initialized through ConfigExported.
/// Down: GroupDeleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    Initialized,
    TemplatesReady,
    GroupEnsured,
    Validated,
    Deployed,
    ConfigExported,
    GroupDeleted,
}

impl ClusterState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterState::Initialized => "initialized",
            ClusterState::TemplatesReady => "templates_ready",
            ClusterState::GroupEnsured => "group_ensured",
            ClusterState::Validated => "validated",
            ClusterState::Deployed => "deployed",
            ClusterState::ConfigExported => "config_exported",
            ClusterState::GroupDeleted => "group_deleted",
        }
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
