pub mod cluster_orchestrator;
pub mod cluster_state;
pub mod deployer_factory;
pub mod deployer_trait;
