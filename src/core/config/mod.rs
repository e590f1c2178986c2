pub mod cluster_spec;
pub mod deployer_config;
pub mod secret;
