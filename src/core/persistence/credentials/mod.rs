pub mod credential_entity;
pub mod credential_fs_adapter;
pub mod credential_fs_adapter_trait;
pub mod credential_repository;
