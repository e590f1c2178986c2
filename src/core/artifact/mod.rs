pub mod archive;
pub mod artifact_fetcher;
pub mod artifact_source_trait;
pub mod http_artifact_source;
