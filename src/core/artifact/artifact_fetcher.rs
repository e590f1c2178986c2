use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::errors::{DeployerError, DeployerResult};

use super::archive::extract_tar_gz;
use super::artifact_source_trait::ArtifactSource;

/// Downloads a release archive, verifies it, and unpacks the tool inside.
pub struct ArtifactFetcher {
    source: Arc<dyn ArtifactSource>,
    download_path: PathBuf,
    extract_dir: PathBuf,
    binary_name: String,
    base_delay: Duration,
}

impl ArtifactFetcher {
    pub fn new(
        source: Arc<dyn ArtifactSource>,
        download_path: impl Into<PathBuf>,
        extract_dir: impl Into<PathBuf>,
        binary_name: impl Into<String>,
    ) -> Self {
        Self {
            source,
            download_path: download_path.into(),
            extract_dir: extract_dir.into(),
            binary_name: binary_name.into(),
            base_delay: Duration::from_secs(1),
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn download_path(&self) -> &Path {
        &self.download_path
    }

    /// Fetch `url`, check it against `expected_checksum` (hex SHA-256, skipped
    /// when empty), extract it and return the path of the tool binary.
    ///
    /// Transport failures are retried up to `max_attempts` times with a linear
    /// backoff; a checksum mismatch is returned immediately.
    pub async fn fetch(
        &self,
        url: &str,
        expected_checksum: &str,
        max_attempts: u32,
    ) -> DeployerResult<PathBuf> {
        let max_attempts = max_attempts.max(1);

        for attempt in 0..max_attempts {
            info!(
                url,
                dest = %self.download_path.display(),
                attempt = attempt + 1,
                "Downloading artifact"
            );

            match self.source.download(url, &self.download_path).await {
                Ok(()) => break,
                Err(e) if !e.is_retryable() || attempt + 1 == max_attempts => {
                    return Err(e);
                }
                Err(e) => {
                    let delay = backoff_delay(self.base_delay, attempt);
                    warn!(
                        url,
                        attempt = attempt + 1,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Download failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let expected = expected_checksum.trim();
        if !expected.is_empty() {
            let actual = sha256_file(&self.download_path).await?;
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(DeployerError::Integrity {
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        let archive = self.download_path.clone();
        let dest = self.extract_dir.clone();
        info!(
            archive = %archive.display(),
            dest = %dest.display(),
            "Extracting artifact"
        );
        tokio::task::spawn_blocking(move || extract_tar_gz(&archive, &dest, 1))
            .await
            .map_err(|e| DeployerError::Io(std::io::Error::other(e)))??;

        let tool = self.extract_dir.join(&self.binary_name);
        if !tool.is_file() {
            return Err(DeployerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found in extracted archive", self.binary_name),
            )));
        }

        Ok(tool)
    }
}

/// Delay slept after failed attempt `attempt` (0-based): grows linearly.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt + 1)
}

async fn sha256_file(path: &Path) -> DeployerResult<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::artifact::archive::tests::tarball;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Fails `failures` times with a transient error, then serves `payload`.
    struct FlakySource {
        failures: u32,
        payload: Vec<u8>,
        calls: Mutex<Vec<Instant>>,
    }

    impl FlakySource {
        fn new(failures: u32, payload: Vec<u8>) -> Self {
            Self {
                failures,
                payload,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ArtifactSource for FlakySource {
        async fn download(&self, _url: &str, dest: &Path) -> DeployerResult<()> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(Instant::now());
                calls.len() as u32
            };
            if n <= self.failures {
                return Err(DeployerError::TransientNetwork("connection reset".into()));
            }
            std::fs::write(dest, &self.payload)?;
            Ok(())
        }
    }

    fn tool_archive() -> Vec<u8> {
        tarball(&[
            ("acs-engine-v0.1/acs-engine", 0o755, b"#!/bin/sh\necho ok\n"),
            ("acs-engine-v0.1/LICENSE", 0o644, b"license"),
        ])
    }

    fn fetcher(source: Arc<FlakySource>, dir: &Path) -> ArtifactFetcher {
        ArtifactFetcher::new(source, dir.join("acs-engine.tar.gz"), dir, "acs-engine")
            .with_base_delay(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn retries_transient_failures_with_growing_delays() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FlakySource::new(2, tool_archive()));

        let tool = fetcher(source.clone(), dir.path())
            .fetch("https://example.com/acs.tar.gz", "", 3)
            .await
            .unwrap();

        assert_eq!(tool, dir.path().join("acs-engine"));
        assert!(tool.is_file());

        let calls = source.calls();
        assert_eq!(calls.len(), 3);
        let first_gap = calls[1] - calls[0];
        let second_gap = calls[2] - calls[1];
        assert!(first_gap >= Duration::from_millis(20));
        assert!(second_gap >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn final_failure_is_returned_without_another_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FlakySource::new(5, tool_archive()));

        let err = fetcher(source.clone(), dir.path())
            .fetch("https://example.com/acs.tar.gz", "", 3)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployerError::TransientNetwork(_)));
        assert_eq!(source.calls().len(), 3);
    }

    #[tokio::test]
    async fn checksum_mismatch_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FlakySource::new(0, tool_archive()));

        let err = fetcher(source.clone(), dir.path())
            .fetch("https://example.com/acs.tar.gz", "deadbeef", 3)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployerError::Integrity { ref expected, .. } if expected == "deadbeef"));
        assert_eq!(source.calls().len(), 1);
        assert!(!dir.path().join("acs-engine").exists());
    }

    #[tokio::test]
    async fn matching_checksum_passes() {
        let dir = tempfile::tempdir().unwrap();
        let archive = tool_archive();
        let checksum = hex::encode(Sha256::digest(&archive)).to_uppercase();
        let source = Arc::new(FlakySource::new(0, archive));

        let tool = fetcher(source, dir.path())
            .fetch("https://example.com/acs.tar.gz", &checksum, 1)
            .await
            .unwrap();
        assert!(tool.ends_with("acs-engine"));
    }

    #[test]
    fn backoff_is_linear() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(base, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 4), Duration::from_secs(5));
    }
}
