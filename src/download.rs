use crate::error::{Result, ToolshedError};
use crate::models::Artifact;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tempfile::{NamedTempFile, TempPath};
use tokio::io::AsyncWriteExt;

/// A downloaded artifact sitting in the staging area, digest already
/// computed. The staged file is deleted when this is dropped, so placement
/// must happen while it is alive.
#[derive(Debug)]
pub struct VerifiedArtifact {
    staged: TempPath,
    pub digest: String,
}

impl VerifiedArtifact {
    pub fn path(&self) -> &Path {
        &self.staged
    }
}

pub struct Downloader {
    client: reqwest::Client,
    retries: u32,
    verify_checksums: bool,
}

impl Downloader {
    pub fn new(timeout: Duration, retries: u32, verify_checksums: bool) -> Self {
        Self {
            client: crate::sources::http_client(timeout),
            retries,
            verify_checksums,
        }
    }

    /// Download an artifact into the staging directory and verify its
    /// published checksum.
    ///
    /// Transient network failures are retried with backoff up to the
    /// configured budget; each attempt streams into a fresh temp file. A
    /// checksum mismatch is never retried: the staged file is deleted and
    /// the mismatch surfaced immediately.
    pub async fn fetch(&self, artifact: &Artifact, staging_dir: &Path) -> Result<VerifiedArtifact> {
        let mut attempt = 0;

        let (staged, digest) = loop {
            attempt += 1;
            match self.download_once(artifact, staging_dir).await {
                Ok(result) => break result,
                Err(e) if attempt <= self.retries => {
                    tracing::warn!(url = %artifact.url, attempt, error = %e, "download failed, retrying");
                    tokio::time::sleep(backoff(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        };

        if self.verify_checksums {
            if let Some(expected) = &artifact.checksum {
                if !digest.eq_ignore_ascii_case(expected) {
                    staged.close()?;
                    return Err(ToolshedError::IntegrityError {
                        url: artifact.url.clone(),
                        expected: expected.to_ascii_lowercase(),
                        actual: digest,
                    });
                }
            }
        }

        Ok(VerifiedArtifact { staged, digest })
    }

    async fn download_once(
        &self,
        artifact: &Artifact,
        staging_dir: &Path,
    ) -> Result<(TempPath, String)> {
        let response = self
            .client
            .get(&artifact.url)
            .send()
            .await
            .map_err(|e| ToolshedError::FetchFailed {
                url: artifact.url.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(ToolshedError::FetchFailed {
                url: artifact.url.clone(),
                message: format!("server returned {}", response.status()),
            });
        }

        let total_size = response.content_length().or(artifact.size).unwrap_or(0);
        let pb = ProgressBar::new(total_size);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_message(format!(
            "Downloading {}",
            artifact.url.split('/').last().unwrap_or("file")
        ));

        let staged = NamedTempFile::new_in(staging_dir)?.into_temp_path();
        let mut file = tokio::fs::File::create(&staged).await?;
        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ToolshedError::FetchFailed {
                url: artifact.url.clone(),
                message: e.to_string(),
            })?;
            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }

        file.flush().await?;
        pb.finish_and_clear();

        Ok((staged, format!("{:x}", hasher.finalize())))
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(250 * 2u64.pow(attempt.min(6)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArtifactKind;
    use tempfile::TempDir;

    // SHA256 of "hello world"
    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    fn artifact(url: String, checksum: Option<&str>) -> Artifact {
        Artifact {
            url,
            checksum: checksum.map(str::to_string),
            kind: ArtifactKind::Binary,
            size: None,
        }
    }

    fn downloader(retries: u32) -> Downloader {
        Downloader::new(Duration::from_secs(5), retries, true)
    }

    #[tokio::test]
    async fn test_fetch_verifies_checksum() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/tool")
            .with_body("hello world")
            .create_async()
            .await;
        let staging = TempDir::new().unwrap();

        let verified = downloader(0)
            .fetch(
                &artifact(format!("{}/tool", server.url()), Some(HELLO_SHA256)),
                staging.path(),
            )
            .await
            .unwrap();

        assert_eq!(verified.digest, HELLO_SHA256);
        assert_eq!(std::fs::read(verified.path()).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_checksum_mismatch_deletes_staged_file_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/tool")
            .with_body("tampered")
            .expect(1)
            .create_async()
            .await;
        let staging = TempDir::new().unwrap();

        let err = downloader(3)
            .fetch(
                &artifact(format!("{}/tool", server.url()), Some(HELLO_SHA256)),
                staging.path(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ToolshedError::IntegrityError { .. }));
        mock.assert_async().await;
        let leftovers: Vec<_> = std::fs::read_dir(staging.path()).unwrap().collect();
        assert!(leftovers.is_empty(), "staged file must be cleaned up");
    }

    #[tokio::test]
    async fn test_transient_failure_retries_within_budget() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/tool")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;
        let staging = TempDir::new().unwrap();

        let err = downloader(2)
            .fetch(
                &artifact(format!("{}/tool", server.url()), None),
                staging.path(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ToolshedError::FetchFailed { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_without_published_checksum_still_digests() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/tool")
            .with_body("hello world")
            .create_async()
            .await;
        let staging = TempDir::new().unwrap();

        let verified = downloader(0)
            .fetch(
                &artifact(format!("{}/tool", server.url()), None),
                staging.path(),
            )
            .await
            .unwrap();

        assert_eq!(verified.digest, HELLO_SHA256);
    }
}
