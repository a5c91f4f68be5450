use super::{digest_for_asset, VersionSource};
use crate::error::{Result, ToolshedError};
use crate::models::{Architecture, Artifact, Platform, Resolution, Version, VersionSelector};
use crate::registry::ArtifactSpec;
use async_trait::async_trait;
use reqwest::Client;

/// Version source for mirror-style upstreams: a newline-delimited version
/// index at `{base}/index.txt` and one directory per version holding the
/// artifact plus a sha256sum file.
pub struct HttpIndexSource {
    tool: String,
    base_url: String,
    artifact: ArtifactSpec,
    platform: Platform,
    arch: Architecture,
    client: Client,
}

impl HttpIndexSource {
    pub fn new(
        tool: &str,
        base_url: &str,
        artifact: ArtifactSpec,
        platform: Platform,
        arch: Architecture,
        client: Client,
    ) -> Self {
        Self {
            tool: tool.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            artifact,
            platform,
            arch,
            client,
        }
    }

    fn unavailable(&self, message: String) -> ToolshedError {
        ToolshedError::SourceUnavailable {
            tool: self.tool.clone(),
            message,
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.unavailable(format!("GET {} returned {}", url, response.status())));
        }

        response
            .text()
            .await
            .map_err(|e| self.unavailable(e.to_string()))
    }
}

#[async_trait]
impl VersionSource for HttpIndexSource {
    async fn list_versions(&self) -> Result<Vec<Version>> {
        let index = self
            .fetch_text(&format!("{}/index.txt", self.base_url))
            .await?;

        let mut versions: Vec<Version> = index
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(Version::from)
            .collect();

        versions.sort_by(|a, b| b.cmp(a));
        Ok(versions)
    }

    async fn resolve(&self, selector: &VersionSelector) -> Result<Resolution> {
        let versions = self.list_versions().await?;

        let version = match selector {
            VersionSelector::Latest => {
                versions
                    .into_iter()
                    .next()
                    .ok_or_else(|| ToolshedError::NoSuchVersion {
                        tool: self.tool.clone(),
                        version: "latest".to_string(),
                    })?
            }
            VersionSelector::Exact(wanted) => versions
                .into_iter()
                .find(|v| v == wanted)
                .ok_or_else(|| ToolshedError::NoSuchVersion {
                    tool: self.tool.clone(),
                    version: wanted.to_string(),
                })?,
        };

        let asset_name = self.artifact.asset_name(&version, self.platform, self.arch);
        let url = format!("{}/{}/{}", self.base_url, version, asset_name);

        let checksum = match self
            .artifact
            .checksum_asset_name(&version, self.platform, self.arch)
        {
            Some(sums_name) => {
                let sums_url = format!("{}/{}/{}", self.base_url, version, sums_name);
                match self.fetch_text(&sums_url).await {
                    Ok(text) => digest_for_asset(&text, &asset_name),
                    Err(e) => {
                        tracing::warn!(tool = %self.tool, error = %e, "checksums file unavailable");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(Resolution {
            version,
            artifact: Artifact {
                url,
                checksum,
                kind: self.artifact.kind,
                size: None,
            },
        })
    }
}
