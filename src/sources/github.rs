use super::{digest_for_asset, wildcard_match, VersionSource};
use crate::error::{Result, ToolshedError};
use crate::models::{Architecture, Artifact, Platform, Resolution, Version, VersionSelector};
use crate::registry::ArtifactSpec;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const GITHUB_API_BASE: &str = "https://api.github.com";
const RELEASES_PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    browser_download_url: String,
    size: Option<u64>,
}

/// Version source backed by a repository's GitHub releases.
pub struct GithubReleaseSource {
    tool: String,
    owner: String,
    repo: String,
    api_base: String,
    artifact: ArtifactSpec,
    platform: Platform,
    arch: Architecture,
    client: Client,
}

impl GithubReleaseSource {
    pub fn new(
        tool: &str,
        owner: &str,
        repo: &str,
        artifact: ArtifactSpec,
        platform: Platform,
        arch: Architecture,
        client: Client,
    ) -> Self {
        Self {
            tool: tool.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            api_base: GITHUB_API_BASE.to_string(),
            artifact,
            platform,
            arch,
            client,
        }
    }

    /// Point the source at a different API host. Used by tests.
    pub fn with_api_base<T: Into<String>>(mut self, api_base: T) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn unavailable(&self, message: String) -> ToolshedError {
        ToolshedError::SourceUnavailable {
            tool: self.tool.clone(),
            message,
        }
    }

    /// Published (non-draft, non-prerelease) releases, newest first.
    async fn fetch_releases(&self) -> Result<Vec<Release>> {
        let mut releases = Vec::new();
        let mut page = 1;

        loop {
            let url = format!(
                "{}/repos/{}/{}/releases?per_page={}&page={}",
                self.api_base, self.owner, self.repo, RELEASES_PER_PAGE, page
            );

            let response = self
                .client
                .get(&url)
                .header(reqwest::header::ACCEPT, "application/vnd.github+json")
                .send()
                .await
                .map_err(|e| self.unavailable(e.to_string()))?;

            if !response.status().is_success() {
                return Err(self.unavailable(format!(
                    "GET {} returned {}",
                    url,
                    response.status()
                )));
            }

            let batch: Vec<Release> = response
                .json()
                .await
                .map_err(|e| self.unavailable(e.to_string()))?;
            let fetched = batch.len();

            releases.extend(batch.into_iter().filter(|r| !r.draft && !r.prerelease));

            if fetched < RELEASES_PER_PAGE {
                break;
            }
            page += 1;
        }

        releases.sort_by(|a, b| Version::new(b.tag_name.as_str()).cmp(&Version::new(a.tag_name.as_str())));
        Ok(releases)
    }

    async fn checksum_for(&self, release: &Release, asset_name: &str, version: &Version) -> Result<Option<String>> {
        let checksum_name = match self
            .artifact
            .checksum_asset_name(version, self.platform, self.arch)
        {
            Some(name) => name,
            None => return Ok(None),
        };

        let checksum_asset = match release
            .assets
            .iter()
            .find(|a| wildcard_match(&checksum_name, &a.name))
        {
            Some(asset) => asset,
            None => {
                tracing::warn!(
                    tool = %self.tool,
                    asset = %checksum_name,
                    "release carries no checksums file"
                );
                return Ok(None);
            }
        };

        let response = self
            .client
            .get(&checksum_asset.browser_download_url)
            .send()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.unavailable(format!(
                "GET {} returned {}",
                checksum_asset.browser_download_url,
                response.status()
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        Ok(digest_for_asset(&text, asset_name))
    }
}

#[async_trait]
impl VersionSource for GithubReleaseSource {
    async fn list_versions(&self) -> Result<Vec<Version>> {
        let releases = self.fetch_releases().await?;
        Ok(releases
            .iter()
            .map(|r| Version::new(r.tag_name.as_str()))
            .collect())
    }

    async fn resolve(&self, selector: &VersionSelector) -> Result<Resolution> {
        let releases = self.fetch_releases().await?;

        let release = match selector {
            VersionSelector::Latest => releases.first().ok_or_else(|| {
                ToolshedError::NoSuchVersion {
                    tool: self.tool.clone(),
                    version: "latest".to_string(),
                }
            })?,
            VersionSelector::Exact(wanted) => releases
                .iter()
                .find(|r| &Version::new(r.tag_name.as_str()) == wanted)
                .ok_or_else(|| ToolshedError::NoSuchVersion {
                    tool: self.tool.clone(),
                    version: wanted.to_string(),
                })?,
        };

        let version = Version::new(release.tag_name.as_str());
        let pattern = self
            .artifact
            .asset_name(&version, self.platform, self.arch);

        let matches: Vec<&ReleaseAsset> = release
            .assets
            .iter()
            .filter(|a| wildcard_match(&pattern, &a.name))
            .collect();

        let asset = match matches.as_slice() {
            [single] => *single,
            [] => {
                return Err(ToolshedError::AmbiguousArtifact {
                    tool: self.tool.clone(),
                    version: version.to_string(),
                    message: format!(
                        "no release asset matches '{}' for {}/{}",
                        pattern, self.platform, self.arch
                    ),
                })
            }
            many => {
                return Err(ToolshedError::AmbiguousArtifact {
                    tool: self.tool.clone(),
                    version: version.to_string(),
                    message: format!("{} release assets match '{}'", many.len(), pattern),
                })
            }
        };

        let checksum = self.checksum_for(release, &asset.name, &version).await?;

        Ok(Resolution {
            version,
            artifact: Artifact {
                url: asset.browser_download_url.clone(),
                checksum,
                kind: self.artifact.kind,
                size: asset.size,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ArtifactKind;
    use crate::sources::http_client;
    use std::time::Duration;

    fn artifact_spec() -> ArtifactSpec {
        ArtifactSpec {
            kind: ArtifactKind::TarGz,
            asset_pattern: "demo_{version}_{os}_{arch}.tar.gz",
            checksum_asset: Some("sha256sum.txt"),
            binary_rel: "demo",
        }
    }

    fn source(api_base: &str) -> GithubReleaseSource {
        GithubReleaseSource::new(
            "demo",
            "example",
            "demo",
            artifact_spec(),
            Platform::Linux,
            Architecture::Amd64,
            http_client(Duration::from_secs(5)),
        )
        .with_api_base(api_base)
    }

    fn release_json(tag: &str, assets: &[(&str, &str)]) -> serde_json::Value {
        serde_json::json!({
            "tag_name": tag,
            "draft": false,
            "prerelease": false,
            "assets": assets
                .iter()
                .map(|(name, url)| serde_json::json!({
                    "name": name,
                    "browser_download_url": url,
                    "size": 42,
                }))
                .collect::<Vec<_>>(),
        })
    }

    #[tokio::test]
    async fn test_list_versions_newest_first() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!([
            release_json("v0.9.0", &[]),
            release_json("v0.10.0", &[]),
        ]);
        let _m = server
            .mock("GET", "/repos/example/demo/releases")
            .match_query(mockito::Matcher::Any)
            .with_body(body.to_string())
            .create_async()
            .await;

        let versions = source(&server.url()).list_versions().await.unwrap();
        assert_eq!(versions[0], Version::new("v0.10.0"));
        assert_eq!(versions[1], Version::new("v0.9.0"));
    }

    #[tokio::test]
    async fn test_resolve_latest_picks_matching_asset() {
        let mut server = mockito::Server::new_async().await;
        let artifact_url = format!("{}/dl/demo_0.10.0_linux_amd64.tar.gz", server.url());
        let sums_url = format!("{}/dl/sha256sum.txt", server.url());
        let body = serde_json::json!([release_json(
            "0.10.0",
            &[
                ("demo_0.10.0_linux_amd64.tar.gz", artifact_url.as_str()),
                ("demo_0.10.0_darwin_amd64.tar.gz", "https://example.invalid/other"),
                ("sha256sum.txt", sums_url.as_str()),
            ]
        )]);
        let _releases = server
            .mock("GET", "/repos/example/demo/releases")
            .match_query(mockito::Matcher::Any)
            .with_body(body.to_string())
            .create_async()
            .await;
        let _sums = server
            .mock("GET", "/dl/sha256sum.txt")
            .with_body("cafebabe  demo_0.10.0_linux_amd64.tar.gz\n")
            .create_async()
            .await;

        let resolution = source(&server.url())
            .resolve(&VersionSelector::Latest)
            .await
            .unwrap();

        assert_eq!(resolution.version, Version::new("0.10.0"));
        assert_eq!(resolution.artifact.url, artifact_url);
        assert_eq!(resolution.artifact.checksum.as_deref(), Some("cafebabe"));
    }

    #[tokio::test]
    async fn test_resolve_no_such_version() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!([release_json("0.10.0", &[])]);
        let _m = server
            .mock("GET", "/repos/example/demo/releases")
            .match_query(mockito::Matcher::Any)
            .with_body(body.to_string())
            .create_async()
            .await;

        let err = source(&server.url())
            .resolve(&VersionSelector::Exact(Version::new("0.1.0")))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolshedError::NoSuchVersion { .. }));
    }

    #[tokio::test]
    async fn test_resolve_ambiguous_when_nothing_matches() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!([release_json(
            "0.10.0",
            &[("demo_0.10.0_windows_amd64.zip", "https://example.invalid/x")]
        )]);
        let _m = server
            .mock("GET", "/repos/example/demo/releases")
            .match_query(mockito::Matcher::Any)
            .with_body(body.to_string())
            .create_async()
            .await;

        let err = source(&server.url())
            .resolve(&VersionSelector::Latest)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolshedError::AmbiguousArtifact { .. }));
    }

    #[tokio::test]
    async fn test_source_unavailable_on_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/repos/example/demo/releases")
            .match_query(mockito::Matcher::Any)
            .with_status(502)
            .create_async()
            .await;

        let err = source(&server.url()).list_versions().await.unwrap_err();
        assert!(matches!(err, ToolshedError::SourceUnavailable { .. }));
    }
}
