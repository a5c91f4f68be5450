pub mod github;
pub mod index;

use crate::error::Result;
use crate::models::{Architecture, Platform, Resolution, Version, VersionSelector};
use crate::registry::{RegistryEntry, SourceConfig};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

pub use github::GithubReleaseSource;
pub use index::HttpIndexSource;

/// Knows how to list and resolve released versions of one tool.
///
/// Implementations perform network calls only; they never touch the
/// installation tree.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Available versions, newest first.
    async fn list_versions(&self) -> Result<Vec<Version>>;

    /// Resolve a selector to a concrete version and its download artifact
    /// for the current platform.
    async fn resolve(&self, selector: &VersionSelector) -> Result<Resolution>;
}

/// Build the source implementation a registry entry calls for.
pub fn for_entry(entry: &RegistryEntry, timeout: Duration) -> Result<Box<dyn VersionSource>> {
    let platform = Platform::current()?;
    let arch = Architecture::current()?;
    let client = http_client(timeout);

    Ok(match &entry.source {
        SourceConfig::GithubRelease { owner, repo } => Box::new(GithubReleaseSource::new(
            entry.name,
            owner,
            repo,
            entry.artifact.clone(),
            platform,
            arch,
            client,
        )),
        SourceConfig::HttpIndex { base_url } => Box::new(HttpIndexSource::new(
            entry.name,
            base_url,
            entry.artifact.clone(),
            platform,
            arch,
            client,
        )),
    })
}

pub(crate) fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ))
        .timeout(timeout)
        .build()
        .unwrap()
}

/// Match an asset name against a pattern where `*` spans any run of
/// characters. Patterns without `*` require an exact match.
pub(crate) fn wildcard_match(pattern: &str, candidate: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == candidate;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = candidate;

    if !rest.starts_with(parts[0]) {
        return false;
    }
    rest = &rest[parts[0].len()..];

    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }

    rest.ends_with(parts[parts.len() - 1])
}

/// Pull the hex digest for `asset_name` out of a checksums file.
///
/// Handles both the `sha256sum` format (`<digest>  <file>`, `*` binary
/// marker tolerated) and single-digest files containing only the hash.
pub(crate) fn digest_for_asset(checksums: &str, asset_name: &str) -> Option<String> {
    let mut single_digest = None;

    for line in checksums.lines() {
        let mut fields = line.split_whitespace();
        let digest = match fields.next() {
            Some(d) => d,
            None => continue,
        };

        match fields.next() {
            Some(name) => {
                if name.trim_start_matches('*') == asset_name {
                    return Some(digest.to_ascii_lowercase());
                }
            }
            None => single_digest = Some(digest.to_ascii_lowercase()),
        }
    }

    // A file with exactly one bare digest belongs to the one asset it sits
    // next to.
    single_digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_match_exact() {
        assert!(wildcard_match("ocm-linux-amd64", "ocm-linux-amd64"));
        assert!(!wildcard_match("ocm-linux-amd64", "ocm-linux-arm64"));
    }

    #[test]
    fn test_wildcard_match_star() {
        assert!(wildcard_match("osdctl_*_linux_amd64.tar.gz", "osdctl_0.25.0_linux_amd64.tar.gz"));
        assert!(!wildcard_match("osdctl_*_linux_amd64.tar.gz", "osdctl_0.25.0_linux_amd64.zip"));
        assert!(wildcard_match("*", "anything"));
    }

    #[test]
    fn test_digest_for_asset_sha256sum_format() {
        let text = "abc123  rosa_linux_amd64.tar.gz\ndef456  rosa_darwin_amd64.tar.gz\n";
        assert_eq!(
            digest_for_asset(text, "rosa_darwin_amd64.tar.gz").as_deref(),
            Some("def456")
        );
        assert_eq!(digest_for_asset(text, "rosa_windows_amd64.zip"), None);
    }

    #[test]
    fn test_digest_for_asset_binary_marker() {
        let text = "ABC123 *ocm-linux-amd64\n";
        assert_eq!(
            digest_for_asset(text, "ocm-linux-amd64").as_deref(),
            Some("abc123")
        );
    }

    #[test]
    fn test_digest_for_asset_bare_digest() {
        assert_eq!(
            digest_for_asset("deadbeef\n", "whatever.tar.gz").as_deref(),
            Some("deadbeef")
        );
    }
}
