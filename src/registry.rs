use crate::error::{Result, ToolshedError};
use crate::models::{Architecture, ArtifactKind, Platform, Version};

/// Where a tool's versions and artifacts come from.
#[derive(Debug, Clone)]
pub enum SourceConfig {
    /// GitHub releases REST API
    GithubRelease {
        owner: &'static str,
        repo: &'static str,
    },
    /// A plain HTTP mirror: version index at `{base}/index.txt`, artifacts
    /// under one directory per version
    HttpIndex { base_url: String },
}

/// How to pick and unpack the artifact for the current platform.
///
/// `asset_pattern` names the upstream file with `{version}`, `{os}` and
/// `{arch}` placeholders plus `*` wildcards; `binary_rel` is the executable's
/// path inside the finished installation directory.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub kind: ArtifactKind,
    pub asset_pattern: &'static str,
    /// Name of the sha256sum-style checksums file published alongside the
    /// artifact, when the upstream has one
    pub checksum_asset: Option<&'static str>,
    pub binary_rel: &'static str,
}

impl ArtifactSpec {
    pub fn asset_name(&self, version: &Version, platform: Platform, arch: Architecture) -> String {
        expand(self.asset_pattern, version, platform, arch)
    }

    pub fn checksum_asset_name(
        &self,
        version: &Version,
        platform: Platform,
        arch: Architecture,
    ) -> Option<String> {
        self.checksum_asset
            .map(|pattern| expand(pattern, version, platform, arch))
    }
}

fn expand(pattern: &str, version: &Version, platform: Platform, arch: Architecture) -> String {
    pattern
        .replace("{version}", version.as_str())
        .replace("{os}", platform.as_str())
        .replace("{arch}", arch.as_str())
}

/// One managed tool: identity, upstream, artifact layout. Static data,
/// loaded once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    pub source: SourceConfig,
    pub artifact: ArtifactSpec,
}

/// The fixed, ordered catalog of every tool the system can manage.
#[derive(Debug, Clone)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    pub fn new(entries: Vec<RegistryEntry>) -> Self {
        Self { entries }
    }

    /// The compiled-in catalog of cluster CLIs.
    pub fn builtin() -> Self {
        Self::new(vec![
            RegistryEntry {
                name: "oc",
                display_name: "OpenShift CLI",
                description: "Command-line interface for OpenShift clusters",
                source: SourceConfig::HttpIndex {
                    base_url: "https://mirror.openshift.com/pub/openshift-v4/clients/ocp"
                        .to_string(),
                },
                artifact: ArtifactSpec {
                    kind: ArtifactKind::TarGz,
                    asset_pattern: "openshift-client-{os}-{arch}-{version}.tar.gz",
                    checksum_asset: Some("sha256sum.txt"),
                    binary_rel: "oc",
                },
            },
            RegistryEntry {
                name: "ocm",
                display_name: "OpenShift Cluster Manager CLI",
                description: "Command-line interface for the OCM API",
                source: SourceConfig::GithubRelease {
                    owner: "openshift-online",
                    repo: "ocm-cli",
                },
                artifact: ArtifactSpec {
                    kind: ArtifactKind::Binary,
                    asset_pattern: "ocm-{os}-{arch}",
                    checksum_asset: Some("ocm-{os}-{arch}.sha256"),
                    binary_rel: "ocm",
                },
            },
            RegistryEntry {
                name: "osdctl",
                display_name: "OSD CLI",
                description: "CLI for managing OpenShift Dedicated clusters",
                source: SourceConfig::GithubRelease {
                    owner: "openshift",
                    repo: "osdctl",
                },
                artifact: ArtifactSpec {
                    kind: ArtifactKind::TarGz,
                    asset_pattern: "osdctl_{version}_{os}_{arch}.tar.gz",
                    checksum_asset: Some("sha256sum.txt"),
                    binary_rel: "osdctl",
                },
            },
            RegistryEntry {
                name: "rosa",
                display_name: "ROSA CLI",
                description: "CLI for Red Hat OpenShift Service on AWS",
                source: SourceConfig::GithubRelease {
                    owner: "openshift",
                    repo: "rosa",
                },
                artifact: ArtifactSpec {
                    kind: ArtifactKind::TarGz,
                    asset_pattern: "rosa_{os}_{arch}.tar.gz",
                    checksum_asset: Some("rosa_{os}_{arch}.tar.gz.sha256"),
                    binary_rel: "rosa",
                },
            },
            RegistryEntry {
                name: "backplane",
                display_name: "Backplane CLI",
                description: "CLI for backplane access to managed clusters",
                source: SourceConfig::GithubRelease {
                    owner: "openshift",
                    repo: "backplane-cli",
                },
                artifact: ArtifactSpec {
                    kind: ArtifactKind::TarGz,
                    asset_pattern: "ocm-backplane_{version}_{os}_{arch}.tar.gz",
                    checksum_asset: Some("checksums.txt"),
                    binary_rel: "ocm-backplane",
                },
            },
            RegistryEntry {
                name: "yq",
                display_name: "yq",
                description: "Portable command-line YAML processor",
                source: SourceConfig::GithubRelease {
                    owner: "mikefarah",
                    repo: "yq",
                },
                artifact: ArtifactSpec {
                    kind: ArtifactKind::Binary,
                    asset_pattern: "yq_{os}_{arch}",
                    checksum_asset: None,
                    binary_rel: "yq",
                },
            },
        ])
    }

    pub fn lookup(&self, name: &str) -> Result<&RegistryEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| ToolshedError::UnknownTool(name.to_string()))
    }

    /// Every managed tool name, in catalog order.
    pub fn all(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.name.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
