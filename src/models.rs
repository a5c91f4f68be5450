use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

/// A release identifier as published by the tool's upstream.
///
/// Versions are opaque tokens ("v1.2.3", "4.14.9", "0.1.0-alpha.2") compared
/// segment-wise: a leading `v` is ignored, dot-separated numeric segments
/// compare numerically, everything else falls back to string order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version {
    raw: String,
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Text(String),
    Number(u64),
}

impl Version {
    pub fn new<T: Into<String>>(raw: T) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn segments(&self) -> Vec<Segment> {
        let trimmed = self
            .raw
            .trim()
            .strip_prefix(['v', 'V'])
            .unwrap_or(self.raw.trim());

        trimmed
            .split('.')
            .map(|part| match part.parse::<u64>() {
                Ok(n) => Segment::Number(n),
                Err(_) => Segment::Text(part.to_ascii_lowercase()),
            })
            .collect()
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.segments().cmp(&other.segments())
    }
}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.segments().hash(state);
    }
}

impl std::hash::Hash for Segment {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Segment::Text(s) => s.hash(state),
            Segment::Number(n) => n.hash(state),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl From<&str> for Version {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Which version an install operation should target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
    Latest,
    Exact(Version),
}

/// Supported platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mac,
    Linux,
    Windows,
}

impl Platform {
    pub fn current() -> crate::error::Result<Self> {
        match std::env::consts::OS {
            "macos" => Ok(Platform::Mac),
            "linux" => Ok(Platform::Linux),
            "windows" => Ok(Platform::Windows),
            os => Err(crate::error::ToolshedError::UnsupportedPlatform {
                os: os.to_string(),
                arch: std::env::consts::ARCH.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Platform::Mac => "darwin",
            Platform::Linux => "linux",
            Platform::Windows => "windows",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Supported architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Arm64,
}

impl Architecture {
    pub fn current() -> crate::error::Result<Self> {
        match std::env::consts::ARCH {
            "x86_64" | "amd64" => Ok(Architecture::Amd64),
            "aarch64" | "arm64" => Ok(Architecture::Arm64),
            arch => Err(crate::error::ToolshedError::UnsupportedPlatform {
                os: std::env::consts::OS.to_string(),
                arch: arch.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Architecture::Amd64 => "amd64",
            Architecture::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a downloaded artifact turns into a binary on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// The artifact is the executable itself
    Binary,
    /// Gzipped tarball containing the executable
    TarGz,
    /// Zip archive containing the executable
    Zip,
}

/// A downloadable artifact for one version of one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub url: String,
    /// Hex-encoded sha256 digest published by the upstream, when it has one
    pub checksum: Option<String>,
    pub kind: ArtifactKind,
    pub size: Option<u64>,
}

/// The outcome of resolving a version selector against an upstream.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub version: Version,
    pub artifact: Artifact,
}

/// An immutable on-disk instance of one version of one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Installation {
    pub tool: String,
    pub version: Version,
    pub install_path: PathBuf,
    pub binary_path: PathBuf,
    pub installed_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering_numeric() {
        let a = Version::new("4.9.0");
        let b = Version::new("4.14.0");
        assert!(a < b, "numeric segments must not compare as strings");
    }

    #[test]
    fn test_version_v_prefix_ignored() {
        assert_eq!(Version::new("v1.2.3"), Version::new("1.2.3"));
        assert!(Version::new("v0.10.0") > Version::new("0.9.1"));
    }

    #[test]
    fn test_version_longer_wins_on_equal_prefix() {
        assert!(Version::new("4.14") < Version::new("4.14.1"));
    }

    #[test]
    fn test_version_display_keeps_raw() {
        assert_eq!(Version::new("v4.14.9").to_string(), "v4.14.9");
    }

    #[test]
    fn test_newest_first_sort() {
        let mut versions = vec![
            Version::new("1.2.10"),
            Version::new("1.2.2"),
            Version::new("2.0.0"),
        ];
        versions.sort_by(|a, b| b.cmp(a));
        assert_eq!(versions[0].as_str(), "2.0.0");
        assert_eq!(versions[1].as_str(), "1.2.10");
    }
}
