use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolshedError {
    #[error("Upstream source for {tool} is unavailable: {message}")]
    SourceUnavailable { tool: String, message: String },

    #[error("No such version {version} for {tool}")]
    NoSuchVersion { tool: String, version: String },

    #[error("Ambiguous artifact for {tool} {version}: {message}")]
    AmbiguousArtifact {
        tool: String,
        version: String,
        message: String,
    },

    #[error("Failed to download {url}: {message}")]
    FetchFailed { url: String, message: String },

    #[error("Checksum verification failed for {url}: expected {expected}, got {actual}")]
    IntegrityError {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to place {tool} {version}: {message}")]
    PlacementError {
        tool: String,
        version: String,
        message: String,
    },

    #[error("Failed to activate {tool} {version}: {message}")]
    ActivationError {
        tool: String,
        version: String,
        message: String,
    },

    #[error("{0} is not installed")]
    NotInstalled(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{tool} {version} is the active version; deactivate it before removing")]
    ActiveVersionInUse { tool: String, version: String },

    #[error("{failed} of {total} tools failed")]
    BatchFailed { failed: usize, total: usize },

    #[error("Unsupported platform: {os} {arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ToolshedError>;
