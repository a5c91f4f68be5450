use crate::error::{Result, ToolshedError};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub root_dir: PathBuf,

    #[serde(skip)]
    pub tools_dir: PathBuf,

    #[serde(skip)]
    pub staging_dir: PathBuf,

    #[serde(skip)]
    pub config_file: PathBuf,

    /// Whether to verify published checksums when downloading
    pub verify_checksums: bool,

    /// Retry budget for transient download failures
    pub download_retries: u32,

    /// Per-request timeout for version listing and artifact downloads
    pub fetch_timeout_secs: u64,

    /// Upper bound on tools processed concurrently in a batch
    pub max_parallel: usize,
}

impl Default for Config {
    fn default() -> Self {
        let root_dir = Self::default_root_dir();

        Self {
            tools_dir: root_dir.join("tools"),
            staging_dir: root_dir.join("staging"),
            config_file: root_dir.join("config.toml"),
            root_dir,
            verify_checksums: true,
            download_retries: 3,
            fetch_timeout_secs: 300,
            max_parallel: 4,
        }
    }
}

impl Config {
    fn default_root_dir() -> PathBuf {
        // First check TOOLSHED_DIR environment variable
        if let Ok(dir) = std::env::var("TOOLSHED_DIR") {
            return PathBuf::from(shellexpand::tilde(&dir).to_string());
        }

        // Then use platform-specific directory
        if let Some(proj_dirs) = ProjectDirs::from("", "", "toolshed") {
            return proj_dirs.data_dir().to_path_buf();
        }

        // Fallback to ~/.toolshed
        PathBuf::from(shellexpand::tilde("~/.toolshed").to_string())
    }

    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.root_dir)?;
        std::fs::create_dir_all(&config.tools_dir)?;
        std::fs::create_dir_all(&config.staging_dir)?;

        // Load config file if it exists
        if config.config_file.exists() {
            let contents = std::fs::read_to_string(&config.config_file)?;
            let file_config: Config = toml::from_str(&contents)?;

            config.verify_checksums = file_config.verify_checksums;
            config.download_retries = file_config.download_retries;
            config.fetch_timeout_secs = file_config.fetch_timeout_secs;
            config.max_parallel = file_config.max_parallel.max(1);
        } else {
            // Create default config file
            config.save()?;
        }

        Ok(config)
    }

    /// Build a Config rooted at an explicit directory, creating the layout
    /// underneath it. Used by tests and by TOOLSHED_DIR overrides.
    pub fn with_root(root_dir: PathBuf) -> Result<Self> {
        let config = Self {
            tools_dir: root_dir.join("tools"),
            staging_dir: root_dir.join("staging"),
            config_file: root_dir.join("config.toml"),
            root_dir,
            ..Self::default()
        };

        std::fs::create_dir_all(&config.root_dir)?;
        std::fs::create_dir_all(&config.tools_dir)?;
        std::fs::create_dir_all(&config.staging_dir)?;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ToolshedError::ConfigError(e.to_string()))?;

        std::fs::write(&self.config_file, contents)?;
        Ok(())
    }

    /// Directory holding every installed version of one tool plus its
    /// active symlink.
    pub fn tool_dir(&self, tool: &str) -> PathBuf {
        self.tools_dir.join(tool)
    }
}
