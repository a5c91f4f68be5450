use crate::activation;
use crate::config::Config;
use crate::download::Downloader;
use crate::error::{Result, ToolshedError};
use crate::layout::ToolLayout;
use crate::models::{Version, VersionSelector};
use crate::registry::{Registry, RegistryEntry};
use crate::sources;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// What happened to one tool during a batch operation.
#[derive(Debug)]
pub enum ToolOutcome {
    Installed { version: Version },
    Upgraded { from: Option<Version>, to: Version },
    UpToDate { version: Version },
    Removed { versions: usize },
    Status {
        active: Option<Version>,
        installed: Vec<Version>,
    },
    Failed { error: ToolshedError },
}

#[derive(Debug)]
pub struct ToolReport {
    pub tool: String,
    pub outcome: ToolOutcome,
}

impl ToolReport {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Failed { .. })
    }
}

/// Per-tool results of one engine operation, in selection order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub reports: Vec<ToolReport>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.is_failure()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

#[derive(Clone)]
enum Operation {
    Install(VersionSelector),
    Upgrade,
    Remove,
}

/// Orchestrates registry iteration: resolves versions, fetches artifacts,
/// places and activates installations, and aggregates per-tool results.
///
/// Errors are tool-scoped; one tool's failure never aborts its siblings.
pub struct Engine {
    config: Arc<Config>,
    registry: Registry,
    downloader: Arc<Downloader>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Engine {
    pub fn new(config: Config, registry: Registry) -> Self {
        let downloader = Arc::new(Downloader::new(
            Duration::from_secs(config.fetch_timeout_secs),
            config.download_retries,
            config.verify_checksums,
        ));

        Self {
            config: Arc::new(config),
            registry,
            downloader,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Install the selected version of each named tool (all tools when
    /// `names` is empty). Successes are never rolled back on sibling
    /// failure.
    pub async fn install(&self, names: &[String], selector: VersionSelector) -> Result<BatchReport> {
        let entries = self.select(names)?;
        Ok(self.run_batch(entries, Operation::Install(selector)).await)
    }

    /// Bring each named tool to its latest release, skipping the artifact
    /// download entirely when the active version is already current.
    pub async fn upgrade(&self, names: &[String]) -> Result<BatchReport> {
        let entries = self.select(names)?;
        Ok(self.run_batch(entries, Operation::Upgrade).await)
    }

    /// Deactivate and delete every installed version of each named tool.
    pub async fn remove(&self, names: &[String]) -> Result<BatchReport> {
        let entries = self.select(names)?;
        Ok(self.run_batch(entries, Operation::Remove).await)
    }

    /// Report the active and installed versions of each named tool.
    /// Touches only the local filesystem.
    pub fn list(&self, names: &[String]) -> Result<BatchReport> {
        let entries = self.select(names)?;
        let mut report = BatchReport::default();

        for entry in entries {
            let layout = ToolLayout::for_entry(&self.config, &entry);
            let outcome = match local_status(&layout) {
                Ok(outcome) => outcome,
                Err(error) => ToolOutcome::Failed { error },
            };
            report.reports.push(ToolReport {
                tool: entry.name.to_string(),
                outcome,
            });
        }

        Ok(report)
    }

    /// Resolve the tool set an operation applies to. An explicitly named
    /// unknown tool is a usage mistake and fails the whole invocation
    /// before any tool is touched.
    fn select(&self, names: &[String]) -> Result<Vec<RegistryEntry>> {
        if names.is_empty() {
            return self
                .registry
                .all()
                .iter()
                .map(|name| self.registry.lookup(name).cloned())
                .collect();
        }

        names
            .iter()
            .map(|name| self.registry.lookup(name).cloned())
            .collect()
    }

    fn tool_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        locks.entry(name.to_string()).or_default().clone()
    }

    async fn run_batch(&self, entries: Vec<RegistryEntry>, op: Operation) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel.max(1)));
        let mut join_set = JoinSet::new();

        for (idx, entry) in entries.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let config = Arc::clone(&self.config);
            let downloader = Arc::clone(&self.downloader);
            let lock = self.tool_lock(entry.name);
            let op = op.clone();

            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");
                let _guard = lock.lock().await;

                let tool = entry.name.to_string();
                let outcome = match run_tool(&config, &downloader, entry, op).await {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        tracing::error!(tool = %tool, error = %error, "operation failed");
                        ToolOutcome::Failed { error }
                    }
                };

                (idx, ToolReport { tool, outcome })
            });
        }

        let mut indexed = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(pair) => indexed.push(pair),
                Err(e) => tracing::error!(error = %e, "tool task aborted"),
            }
        }

        indexed.sort_by_key(|(idx, _)| *idx);
        BatchReport {
            reports: indexed.into_iter().map(|(_, report)| report).collect(),
        }
    }
}

fn local_status(layout: &ToolLayout) -> Result<ToolOutcome> {
    let active = activation::active_version(layout)?;
    let installed = layout
        .installed_versions()?
        .into_iter()
        .map(|installation| installation.version)
        .collect();

    Ok(ToolOutcome::Status { active, installed })
}

async fn run_tool(
    config: &Config,
    downloader: &Downloader,
    entry: RegistryEntry,
    op: Operation,
) -> Result<ToolOutcome> {
    let layout = ToolLayout::for_entry(config, &entry);

    match op {
        Operation::Remove => {
            let versions = layout.remove_all()?;
            Ok(ToolOutcome::Removed { versions })
        }
        Operation::Install(selector) => {
            install_tool(config, downloader, &entry, &layout, selector, false).await
        }
        Operation::Upgrade => {
            install_tool(
                config,
                downloader,
                &entry,
                &layout,
                VersionSelector::Latest,
                true,
            )
            .await
        }
    }
}

async fn install_tool(
    config: &Config,
    downloader: &Downloader,
    entry: &RegistryEntry,
    layout: &ToolLayout,
    selector: VersionSelector,
    upgrading: bool,
) -> Result<ToolOutcome> {
    let source = sources::for_entry(entry, Duration::from_secs(config.fetch_timeout_secs))?;
    let resolution = source.resolve(&selector).await?;
    let active = activation::active_version(layout)?;

    // Already on the resolved version: nothing to download, the active
    // link stays exactly as it is
    if active.as_ref() == Some(&resolution.version)
        && layout.version_dir(&resolution.version).is_dir()
    {
        return Ok(if upgrading {
            ToolOutcome::UpToDate {
                version: resolution.version,
            }
        } else {
            ToolOutcome::Installed {
                version: resolution.version,
            }
        });
    }

    let verified = downloader.fetch(&resolution.artifact, &config.staging_dir).await?;
    let installation = layout.place(&verified, &resolution.version)?;
    activation::activate(layout, &installation)?;

    Ok(if upgrading {
        ToolOutcome::Upgraded {
            from: active,
            to: resolution.version,
        }
    } else {
        ToolOutcome::Installed {
            version: resolution.version,
        }
    })
}
