use crate::config::Config;
use crate::engine::{BatchReport, Engine, ToolOutcome};
use crate::error::{Result, ToolshedError};
use crate::models::{Version, VersionSelector};
use crate::registry::Registry;
use crate::utils::{confirm, print_error, print_info, print_success};
use clap::{Parser, Subcommand};
use colored::*;

#[derive(Parser)]
#[command(name = "toolshed")]
#[command(about = "Manages the command-line tools needed to interact with OpenShift clusters", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(skip)]
    config: Config,
}

#[derive(Subcommand)]
enum Commands {
    /// Install tools (all managed tools when none are named)
    Install {
        /// Tools to install
        tools: Vec<String>,

        /// Install a specific version instead of the latest release
        #[arg(short, long)]
        version: Option<String>,
    },

    /// Show the active and installed versions of each tool
    #[command(alias = "ls")]
    List {
        /// Tools to list
        tools: Vec<String>,
    },

    /// Upgrade tools to their latest release
    Upgrade {
        /// Tools to upgrade
        tools: Vec<String>,
    },

    /// Remove tools and every locally installed version of them
    Remove {
        /// Tools to remove
        tools: Vec<String>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

impl Cli {
    pub fn new(config: Config) -> Self {
        let mut cli = Self::parse();
        cli.config = config;
        cli
    }

    pub async fn run(self) -> Result<()> {
        let engine = Engine::new(self.config.clone(), Registry::builtin());

        match self.command {
            Commands::Install { ref tools, ref version } => {
                let selector = match version {
                    Some(v) => VersionSelector::Exact(Version::new(v.as_str())),
                    None => VersionSelector::Latest,
                };
                print_info("Resolving tool versions...");
                let report = engine.install(tools, selector).await?;
                render(&report)
            }
            Commands::List { ref tools } => {
                let report = engine.list(tools)?;
                render(&report)
            }
            Commands::Upgrade { ref tools } => {
                print_info("Checking for newer releases...");
                let report = engine.upgrade(tools).await?;
                render(&report)
            }
            Commands::Remove { ref tools, yes } => {
                let described = if tools.is_empty() {
                    "all managed tools".to_string()
                } else {
                    tools.join(", ")
                };
                if !yes && !confirm(&format!("Remove every installed version of {}?", described)) {
                    println!("Aborted");
                    return Ok(());
                }
                let report = engine.remove(tools).await?;
                render(&report)
            }
        }
    }
}

/// Print one status line per tool; error out when any tool failed so the
/// process exits non-zero.
fn render(report: &BatchReport) -> Result<()> {
    for tool_report in &report.reports {
        let tool = tool_report.tool.as_str();
        match &tool_report.outcome {
            ToolOutcome::Installed { version } => {
                print_success(&format!("{} {} installed", tool.cyan(), version));
            }
            ToolOutcome::Upgraded { from, to } => match from {
                Some(from) => print_success(&format!(
                    "{} upgraded from {} to {}",
                    tool.cyan(),
                    from,
                    to
                )),
                None => print_success(&format!("{} {} installed", tool.cyan(), to)),
            },
            ToolOutcome::UpToDate { version } => {
                println!("  {} already up to date ({})", tool.cyan(), version);
            }
            ToolOutcome::Removed { versions } => {
                print_success(&format!(
                    "{} removed ({} version{})",
                    tool.cyan(),
                    versions,
                    if *versions == 1 { "" } else { "s" }
                ));
            }
            ToolOutcome::Status { active, installed } => {
                let active_str = match active {
                    Some(version) => version.to_string().green().to_string(),
                    None => "not installed".dimmed().to_string(),
                };
                if installed.len() > 1 {
                    let others = installed
                        .iter()
                        .map(Version::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    println!("  {} {} (on disk: {})", tool.cyan(), active_str, others);
                } else {
                    println!("  {} {}", tool.cyan(), active_str);
                }
            }
            ToolOutcome::Failed { error } => {
                print_error(&format!("{}: {}", tool.cyan(), error));
            }
        }
    }

    let failed = report.failed();
    if failed > 0 {
        return Err(ToolshedError::BatchFailed {
            failed,
            total: report.reports.len(),
        });
    }

    Ok(())
}
