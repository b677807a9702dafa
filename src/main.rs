use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;

use mcp_gateway::config::GatewayConfig;
use mcp_gateway::logging::init_logging;
use mcp_gateway::platform_dirs;
use mcp_gateway::tools::{project_id, ApprovalTarget};
use mcp_gateway::{
    ApprovalPipeline, HostCommandExecutor, HostToolRegistry, LinePrompt, SecurityPolicy,
};

#[derive(Parser)]
#[command(name = "mcp-gateway")]
#[command(about = "Operator commands for the sandbox access gateway")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Workspace the assistant works in
    #[arg(short, long, global = true, default_value = ".")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Review new and changed staging tools and approve them
    Approve {
        /// Install into the shared `_common` directory instead of the project
        #[arg(long)]
        common: bool,
    },
    /// List the host tools visible to the workspace
    Tools,
    /// Check whether a host command would be authorized, without running it
    CheckCommand {
        command: String,
        #[arg(long)]
        dangerously: bool,
    },
    /// Print the project id of the workspace
    ProjectId,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Approve { common } => approve(&config, &cli.workspace, common),
        Commands::Tools => list_tools(&config, &cli.workspace),
        Commands::CheckCommand {
            command,
            dangerously,
        } => check_command(&config, &cli.workspace, &command, dangerously),
        Commands::ProjectId => {
            println!("{}", project_id(&cli.workspace)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// An explicit path must exist; the default location may be absent
fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (platform_dirs::config_file()?, false),
    };

    if !explicit && !path.exists() {
        debug!(path = %path.display(), "No configuration file, using defaults");
        return Ok(GatewayConfig::default());
    }

    GatewayConfig::load(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

fn approve(config: &GatewayConfig, workspace: &Path, common: bool) -> Result<ExitCode> {
    let target = if common {
        ApprovalTarget::Common
    } else {
        ApprovalTarget::Project
    };
    let pipeline = ApprovalPipeline::new(&config.host_tools, workspace)?.with_target(target);

    println!("Approving tools into {}", pipeline.target_dir().display());
    let stdin = io::stdin();
    let mut prompt = LinePrompt::new(stdin.lock(), io::stdout());
    let report = pipeline.run_interactive_sync(&mut prompt)?;

    println!();
    println!(
        "approved: {}, skipped: {}, failed: {}",
        report.approved.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for failure in &report.failed {
        println!("  {}: {}", failure.name, failure.error);
    }

    Ok(if report.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn list_tools(config: &GatewayConfig, workspace: &Path) -> Result<ExitCode> {
    let registry = HostToolRegistry::new(config.host_tools.clone(), workspace)?;
    let tools = registry.list_tools()?;

    if tools.is_empty() {
        println!("No tools found in:");
        for dir in registry.directories() {
            println!("  {} ({:?})", dir.path.display(), dir.source);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let width = tools.iter().map(|t| t.name.len()).max().unwrap_or(0);
    for tool in &tools {
        println!("{:<width$}  {:<8}  {}", tool.name, format!("{:?}", tool.source).to_lowercase(), tool.description);
        if let Some(usage) = &tool.usage {
            println!("{:<width$}  {:<8}  usage: {}", "", "", usage.replace('\n', " "));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn check_command(
    config: &GatewayConfig,
    workspace: &Path,
    command: &str,
    dangerously: bool,
) -> Result<ExitCode> {
    let policy = Arc::new(SecurityPolicy::from_config(&config.security)?);
    let executor = HostCommandExecutor::new(config.host_commands.clone(), workspace, policy);

    match executor.authorize(command, dangerously) {
        Ok(authorized) => {
            println!(
                "allowed ({:?}, rule: {})",
                authorized.authorized_by, authorized.rule
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e) if e.is_permission_denied() => {
            println!("denied: {}", e);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}
