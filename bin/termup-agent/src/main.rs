//! ---
//! termup_section: "06-terminal-agent"
//! termup_subsection: "binary"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Binary entrypoint for the terminal update agent."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use termup_agent::{launch, AgentConfig, LaunchOutcome, RunOutcome, TerminalAgent};
use termup_common::config::AppConfig;
use termup_common::logging::init_tracing;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Terminal update agent: check, download, install, launch",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, env = "TERMUP_SERVER_URL", help = "Override agent.server_url")]
    server_url: Option<String>,

    #[arg(long, value_name = "DIR", help = "Override agent.install_dir")]
    install_dir: Option<PathBuf>,

    #[arg(long, env = "TERMUP_TERMINAL_ID", help = "Override agent.terminal_id")]
    terminal_id: Option<String>,

    #[arg(long, help = "Do not start the application after the run")]
    no_launch: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run one update cycle (default)")]
    Run,
    #[command(about = "Print the installed version without contacting the server")]
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut candidates = Vec::new();
    if let Some(path) = &cli.config {
        candidates.push(path.clone());
    }
    candidates.push(PathBuf::from("termup-agent.toml"));
    candidates.push(PathBuf::from("configs/termup.toml"));

    let mut config = AppConfig::load_with_source(&candidates)?.config;
    if let Some(url) = cli.server_url {
        config.agent.server_url = url;
    }
    if let Some(dir) = cli.install_dir {
        config.agent.install_dir = dir;
        config.agent.version_file = None;
    }
    if let Some(terminal_id) = cli.terminal_id {
        config.agent.terminal_id = Some(terminal_id);
    }
    config
        .validate()
        .context("configuration invalid after command-line overrides")?;
    let agent_config =
        AgentConfig::from_settings(&config.agent).context("invalid agent.server_url")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Status => {
            let agent = TerminalAgent::new(agent_config)?;
            println!(
                "Installed: {}\nInstall dir: {}\nServer: {}",
                agent.installed_version().await?,
                agent.config().install_dir.display(),
                agent.config().server_url
            );
            Ok(())
        }
        Commands::Run => {
            let _log_guard = init_tracing("termup-agent", &config.agent_logging())?;
            let launch_after = agent_config.launch_after_run && !cli.no_launch;
            let agent = TerminalAgent::new(agent_config)?;
            let result = agent.run().await;
            match &result {
                Ok(report) => match &report.outcome {
                    RunOutcome::UpToDate { version } => {
                        info!(version = %version, "no update available");
                    }
                    RunOutcome::Updated { from, to } => {
                        info!(from = %from, to = %to, "terminal updated");
                    }
                },
                Err(err) => error!(error = %err, "update run failed; installed version unchanged"),
            }

            // The previously installed application is still usable after a failed run.
            if launch_after {
                if let LaunchOutcome::Failed(reason) = launch(agent.config()) {
                    error!(reason = %reason, "application launch failed");
                }
            }
            result.map(|_| ()).map_err(Into::into)
        }
    }
}
