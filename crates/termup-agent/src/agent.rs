//! ---
//! termup_section: "06-terminal-agent"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Terminal update agent state machine."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::fmt;

use termup_logging::{log_update_event, UpdateContext, UpdateEventOutcome};
use termup_manifest::{Version, DEFAULT_LOCAL_VERSION};
use tracing::info;

use crate::config::AgentConfig;
use crate::install::{Installer, StagedZipInstaller};
use crate::state::{LocalStateStore, VersionFile};
use crate::transport::{HttpTransport, UpdateTransport};
use crate::AgentError;

/// Steps of one agent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// Not running.
    Idle,
    /// Asking the server for the published version.
    Checking,
    /// The installed version matches the published one.
    UpToDate,
    /// Fetching the package.
    Downloading,
    /// Unpacking the package into the install directory.
    Extracting,
    /// Recording the new version.
    Committing,
    /// The run was aborted; the recorded version is unchanged.
    Failed,
}

impl AgentState {
    /// Stable label used in log events.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Checking => "checking",
            AgentState::UpToDate => "up_to_date",
            AgentState::Downloading => "downloading",
            AgentState::Extracting => "extracting",
            AgentState::Committing => "committing",
            AgentState::Failed => "failed",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing to do.
    UpToDate {
        /// Installed version.
        version: String,
    },
    /// A package was applied and recorded.
    Updated {
        /// Version installed before the run.
        from: String,
        /// Version installed now.
        to: Version,
    },
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Version recorded when the run started.
    pub previous_version: String,
    /// Every state entered, starting with [`AgentState::Idle`].
    pub transitions: Vec<AgentState>,
}

impl RunReport {
    /// True when a package was applied.
    pub fn updated(&self) -> bool {
        matches!(self.outcome, RunOutcome::Updated { .. })
    }
}

struct Walk<'a> {
    terminal: Option<&'a str>,
    installed: &'a str,
    target: Option<String>,
    transitions: Vec<AgentState>,
}

impl<'a> Walk<'a> {
    fn new(terminal: Option<&'a str>, installed: &'a str) -> Self {
        Self {
            terminal,
            installed,
            target: None,
            transitions: vec![AgentState::Idle],
        }
    }

    fn enter(&mut self, state: AgentState, message: &str) {
        self.transitions.push(state);
        let outcome = if state == AgentState::Failed {
            UpdateEventOutcome::Fault
        } else {
            UpdateEventOutcome::Success
        };
        let mut ctx = UpdateContext::new().with_installed(self.installed);
        if let Some(terminal) = self.terminal {
            ctx = ctx.with_terminal(terminal);
        }
        if let Some(target) = self.target.as_deref() {
            ctx = ctx.with_target(target);
        }
        log_update_event(
            Some(&ctx),
            &format!("agent.{}", state.as_str()),
            message,
            outcome,
        );
    }
}

/// Terminal-side update loop: check, download, extract, commit.
pub struct TerminalAgent<S = VersionFile, T = HttpTransport, I = StagedZipInstaller> {
    config: AgentConfig,
    state: S,
    transport: T,
    installer: I,
}

impl TerminalAgent {
    /// Agent with the file-backed state, HTTP transport and zip installer.
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        let transport = HttpTransport::new(&config)?;
        let state = VersionFile::new(config.version_file.clone());
        let installer = StagedZipInstaller::new().protecting(config.version_file.clone());
        Ok(Self::with_parts(config, state, transport, installer))
    }
}

impl<S, T, I> TerminalAgent<S, T, I>
where
    S: LocalStateStore,
    T: UpdateTransport,
    I: Installer,
{
    /// Agent assembled from explicit collaborators.
    pub fn with_parts(config: AgentConfig, state: S, transport: T, installer: I) -> Self {
        Self {
            config,
            state,
            transport,
            installer,
        }
    }

    /// Configuration the agent runs with.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Local state collaborator.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Installed version, or [`DEFAULT_LOCAL_VERSION`] when none is recorded.
    pub async fn installed_version(&self) -> Result<String, AgentError> {
        Ok(self
            .state
            .load()
            .await?
            .map(String::from)
            .unwrap_or_else(|| DEFAULT_LOCAL_VERSION.to_owned()))
    }

    /// Perform one update cycle.
    ///
    /// The new version is recorded only after the package has been fully
    /// installed. Any failure leaves the previous version recorded, so the
    /// next run retries the same update.
    pub async fn run(&self) -> Result<RunReport, AgentError> {
        tokio::fs::create_dir_all(&self.config.install_dir)
            .await
            .map_err(AgentError::state(&self.config.install_dir))?;
        let installed = self.installed_version().await?;
        info!(
            installed = %installed,
            server = %self.config.server_url,
            "checking for updates"
        );

        let mut walk = Walk::new(self.config.terminal_id.as_deref(), &installed);
        match self.walk(&mut walk).await {
            Ok(outcome) => {
                walk.enter(AgentState::Idle, "run complete");
                Ok(RunReport {
                    outcome,
                    previous_version: installed.clone(),
                    transitions: walk.transitions,
                })
            }
            Err(err) => {
                walk.enter(AgentState::Failed, &err.to_string());
                Err(err)
            }
        }
    }

    async fn walk(&self, walk: &mut Walk<'_>) -> Result<RunOutcome, AgentError> {
        walk.enter(AgentState::Checking, "querying update service");
        let response = self.transport.check(walk.installed).await?;
        if !response.update_available {
            walk.enter(AgentState::UpToDate, "installed version is current");
            return Ok(RunOutcome::UpToDate {
                version: walk.installed.to_owned(),
            });
        }

        let latest = response.latest_version.ok_or_else(|| {
            AgentError::InvalidResponse("update announced without latest_version".into())
        })?;
        let latest = Version::new(&latest)
            .map_err(|err| AgentError::InvalidResponse(format!("latest_version: {err}")))?;
        let url = response.url.ok_or_else(|| {
            AgentError::InvalidResponse("update announced without url".into())
        })?;
        walk.target = Some(latest.to_string());

        walk.enter(AgentState::Downloading, &format!("fetching {url}"));
        let package = self.transport.download(&url).await?;

        walk.enter(
            AgentState::Extracting,
            &format!("applying {} byte package", package.len()),
        );
        let summary = self
            .installer
            .install(package, &self.config.install_dir)
            .await?;

        walk.enter(
            AgentState::Committing,
            &format!("{} files installed; recording version", summary.files),
        );
        self.state.save(&latest).await?;

        Ok(RunOutcome::Updated {
            from: walk.installed.to_owned(),
            to: latest,
        })
    }
}
