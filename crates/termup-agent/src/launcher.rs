//! ---
//! termup_section: "06-terminal-agent"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Terminal update agent."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{info, warn};

use crate::config::AgentConfig;

/// What happened when handing control to the installed application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// No launcher is configured.
    Disabled,
    /// The executable does not exist in the install directory.
    Missing,
    /// The executable was started with this process id.
    Started(u32),
    /// The executable exists but could not be started.
    Failed(String),
}

/// Start the configured launcher detached from the agent.
///
/// Never fails the run: problems are logged and reported in the outcome.
pub fn launch(config: &AgentConfig) -> LaunchOutcome {
    let Some(executable) = config.launcher_path() else {
        return LaunchOutcome::Disabled;
    };
    launch_executable(&executable, &config.install_dir)
}

fn launch_executable(executable: &Path, working_dir: &Path) -> LaunchOutcome {
    if !executable.is_file() {
        warn!(path = %executable.display(), "launcher executable not found");
        return LaunchOutcome::Missing;
    }
    match Command::new(executable)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => {
            info!(path = %executable.display(), pid = child.id(), "application started");
            LaunchOutcome::Started(child.id())
        }
        Err(err) => {
            warn!(path = %executable.display(), error = %err, "failed to start application");
            LaunchOutcome::Failed(err.to_string())
        }
    }
}
