//! ---
//! termup_section: "06-terminal-agent"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Terminal update agent."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::time::Duration;

use termup_common::config::AgentSettings;
use url::Url;

/// Name of the version file inside the install directory.
pub const VERSION_FILE_NAME: &str = "version.txt";

/// Everything one agent run needs. Passed explicitly; the agent reads no
/// process-wide state.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL of the update service.
    pub server_url: Url,
    /// Directory the package is extracted into.
    pub install_dir: PathBuf,
    /// File recording the installed version.
    pub version_file: PathBuf,
    /// Bound on the update check.
    pub request_timeout: Duration,
    /// Bound on the package download.
    pub download_timeout: Duration,
    /// Executable, relative to `install_dir`, started after a run.
    pub launcher: Option<String>,
    /// Whether the binary should start `launcher` after a run.
    pub launch_after_run: bool,
    /// Identifier carried by every update event of this terminal.
    pub terminal_id: Option<String>,
}

impl AgentConfig {
    /// Config with default timeouts and the version file inside `install_dir`.
    pub fn new(server_url: Url, install_dir: impl Into<PathBuf>) -> Self {
        let install_dir = install_dir.into();
        Self {
            server_url,
            version_file: install_dir.join(VERSION_FILE_NAME),
            install_dir,
            request_timeout: Duration::from_secs(10),
            download_timeout: Duration::from_secs(300),
            launcher: None,
            launch_after_run: false,
            terminal_id: None,
        }
    }

    /// Build from the `[agent]` configuration section.
    pub fn from_settings(settings: &AgentSettings) -> Result<Self, url::ParseError> {
        let server_url = Url::parse(&settings.server_url)?;
        Ok(Self {
            server_url,
            install_dir: settings.install_dir.clone(),
            version_file: settings.version_file_path(),
            request_timeout: settings.request_timeout,
            download_timeout: settings.download_timeout,
            launcher: settings.launcher.clone(),
            launch_after_run: settings.launch_after_run,
            terminal_id: settings.terminal_id.clone(),
        })
    }

    /// Tag update events with `terminal_id`.
    pub fn with_terminal_id(mut self, terminal_id: impl Into<String>) -> Self {
        self.terminal_id = Some(terminal_id.into());
        self
    }

    /// Override both network timeouts.
    pub fn with_timeouts(mut self, request: Duration, download: Duration) -> Self {
        self.request_timeout = request;
        self.download_timeout = download;
        self
    }

    /// Executable started by [`crate::launch`].
    pub fn with_launcher(mut self, launcher: impl Into<String>) -> Self {
        self.launcher = Some(launcher.into());
        self
    }

    /// Endpoint answering update checks.
    pub fn check_url(&self) -> Url {
        let mut url = self.server_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("check_update");
        }
        url
    }

    /// Absolute or install-relative path of the launcher, when configured.
    pub fn launcher_path(&self) -> Option<PathBuf> {
        self.launcher
            .as_deref()
            .map(|name| self.install_dir.join(Path::new(name)))
    }
}
