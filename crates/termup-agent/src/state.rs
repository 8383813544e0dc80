//! ---
//! termup_section: "06-terminal-agent"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Terminal update agent."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use termup_common::write_atomic;
use termup_manifest::Version;
use tokio::fs;
use tracing::warn;

use crate::AgentError;

/// Persistence of the installed version.
#[async_trait]
pub trait LocalStateStore: Send + Sync {
    /// Installed version, or `None` when nothing has been recorded.
    async fn load(&self) -> Result<Option<Version>, AgentError>;

    /// Record `version` as installed.
    async fn save(&self, version: &Version) -> Result<(), AgentError>;
}

/// Plain text file holding the version string.
#[derive(Debug, Clone)]
pub struct VersionFile {
    path: PathBuf,
}

impl VersionFile {
    /// Store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the version file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LocalStateStore for VersionFile {
    async fn load(&self) -> Result<Option<Version>, AgentError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AgentError::state(&self.path)(err)),
        };
        match Version::new(&raw) {
            Ok(version) => Ok(Some(version)),
            Err(_) => {
                warn!(path = %self.path.display(), "version file is empty; treating as not installed");
                Ok(None)
            }
        }
    }

    async fn save(&self, version: &Version) -> Result<(), AgentError> {
        let path = self.path.clone();
        let contents = version.as_str().as_bytes().to_vec();
        tokio::task::spawn_blocking(move || write_atomic(&path, &contents))
            .await
            .map_err(|join| std::io::Error::other(join.to_string()))
            .and_then(|written| written)
            .map_err(AgentError::state(&self.path))
    }
}

/// In-memory state for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLocalState {
    version: Mutex<Option<Version>>,
}

impl MemoryLocalState {
    /// Empty state, as on a fresh terminal.
    pub fn new() -> Self {
        Self::default()
    }

    /// State with `version` already installed.
    pub fn with_version(version: Version) -> Self {
        Self {
            version: Mutex::new(Some(version)),
        }
    }

    /// Currently recorded version.
    pub fn current(&self) -> Option<Version> {
        self.version.lock().clone()
    }
}

#[async_trait]
impl LocalStateStore for MemoryLocalState {
    async fn load(&self) -> Result<Option<Version>, AgentError> {
        Ok(self.current())
    }

    async fn save(&self, version: &Version) -> Result<(), AgentError> {
        *self.version.lock() = Some(version.clone());
        Ok(())
    }
}
