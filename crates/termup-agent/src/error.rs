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

/// Failures that abort an agent run. None of them touch the recorded version.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The server has no published manifest.
    #[error("no update manifest published on the server")]
    ManifestNotFound,
    /// The server was unreachable, timed out or answered with an error status.
    #[error("transport failure: {0}")]
    TransportFailure(String),
    /// The downloaded package is not a usable zip archive.
    #[error("corrupt archive: {0}")]
    CorruptArchive(String),
    /// The local installation state could not be read or written.
    #[error("local state error at {path}: {source}")]
    State {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying IO failure.
        source: std::io::Error,
    },
    /// Extracted files could not be moved into the install directory.
    #[error("failed to install into {path}: {source}")]
    Install {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying IO failure.
        source: std::io::Error,
    },
    /// The server announced an update without the data needed to fetch it.
    #[error("invalid update response: {0}")]
    InvalidResponse(String),
}

impl AgentError {
    pub(crate) fn state(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::State {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn install(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Install {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::TransportFailure(format!("request timed out: {err}"))
        } else {
            Self::TransportFailure(err.to_string())
        }
    }
}
