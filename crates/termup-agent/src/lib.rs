//! ---
//! termup_section: "06-terminal-agent"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Terminal update agent."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Terminal side of the update protocol. A [`TerminalAgent`] asks the service
//! whether its recorded version is current, downloads and stages the package
//! when it is not, and records the new version only once the package is in
//! place.

pub mod agent;
pub mod config;
pub mod error;
pub mod install;
pub mod launcher;
pub mod state;
pub mod transport;

pub use agent::{AgentState, RunOutcome, RunReport, TerminalAgent};
pub use config::{AgentConfig, VERSION_FILE_NAME};
pub use error::AgentError;
pub use install::{InstallSummary, Installer, StagedZipInstaller};
pub use launcher::{launch, LaunchOutcome};
pub use state::{LocalStateStore, MemoryLocalState, VersionFile};
pub use transport::{HttpTransport, UpdateTransport};
