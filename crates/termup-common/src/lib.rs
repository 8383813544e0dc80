//! ---
//! termup_section: "01-core-functionality"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Shared primitives and utilities for termup binaries."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
//! Shared primitives for the termup workspace.
//! This crate exposes configuration loading, tracing setup and atomic file
//! replacement used by the server daemon, the stores and the terminal agent.

pub mod config;
pub mod fsio;
pub mod logging;

pub use config::{
    AgentSettings, AppConfig, LoadedAppConfig, LoggingConfig, MetricsConfig, ServerConfig,
    StorageBackend, StorageConfig,
};
pub use fsio::write_atomic;
pub use logging::{init_tracing, LogFile, LogFormat, TracingGuard};
