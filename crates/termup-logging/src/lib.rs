//! ---
//! termup_section: "01-core-functionality"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Structured logging adapters for update lifecycle events."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Baseline subscriber for short-lived CLIs and a helper emitting uniform
//! update lifecycle events.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

/// Initialize a baseline tracing subscriber suitable for interactive tools.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Structured context attached to update lifecycle events.
#[derive(Debug, Default, Clone)]
pub struct UpdateContext<'a> {
    /// Terminal or host identifier.
    pub terminal: Option<&'a str>,
    /// Version installed when the event happened.
    pub installed: Option<&'a str>,
    /// Version being moved to, when known.
    pub target: Option<&'a str>,
}

impl<'a> UpdateContext<'a> {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a terminal identifier.
    pub fn with_terminal(mut self, terminal: &'a str) -> Self {
        self.terminal = Some(terminal);
        self
    }

    /// Attach the installed version.
    pub fn with_installed(mut self, installed: &'a str) -> Self {
        self.installed = Some(installed);
        self
    }

    /// Attach the target version.
    pub fn with_target(mut self, target: &'a str) -> Self {
        self.target = Some(target);
        self
    }
}

/// Outcome recorded with an update lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEventOutcome {
    /// The step completed.
    Success,
    /// The step failed and the run was aborted.
    Fault,
}

impl UpdateEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            UpdateEventOutcome::Success => "success",
            UpdateEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized update event with a success/fault outcome.
pub fn log_update_event(
    context: Option<&UpdateContext>,
    event: &str,
    message: &str,
    outcome: UpdateEventOutcome,
) {
    let default = UpdateContext::default();
    let ctx = context.unwrap_or(&default);
    match outcome {
        UpdateEventOutcome::Success => tracing::info!(
            event,
            outcome = outcome.as_str(),
            terminal = ctx.terminal.unwrap_or(""),
            installed = ctx.installed.unwrap_or(""),
            target_version = ctx.target.unwrap_or(""),
            "{message}"
        ),
        UpdateEventOutcome::Fault => tracing::error!(
            event,
            outcome = outcome.as_str(),
            terminal = ctx.terminal.unwrap_or(""),
            installed = ctx.installed.unwrap_or(""),
            target_version = ctx.target.unwrap_or(""),
            "{message}"
        ),
    }
}
