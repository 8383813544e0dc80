//! ---
//! termup_section: "01-core-functionality"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Tracing setup for the update daemon and the terminal agent."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "TERMUP_LOG";
const FALLBACK_LEVEL: &str = "info";

/// Console output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// How the on-disk log is kept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFile {
    /// A new file per day. Suits the long-running service.
    #[default]
    Daily,
    /// One file appended by every run. Suits the agent, which runs for seconds.
    Single,
    /// Console only.
    Off,
}

/// Keeps the background log writers alive. Drop it last in `main`.
#[must_use = "dropping the guard stops buffered log output"]
pub struct TracingGuard {
    _writers: Vec<WorkerGuard>,
}

/// Pick the filter directive: `TERMUP_LOG`, then `RUST_LOG`, then the configured level.
fn effective_directive<'a>(
    configured: &'a str,
    termup_log: Option<&'a str>,
    rust_log: Option<&'a str>,
) -> &'a str {
    [termup_log, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|directive| !directive.is_empty())
        .unwrap_or(configured)
}

fn build_filter(configured: &str) -> EnvFilter {
    let termup_log = std::env::var(LOG_ENV).ok();
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = effective_directive(configured, termup_log.as_deref(), rust_log.as_deref());
    EnvFilter::try_new(directive).unwrap_or_else(|err| {
        eprintln!("invalid log directive '{directive}' ({err}); using {FALLBACK_LEVEL}");
        EnvFilter::new(FALLBACK_LEVEL)
    })
}

fn file_appender(service_name: &str, config: &LoggingConfig) -> Result<Option<RollingFileAppender>> {
    if config.file == LogFile::Off {
        return Ok(None);
    }
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("unable to create log directory {}", config.directory.display())
    })?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    let name = format!("{prefix}.log");
    Ok(Some(match config.file {
        LogFile::Single => rolling::never(&config.directory, name),
        _ => rolling::daily(&config.directory, name),
    }))
}

/// Install the global subscriber for `service_name`.
///
/// The console layer uses `config.format`. The file layer is always JSON and
/// follows `config.file`. If a subscriber is already installed the call only
/// sets up writers, so tests may call it repeatedly.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<TracingGuard> {
    let mut writers = Vec::with_capacity(2);

    let (console, console_guard) = tracing_appender::non_blocking(std::io::stdout());
    writers.push(console_guard);
    let console_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(console)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(console)
            .boxed(),
    };

    let file_layer = match file_appender(service_name, config)? {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            writers.push(guard);
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_timer(fmt::time::UtcTime::rfc_3339())
                    .json()
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    let installed = tracing_subscriber::registry()
        .with(build_filter(&config.level))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        info!(
            service = %service_name,
            log_dir = %config.directory.display(),
            file = ?config.file,
            format = ?config.format,
            "tracing initialised"
        );
    }
    Ok(TracingGuard { _writers: writers })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn format_and_file_names_are_kebab_case() {
        #[derive(Deserialize)]
        struct Holder {
            format: LogFormat,
            file: LogFile,
        }
        let holder: Holder =
            toml::from_str("format = \"structured-json\"\nfile = \"single\"").unwrap();
        assert_eq!(holder.format, LogFormat::StructuredJson);
        assert_eq!(holder.file, LogFile::Single);
    }

    #[test]
    fn environment_overrides_configured_level() {
        assert_eq!(effective_directive("warn", None, None), "warn");
        assert_eq!(effective_directive("warn", None, Some("debug")), "debug");
        assert_eq!(
            effective_directive("warn", Some("termup_agent=trace"), Some("debug")),
            "termup_agent=trace"
        );
        assert_eq!(effective_directive("warn", Some("  "), None), "warn");
    }

    #[test]
    fn file_layer_follows_configuration() {
        let dir = tempdir().unwrap();
        let off = LoggingConfig {
            directory: dir.path().join("off"),
            file: LogFile::Off,
            ..LoggingConfig::default()
        };
        assert!(file_appender("termup-agent", &off).unwrap().is_none());
        assert!(!off.directory.exists());

        let single = LoggingConfig {
            directory: dir.path().join("single"),
            file: LogFile::Single,
            ..LoggingConfig::default()
        };
        assert!(file_appender("termup-agent", &single).unwrap().is_some());
        assert!(single.directory.is_dir());
    }

    #[test]
    fn init_creates_log_directory() {
        let dir = tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::Pretty,
            file_prefix: Some("termup-test".into()),
            ..LoggingConfig::default()
        };
        let _guard = init_tracing("termup-test", &config).unwrap();
        assert!(config.directory.is_dir());
        let _again = init_tracing("termup-test", &config).unwrap();
    }
}
