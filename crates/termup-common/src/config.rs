//! ---
//! termup_section: "01-core-functionality"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Shared primitives and utilities for termup binaries."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;
use url::Url;

use crate::logging::{LogFile, LogFormat};

const VERSION_FILE_NAME: &str = "version.txt";

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_public_url() -> String {
    "http://127.0.0.1:8080".to_owned()
}

fn default_max_upload_bytes() -> usize {
    512 * 1024 * 1024
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("target/termup-store")
}

fn default_manifest_file() -> String {
    "manifest.json".to_owned()
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_owned()
}

fn default_install_dir() -> PathBuf {
    PathBuf::from("termup-install")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_agent_log_file() -> LogFile {
    LogFile::Single
}

fn default_metrics_enabled() -> bool {
    true
}

/// Primary configuration object shared by the termup binaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and defaults are in effect.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "TERMUP_CONFIG";

    /// Load configuration from disk, respecting the `TERMUP_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        let loaded = Self::load_with_source(candidates)?;
        loaded.source.ok_or_else(|| {
            anyhow!(
                "no configuration files found. inspected: {}",
                describe(candidates)
            )
        })?;
        Ok(loaded.config)
    }

    /// Load configuration together with the effective source path.
    ///
    /// An explicit `TERMUP_CONFIG` path must exist. Otherwise the first
    /// existing candidate wins, and validated defaults are used when none exist.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        debug!(inspected = %describe(candidates), "no configuration file found; using defaults");
        let config = Self::default();
        config.validate()?;
        Ok(LoadedAppConfig {
            config,
            source: None,
        })
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.storage.validate()?;
        self.agent.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Logging settings for an agent run: `logging` with `agent.log_file` applied.
    pub fn agent_logging(&self) -> LoggingConfig {
        LoggingConfig {
            file: self.agent.log_file,
            ..self.logging.clone()
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// HTTP surface of the update service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Base URL terminals use to reach this service; download references are built from it.
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            public_url: default_public_url(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        parse_http_url("server.public_url", &self.public_url)?;
        if self.max_upload_bytes == 0 {
            return Err(anyhow!("server.max_upload_bytes must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Filesystem,
    Memory,
}

/// Where artifacts and the manifest live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    /// When set, terminals are pointed at `<public_base_url>/<artifact>` instead of `/download`.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root: default_storage_root(),
            manifest_file: default_manifest_file(),
            public_base_url: None,
        }
    }
}

impl StorageConfig {
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(&self.manifest_file)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend == StorageBackend::Filesystem && self.root.as_os_str().is_empty() {
            return Err(anyhow!("storage.root must not be empty"));
        }
        if self.manifest_file.trim().is_empty() || self.manifest_file.contains(['/', '\\']) {
            return Err(anyhow!(
                "storage.manifest_file must be a plain file name, got '{}'",
                self.manifest_file
            ));
        }
        if let Some(base) = &self.public_base_url {
            parse_http_url("storage.public_base_url", base)?;
        }
        Ok(())
    }
}

/// Settings consumed by the terminal update agent.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,
    #[serde(default)]
    pub version_file: Option<PathBuf>,
    #[serde(default = "default_request_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub request_timeout: Duration,
    #[serde(default = "default_download_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub download_timeout: Duration,
    /// Executable inside `install_dir` started after a run.
    #[serde(default)]
    pub launcher: Option<String>,
    #[serde(default)]
    pub launch_after_run: bool,
    /// Identifier attached to the agent's update events.
    #[serde(default)]
    pub terminal_id: Option<String>,
    /// On-disk log handling for agent runs; replaces `logging.file` there.
    #[serde(default = "default_agent_log_file")]
    pub log_file: LogFile,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            install_dir: default_install_dir(),
            version_file: None,
            request_timeout: default_request_timeout(),
            download_timeout: default_download_timeout(),
            launcher: None,
            launch_after_run: false,
            terminal_id: None,
            log_file: default_agent_log_file(),
        }
    }
}

impl AgentSettings {
    /// Effective path of the installed-version record.
    pub fn version_file_path(&self) -> PathBuf {
        self.version_file
            .clone()
            .unwrap_or_else(|| self.install_dir.join(VERSION_FILE_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        parse_http_url("agent.server_url", &self.server_url)?;
        if self.install_dir.as_os_str().is_empty() {
            return Err(anyhow!("agent.install_dir must not be empty"));
        }
        if self.request_timeout.is_zero() || self.download_timeout.is_zero() {
            return Err(anyhow!("agent timeouts must be greater than zero"));
        }
        if let Some(launcher) = &self.launcher {
            if launcher.trim().is_empty() {
                return Err(anyhow!("agent.launcher must not be blank when set"));
            }
        }
        if let Some(terminal_id) = &self.terminal_id {
            if terminal_id.trim().is_empty() {
                return Err(anyhow!("agent.terminal_id must not be blank when set"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when neither `TERMUP_LOG` nor `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file: LogFile,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.level.trim().is_empty() {
            return Err(anyhow!("logging.level must not be empty"));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: default_logging_directory(),
            format: default_log_format(),
            file: LogFile::default(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn parse_http_url(field: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("{field} is not a valid URL: '{raw}'"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(anyhow!("{field} must use http or https, got '{other}'")),
    }
}

fn describe<P: AsRef<Path>>(candidates: &[P]) -> String {
    candidates
        .iter()
        .map(|p| p.as_ref().display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_document_yields_defaults() {
        let config: AppConfig = "".parse().unwrap();
        assert_eq!(config.server.listen, default_listen());
        assert_eq!(config.server.public_url, "http://127.0.0.1:8080");
        assert_eq!(config.storage.backend, StorageBackend::Filesystem);
        assert_eq!(
            config.storage.manifest_path(),
            PathBuf::from("target/termup-store/manifest.json")
        );
        assert_eq!(config.agent.request_timeout, Duration::from_secs(10));
        assert_eq!(
            config.agent.version_file_path(),
            PathBuf::from("termup-install/version.txt")
        );
        assert!(config.metrics.enabled);
    }

    #[test]
    fn parses_sections_and_durations() {
        let config: AppConfig = r#"
            [server]
            listen = "127.0.0.1:9000"
            public_url = "https://updates.example.invalid"

            [storage]
            backend = "memory"
            public_base_url = "https://erp-auto-update.s3.sa-east-1.amazonaws.com"

            [agent]
            server_url = "https://updates.example.invalid"
            install_dir = "/opt/erp"
            version_file = "/var/lib/erp/version.txt"
            request_timeout = 3
            download_timeout = 60
            launcher = "Vnd.exe"
            launch_after_run = true

            [logging]
            format = "pretty"
        "#
        .parse()
        .unwrap();

        assert_eq!(config.server.listen.port(), 9000);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.agent.download_timeout, Duration::from_secs(60));
        assert_eq!(
            config.agent.version_file_path(),
            PathBuf::from("/var/lib/erp/version.txt")
        );
        assert_eq!(config.agent.launcher.as_deref(), Some("Vnd.exe"));
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn reference_config_is_valid() {
        let config: AppConfig = include_str!("../../../configs/termup.toml")
            .parse()
            .unwrap();
        assert_eq!(config.server.max_upload_bytes, 512 * 1024 * 1024);
        assert_eq!(
            config.agent.version_file_path(),
            PathBuf::from("ERP_Auto_Update_Client/version.txt")
        );
        assert!(config.agent.launch_after_run);
        assert_eq!(config.logging.file, LogFile::Daily);
        assert_eq!(config.agent_logging().file, LogFile::Single);
    }

    #[test]
    fn agent_runs_use_their_own_log_file_mode() {
        let config: AppConfig = r#"
            [agent]
            terminal_id = "pos-07"

            [logging]
            level = "debug"
            file = "daily"
        "#
        .parse()
        .unwrap();
        assert_eq!(config.agent.terminal_id.as_deref(), Some("pos-07"));
        assert_eq!(config.logging.file, LogFile::Daily);

        let agent = config.agent_logging();
        assert_eq!(agent.file, LogFile::Single);
        assert_eq!(agent.level, "debug");

        let quiet: AppConfig = "[agent]\nlog_file = \"off\"".parse().unwrap();
        assert_eq!(quiet.agent_logging().file, LogFile::Off);
        assert!("[logging]\nlevel = \"\"".parse::<AppConfig>().is_err());
        assert!("[agent]\nterminal_id = \" \"".parse::<AppConfig>().is_err());
    }

    #[test]
    fn rejects_invalid_urls_and_timeouts() {
        assert!("[agent]\nserver_url = \"not a url\"".parse::<AppConfig>().is_err());
        assert!("[server]\npublic_url = \"ftp://x\"".parse::<AppConfig>().is_err());
        assert!("[agent]\nrequest_timeout = 0".parse::<AppConfig>().is_err());
        assert!("[storage]\nmanifest_file = \"a/b.json\""
            .parse::<AppConfig>()
            .is_err());
    }

    #[test]
    fn load_picks_first_existing_candidate() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let present = dir.path().join("termup.toml");
        fs::write(&present, "[server]\nlisten = \"127.0.0.1:7001\"\n").unwrap();

        let loaded = AppConfig::load_with_source(&[missing.clone(), present.clone()]).unwrap();
        assert_eq!(loaded.source.as_deref(), Some(present.as_path()));
        assert_eq!(loaded.config.server.listen.port(), 7001);

        let fallback = AppConfig::load_with_source(&[missing.clone()]).unwrap();
        assert!(fallback.source.is_none());
        assert!(AppConfig::load(&[missing]).is_err());
    }
}
