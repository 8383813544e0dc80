//! ---
//! termup_section: "06-terminal-agent"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Staged package extraction."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
//! Packages are unpacked into a staging directory next to the install
//! directory and only then moved into place. A broken archive therefore never
//! touches the installation; a crash while moving leaves files from both
//! versions behind with the old version still recorded, so the next run
//! reapplies the package.

use std::fs;
use std::io::{self, Cursor};
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::AgentError;

const STAGING_PREFIX: &str = ".termup-staging-";
const CASE_INSENSITIVE_FS: bool = cfg!(any(windows, target_os = "macos"));

/// Result of a successful install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallSummary {
    /// Regular files written into the install directory.
    pub files: usize,
}

/// Applies a downloaded package to the install directory.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Unpack `package` into `install_dir`.
    async fn install(&self, package: Bytes, install_dir: &Path)
        -> Result<InstallSummary, AgentError>;
}

/// Zip installer with overlay semantics: archive entries replace files of the
/// same name, everything else in the install directory is kept.
#[derive(Debug, Clone, Default)]
pub struct StagedZipInstaller {
    /// Absolute, lexically normalised.
    protected: Vec<PathBuf>,
}

impl StagedZipInstaller {
    /// Installer with no protected paths.
    pub fn new() -> Self {
        Self::default()
    }

    /// Never overwrite `path`, even when the archive contains it.
    ///
    /// Relative paths resolve against the current directory, as the install
    /// directory does.
    pub fn protecting(mut self, path: impl Into<PathBuf>) -> Self {
        self.protected.push(normalise(&path.into()));
        self
    }

    /// Protected paths inside `install_dir`, relative to it.
    fn protected_within(&self, install_dir: &Path) -> Vec<PathBuf> {
        let root = normalise(install_dir);
        self.protected
            .iter()
            .filter_map(|path| path.strip_prefix(&root).ok())
            .map(Path::to_path_buf)
            .collect()
    }
}

fn normalise(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn same_entry(a: &Path, b: &Path) -> bool {
    let key = |path: &Path| -> Vec<String> {
        path.components()
            .map(|component| {
                let name = component.as_os_str().to_string_lossy();
                if CASE_INSENSITIVE_FS {
                    name.to_lowercase()
                } else {
                    name.into_owned()
                }
            })
            .collect()
    };
    key(a) == key(b)
}

#[async_trait]
impl Installer for StagedZipInstaller {
    async fn install(
        &self,
        package: Bytes,
        install_dir: &Path,
    ) -> Result<InstallSummary, AgentError> {
        let protected = self.protected_within(install_dir);
        let install_dir = install_dir.to_path_buf();
        let join_target = install_dir.clone();
        tokio::task::spawn_blocking(move || install_blocking(&package, &install_dir, &protected))
            .await
            .map_err(|err| AgentError::Install {
                path: join_target,
                source: io::Error::other(err),
            })?
    }
}

fn install_blocking(
    package: &[u8],
    install_dir: &Path,
    protected: &[PathBuf],
) -> Result<InstallSummary, AgentError> {
    fs::create_dir_all(install_dir).map_err(AgentError::install(install_dir))?;
    let parent = staging_parent(install_dir);
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(&parent)
        .map_err(AgentError::install(&parent))?;

    let extracted = extract_into(package, staging.path())?;
    debug!(entries = extracted, staging = %staging.path().display(), "package staged");

    let files = materialise(staging.path(), install_dir, protected)?;
    if let Err(err) = staging.close() {
        warn!(error = %err, "failed to remove staging directory");
    }
    Ok(InstallSummary { files })
}

fn staging_parent(install_dir: &Path) -> PathBuf {
    match install_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn corrupt(err: impl std::fmt::Display) -> AgentError {
    AgentError::CorruptArchive(err.to_string())
}

fn extract_into(package: &[u8], staging: &Path) -> Result<usize, AgentError> {
    let mut archive = ZipArchive::new(Cursor::new(package)).map_err(corrupt)?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(corrupt)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(AgentError::CorruptArchive(format!(
                "entry '{}' escapes the install directory",
                entry.name()
            )));
        };
        let target = staging.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(AgentError::install(&target))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(AgentError::install(parent))?;
        }
        let mut out = fs::File::create(&target).map_err(AgentError::install(&target))?;
        io::copy(&mut entry, &mut out).map_err(corrupt)?;
        apply_mode(&target, entry.unix_mode()).map_err(AgentError::install(&target))?;
    }
    Ok(archive.len())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    match mode {
        Some(mode) => fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777)),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}

/// Move staged files into `install_dir`, skipping `protected` (relative to it).
fn materialise(
    staging: &Path,
    install_dir: &Path,
    protected: &[PathBuf],
) -> Result<usize, AgentError> {
    let entries = WalkDir::new(staging)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| AgentError::Install {
            path: staging.to_path_buf(),
            source: err.into(),
        })?;

    let mut files = 0;
    for entry in entries {
        let Ok(relative) = entry.path().strip_prefix(staging) else {
            continue;
        };
        let target = install_dir.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(AgentError::install(&target))?;
            continue;
        }
        if protected.iter().any(|path| same_entry(path, relative)) {
            warn!(path = %target.display(), "package contains a protected file; skipped");
            continue;
        }
        fs::rename(entry.path(), &target).map_err(AgentError::install(&target))?;
        files += 1;
    }
    Ok(files)
}
