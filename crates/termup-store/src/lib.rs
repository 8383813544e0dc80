//! ---
//! termup_section: "03-storage"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Store abstractions and storage bindings."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Storage collaborators for the update service: a blob store holding package
//! archives and a single-record store holding the current manifest. Both
//! stores are the only shared state of the service.

use async_trait::async_trait;
use bytes::Bytes;
use termup_manifest::{Manifest, ManifestError};

/// Result alias used throughout the store crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Error type for the storage subsystem.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Wrapper for IO errors encountered while reading/writing store files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for manifest (de)serialization issues.
    #[error("manifest document error: {0}")]
    Json(#[from] serde_json::Error),
    /// Raised when an artifact key would escape the store.
    #[error(transparent)]
    InvalidName(#[from] ManifestError),
}

pub mod fs;
pub mod memory;

pub use fs::{FsArtifactStore, FsManifestStore};
pub use memory::{MemoryArtifactStore, MemoryManifestStore};

/// Blob storage keyed by artifact name.
#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    /// Store `bytes` under `name`, replacing any existing artifact.
    async fn put(&self, name: &str, bytes: Bytes) -> Result<()>;

    /// Fetch the artifact, or `None` when it does not exist.
    async fn get(&self, name: &str) -> Result<Option<Bytes>>;

    /// Whether an artifact is stored under `name`.
    async fn exists(&self, name: &str) -> Result<bool>;

    /// Externally addressable location of the artifact, when the backend has one.
    ///
    /// `None` means callers must serve the bytes themselves.
    fn locate(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Holder of the single current manifest.
#[async_trait]
pub trait ManifestStore: Send + Sync + 'static {
    /// Replace the current manifest wholesale.
    async fn put(&self, manifest: &Manifest) -> Result<()>;

    /// Current manifest, or `None` when nothing has been published.
    async fn get(&self) -> Result<Option<Manifest>>;
}
