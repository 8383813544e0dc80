//! ---
//! termup_section: "04-update-service"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Publish and update query services."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Server side of the update protocol. [`PublishService`] writes the package
//! and then the manifest; [`UpdateQueryService`] answers terminals by
//! comparing their version with the manifest. [`ServerBuilder`] exposes both
//! over HTTP.

use std::sync::Arc;

use anyhow::Context;
use termup_common::config::{StorageBackend, StorageConfig};
use termup_store::{
    ArtifactStore, FsArtifactStore, FsManifestStore, ManifestStore, MemoryArtifactStore,
    MemoryManifestStore,
};
use tracing::info;
use url::Url;

pub mod http;
pub mod metrics;
pub mod publish;
pub mod query;

pub use http::{ServerBuilder, ServerHandle};
pub use metrics::ServiceMetrics;
pub use publish::{PublishError, PublishReceipt, PublishService};
pub use query::{QueryError, UpdateCheck, UpdateQueryService};

/// Pair of stores backing one service instance.
#[derive(Clone)]
pub struct Stores {
    /// Package archives.
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Current manifest.
    pub manifests: Arc<dyn ManifestStore>,
}

impl Stores {
    /// Build the stores described by the storage configuration.
    pub fn from_config(config: &StorageConfig) -> anyhow::Result<Self> {
        match config.backend {
            StorageBackend::Memory => {
                info!("using in-memory stores; published updates are lost on restart");
                Ok(Self::in_memory())
            }
            StorageBackend::Filesystem => {
                let mut artifacts = FsArtifactStore::new(&config.root);
                if let Some(base) = &config.public_base_url {
                    let base = Url::parse(base)
                        .with_context(|| format!("invalid storage.public_base_url '{base}'"))?;
                    artifacts = artifacts.with_public_base_url(base);
                }
                info!(
                    root = %config.root.display(),
                    manifest = %config.manifest_path().display(),
                    public_base_url = config.public_base_url.as_deref().unwrap_or(""),
                    "using filesystem stores"
                );
                Ok(Self {
                    artifacts: Arc::new(artifacts),
                    manifests: Arc::new(FsManifestStore::new(config.manifest_path())),
                })
            }
        }
    }

    /// Fresh in-memory stores.
    pub fn in_memory() -> Self {
        Self {
            artifacts: Arc::new(MemoryArtifactStore::new()),
            manifests: Arc::new(MemoryManifestStore::new()),
        }
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    #[tokio::test]
    async fn filesystem_config_shares_one_root() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            root: dir.path().to_path_buf(),
            public_base_url: Some("https://cdn.example.invalid/pkgs".into()),
            ..StorageConfig::default()
        };
        let stores = Stores::from_config(&config).unwrap();
        stores
            .artifacts
            .put("erp_update_v1.zip", Bytes::from_static(b"zip"))
            .await
            .unwrap();
        assert!(dir.path().join("erp_update_v1.zip").is_file());
        assert_eq!(
            stores.artifacts.locate("erp_update_v1.zip").as_deref(),
            Some("https://cdn.example.invalid/pkgs/erp_update_v1.zip")
        );
        assert!(stores.manifests.get().await.unwrap().is_none());
    }
}
