//! ---
//! termup_section: "04-update-service"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Publish and update query services."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use bytes::Bytes;
use termup_manifest::{validate_artifact_name, Manifest, ManifestError, Version};
use termup_store::StoreError;
use tracing::{info, warn};

use crate::Stores;

/// Outcome of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Version the manifest now declares.
    pub published_version: Version,
    /// Store key the package was written under.
    pub artifact_name: String,
}

/// Failures surfaced to the publisher.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// The version token was empty or cannot name an artifact.
    #[error("invalid version: {0}")]
    InvalidVersion(#[from] ManifestError),
    /// The uploaded package had no bytes.
    #[error("package must not be empty")]
    EmptyPackage,
    /// The artifact could not be stored; the manifest was not touched.
    #[error("failed to store artifact {artifact_name}: {source}")]
    ArtifactWriteFailed {
        /// Artifact that could not be written.
        artifact_name: String,
        /// Underlying store failure.
        source: StoreError,
    },
    /// The artifact was stored but the manifest could not be replaced.
    #[error("failed to update manifest (artifact {artifact_name} stored but unreferenced): {source}")]
    ManifestWriteFailed {
        /// Artifact left without a referencing manifest.
        artifact_name: String,
        /// Underlying store failure.
        source: StoreError,
    },
}

impl PublishError {
    /// True when the failure was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidVersion(_) | Self::EmptyPackage)
    }

    /// Stage label used in metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::InvalidVersion(_) | Self::EmptyPackage => "validation",
            Self::ArtifactWriteFailed { .. } => "artifact",
            Self::ManifestWriteFailed { .. } => "manifest",
        }
    }
}

/// Stores a package and then points the manifest at it.
#[derive(Debug, Clone)]
pub struct PublishService {
    stores: Stores,
}

impl PublishService {
    /// Create a service writing to `stores`.
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Publish `package` as `version`.
    ///
    /// The artifact is written before the manifest. A reader can therefore
    /// never see a manifest naming an artifact whose write has not finished.
    pub async fn publish(
        &self,
        version: &str,
        package: Bytes,
    ) -> Result<PublishReceipt, PublishError> {
        let version = Version::new(version)?;
        if package.is_empty() {
            return Err(PublishError::EmptyPackage);
        }
        let manifest = Manifest::for_version(version.clone());
        let artifact_name = manifest.artifact_name.clone();
        validate_artifact_name(&artifact_name)?;
        let size = package.len();

        self.stores
            .artifacts
            .put(&artifact_name, package)
            .await
            .map_err(|source| PublishError::ArtifactWriteFailed {
                artifact_name: artifact_name.clone(),
                source,
            })?;

        if let Err(source) = self.stores.manifests.put(&manifest).await {
            warn!(
                version = %version,
                artifact = %artifact_name,
                error = %source,
                "artifact stored but manifest update failed; previous manifest remains current"
            );
            return Err(PublishError::ManifestWriteFailed {
                artifact_name,
                source,
            });
        }

        info!(version = %version, artifact = %artifact_name, bytes = size, "update published");
        Ok(PublishReceipt {
            published_version: version,
            artifact_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use termup_store::{
        ArtifactStore, ManifestStore, MemoryArtifactStore, MemoryManifestStore,
    };

    struct BrokenArtifacts;

    #[async_trait]
    impl ArtifactStore for BrokenArtifacts {
        async fn put(&self, _name: &str, _bytes: Bytes) -> termup_store::Result<()> {
            Err(std::io::Error::other("disk full").into())
        }

        async fn get(&self, _name: &str) -> termup_store::Result<Option<Bytes>> {
            Ok(None)
        }

        async fn exists(&self, _name: &str) -> termup_store::Result<bool> {
            Ok(false)
        }
    }

    struct BrokenManifests;

    #[async_trait]
    impl ManifestStore for BrokenManifests {
        async fn put(&self, _manifest: &Manifest) -> termup_store::Result<()> {
            Err(std::io::Error::other("read-only").into())
        }

        async fn get(&self) -> termup_store::Result<Option<Manifest>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn publish_writes_artifact_then_manifest() {
        let stores = Stores::in_memory();
        let service = PublishService::new(stores.clone());

        let receipt = service
            .publish("1.2.0", Bytes::from_static(b"PK\x03\x04zipA"))
            .await
            .unwrap();
        assert_eq!(receipt.published_version, "1.2.0");
        assert_eq!(receipt.artifact_name, "erp_update_v1.2.0.zip");

        let manifest = stores.manifests.get().await.unwrap().unwrap();
        assert_eq!(manifest.version, "1.2.0");
        assert_eq!(manifest.artifact_name, receipt.artifact_name);
        let stored = stores.artifacts.get(&manifest.artifact_name).await.unwrap();
        assert_eq!(stored.as_deref(), Some(&b"PK\x03\x04zipA"[..]));
    }

    #[tokio::test]
    async fn republish_same_version_overwrites_artifact() {
        let stores = Stores::in_memory();
        let service = PublishService::new(stores.clone());
        service.publish("2", Bytes::from_static(b"old")).await.unwrap();
        service.publish("2", Bytes::from_static(b"new")).await.unwrap();
        let stored = stores.artifacts.get("erp_update_v2.zip").await.unwrap();
        assert_eq!(stored.as_deref(), Some(&b"new"[..]));
    }

    #[tokio::test]
    async fn rejects_blank_version_and_empty_package_without_writes() {
        let stores = Stores::in_memory();
        let service = PublishService::new(stores.clone());

        let err = service.publish("  ", Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, PublishError::InvalidVersion(_)));
        assert!(err.is_client_error());

        let err = service.publish("1.0", Bytes::new()).await.unwrap_err();
        assert!(matches!(err, PublishError::EmptyPackage));
        assert!(stores.manifests.get().await.unwrap().is_none());
        assert!(!stores.artifacts.exists("erp_update_v1.0.zip").await.unwrap());
    }

    #[tokio::test]
    async fn version_with_path_separator_is_rejected_before_any_write() {
        let stores = Stores::in_memory();
        let service = PublishService::new(stores.clone());

        for bad in ["1.2/rc1", "..\\up"] {
            let err = service
                .publish(bad, Bytes::from_static(b"PK"))
                .await
                .unwrap_err();
            assert!(
                matches!(err, PublishError::InvalidVersion(ManifestError::InvalidArtifactName(_))),
                "{bad}: {err:?}"
            );
            assert!(err.is_client_error());
            assert_eq!(err.stage(), "validation");
        }
        assert!(stores.manifests.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn artifact_failure_leaves_previous_manifest() {
        let manifests = Arc::new(MemoryManifestStore::new());
        let good = PublishService::new(Stores {
            artifacts: Arc::new(MemoryArtifactStore::new()),
            manifests: manifests.clone(),
        });
        good.publish("1.0", Bytes::from_static(b"v1")).await.unwrap();

        let broken = PublishService::new(Stores {
            artifacts: Arc::new(BrokenArtifacts),
            manifests: manifests.clone(),
        });
        let err = broken.publish("1.1", Bytes::from_static(b"v2")).await.unwrap_err();
        assert!(matches!(err, PublishError::ArtifactWriteFailed { .. }));
        assert_eq!(err.stage(), "artifact");
        assert_eq!(manifests.get().await.unwrap().unwrap().version, "1.0");
    }

    #[tokio::test]
    async fn manifest_failure_reports_orphaned_artifact() {
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let service = PublishService::new(Stores {
            artifacts: artifacts.clone(),
            manifests: Arc::new(BrokenManifests),
        });
        let err = service.publish("3.0", Bytes::from_static(b"v3")).await.unwrap_err();
        match &err {
            PublishError::ManifestWriteFailed { artifact_name, .. } => {
                assert_eq!(artifact_name, "erp_update_v3.0.zip");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!err.is_client_error());
        assert!(artifacts.exists("erp_update_v3.0.zip").await.unwrap());
    }
}
