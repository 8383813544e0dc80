//! ---
//! termup_section: "03-storage"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Store abstractions and storage bindings."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use termup_manifest::{validate_artifact_name, Manifest};

use crate::{ArtifactStore, ManifestStore, Result};

/// Process-local artifact store used by tests and ephemeral servers.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryArtifactStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored artifacts.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Whether the store holds no artifacts.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, name: &str, bytes: Bytes) -> Result<()> {
        validate_artifact_name(name)?;
        self.blobs.write().insert(name.to_owned(), bytes);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Bytes>> {
        validate_artifact_name(name)?;
        Ok(self.blobs.read().get(name).cloned())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        validate_artifact_name(name)?;
        Ok(self.blobs.read().contains_key(name))
    }
}

/// Process-local manifest store.
#[derive(Debug, Default)]
pub struct MemoryManifestStore {
    current: RwLock<Option<Manifest>>,
}

impl MemoryManifestStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManifestStore for MemoryManifestStore {
    async fn put(&self, manifest: &Manifest) -> Result<()> {
        *self.current.write() = Some(manifest.clone());
        Ok(())
    }

    async fn get(&self) -> Result<Option<Manifest>> {
        Ok(self.current.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termup_manifest::Version;

    #[tokio::test]
    async fn artifacts_overwrite_by_name() {
        let store = MemoryArtifactStore::new();
        assert!(!store.exists("a.zip").await.unwrap());
        store.put("a.zip", Bytes::from_static(b"one")).await.unwrap();
        store.put("a.zip", Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(&store.get("a.zip").await.unwrap().unwrap()[..], b"two");
        assert!(store.get("b.zip").await.unwrap().is_none());
        assert!(store.locate("a.zip").is_none());
    }

    #[tokio::test]
    async fn manifest_is_replaced_wholesale() {
        let store = MemoryManifestStore::new();
        assert!(store.get().await.unwrap().is_none());
        store
            .put(&Manifest::for_version(Version::new("1").unwrap()))
            .await
            .unwrap();
        store
            .put(&Manifest::for_version(Version::new("2").unwrap()))
            .await
            .unwrap();
        let current = store.get().await.unwrap().unwrap();
        assert_eq!(current.version, "2");
        assert_eq!(current.artifact_name, "erp_update_v2.zip");
    }
}
