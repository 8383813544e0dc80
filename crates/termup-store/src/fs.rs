//! ---
//! termup_section: "03-storage"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Store abstractions and storage bindings."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use termup_manifest::{validate_artifact_name, Manifest};
use tokio::fs;
use tracing::debug;
use url::Url;

use crate::{ArtifactStore, ManifestStore, Result};

/// Artifact store keeping one file per package under a root directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
    public_base_url: Option<Url>,
}

impl FsArtifactStore {
    /// Store artifacts below `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            public_base_url: None,
        }
    }

    /// Advertise artifacts under an external base URL (e.g. a bucket or CDN
    /// serving the same directory) instead of the service download route.
    pub fn with_public_base_url(mut self, base: Url) -> Self {
        self.public_base_url = Some(base);
        self
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_artifact_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, name: &str, bytes: Bytes) -> Result<()> {
        let path = self.path_for(name)?;
        let size = bytes.len();
        write_atomic(&path, bytes).await?;
        debug!(artifact = name, bytes = size, path = %path.display(), "artifact stored");
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<Bytes>> {
        let path = self.path_for(name)?;
        match fs::read(&path).await {
            Ok(contents) => Ok(Some(Bytes::from(contents))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        Ok(fs::try_exists(&path).await?)
    }

    fn locate(&self, name: &str) -> Option<String> {
        let mut url = self.public_base_url.clone()?;
        // Segment pushes percent-encode names holding '#', '?' or spaces.
        url.path_segments_mut().ok()?.pop_if_empty().push(name);
        Some(url.into())
    }
}

/// Manifest store backed by a single JSON document.
#[derive(Debug, Clone)]
pub struct FsManifestStore {
    path: PathBuf,
}

impl FsManifestStore {
    /// Keep the manifest at `path` (conventionally `manifest.json`).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the manifest document.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ManifestStore for FsManifestStore {
    async fn put(&self, manifest: &Manifest) -> Result<()> {
        let document = manifest.to_json_pretty()?;
        write_atomic(&self.path, Bytes::from(document)).await?;
        debug!(version = %manifest.version, path = %self.path.display(), "manifest replaced");
        Ok(())
    }

    async fn get(&self) -> Result<Option<Manifest>> {
        match fs::read(&self.path).await {
            Ok(contents) => Ok(Some(Manifest::from_json(&contents)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Blocking atomic replace of `path`, run off the async workers.
async fn write_atomic(path: &Path, contents: Bytes) -> Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || termup_common::write_atomic(&path, &contents))
        .await
        .map_err(|join| std::io::Error::other(join.to_string()))??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use termup_manifest::Version;

    #[tokio::test]
    async fn artifact_roundtrip_and_missing() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("artifacts"));

        assert!(store.get("erp_update_v1.zip").await.unwrap().is_none());
        assert!(!store.exists("erp_update_v1.zip").await.unwrap());

        store
            .put("erp_update_v1.zip", Bytes::from_static(b"PK-one"))
            .await
            .unwrap();
        assert!(store.exists("erp_update_v1.zip").await.unwrap());
        let fetched = store.get("erp_update_v1.zip").await.unwrap().unwrap();
        assert_eq!(&fetched[..], b"PK-one");
    }

    #[tokio::test]
    async fn put_leaves_no_temporary_files() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());
        store.put("a.zip", Bytes::from_static(b"1")).await.unwrap();
        store.put("a.zip", Bytes::from_static(b"22")).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.zip".to_string()]);
        assert_eq!(std::fs::read(dir.path().join("a.zip")).unwrap(), b"22");
    }

    #[tokio::test]
    async fn rejects_names_escaping_root() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().join("inner"));
        let err = store
            .put("../outside.zip", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::StoreError::InvalidName(_)));
        assert!(!dir.path().join("outside.zip").exists());
    }

    #[test]
    fn locate_uses_public_base_url() {
        let plain = FsArtifactStore::new("/tmp/none");
        assert!(plain.locate("a.zip").is_none());

        let public = FsArtifactStore::new("/tmp/none").with_public_base_url(
            Url::parse("https://erp-auto-update.s3.sa-east-1.amazonaws.com/").unwrap(),
        );
        assert_eq!(
            public.locate("erp_update_v1.2.0.zip").as_deref(),
            Some("https://erp-auto-update.s3.sa-east-1.amazonaws.com/erp_update_v1.2.0.zip")
        );

        let nested = FsArtifactStore::new("/tmp/none")
            .with_public_base_url(Url::parse("https://cdn.example.invalid/erp").unwrap());
        assert_eq!(
            nested.locate("erp_update_v1.2 #rc?.zip").as_deref(),
            Some("https://cdn.example.invalid/erp/erp_update_v1.2%20%23rc%3F.zip")
        );
    }

    #[tokio::test]
    async fn manifest_document_roundtrip() {
        let dir = tempdir().unwrap();
        let store = FsManifestStore::new(dir.path().join("manifest.json"));
        assert!(store.get().await.unwrap().is_none());

        let manifest = Manifest::for_version(Version::new("1.2.0").unwrap());
        store.put(&manifest).await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(manifest));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["file"], "erp_update_v1.2.0.zip");
        assert_eq!(raw["update"], true);
    }

    #[tokio::test]
    async fn corrupt_manifest_is_an_error_not_absence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, b"{not json").unwrap();
        let store = FsManifestStore::new(&path);
        assert!(matches!(
            store.get().await,
            Err(crate::StoreError::Json(_))
        ));
    }
}
