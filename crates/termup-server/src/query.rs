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
use termup_manifest::{
    update_available, validate_artifact_name, CheckUpdateResponse, Manifest, ManifestError,
    Version,
};
use termup_store::StoreError;
use tracing::debug;
use url::Url;

use crate::Stores;

/// Answer to a terminal's update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheck {
    /// Whether the terminal should download a package.
    pub update_available: bool,
    /// Published version, set only when an update is available.
    pub latest_version: Option<Version>,
    /// Where the package can be fetched, set only when an update is available.
    pub retrieval_ref: Option<String>,
}

impl UpdateCheck {
    fn up_to_date() -> Self {
        Self {
            update_available: false,
            latest_version: None,
            retrieval_ref: None,
        }
    }
}

impl From<UpdateCheck> for CheckUpdateResponse {
    fn from(check: UpdateCheck) -> Self {
        Self {
            update_available: check.update_available,
            latest_version: check.latest_version.map(String::from),
            url: check.retrieval_ref,
        }
    }
}

/// Failures raised while answering terminals.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Nothing has been published yet.
    #[error("No update manifest found")]
    ManifestNotFound,
    /// The requested artifact does not exist.
    #[error("artifact '{0}' not found")]
    ArtifactNotFound(String),
    /// The requested artifact name is not a flat store key.
    #[error(transparent)]
    InvalidArtifactName(ManifestError),
    /// A store could not be read.
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Read side of the service.
#[derive(Debug, Clone)]
pub struct UpdateQueryService {
    stores: Stores,
    public_url: Url,
}

impl UpdateQueryService {
    /// Create a service reading from `stores`. Download links served by this
    /// process are built under `public_url`.
    pub fn new(stores: Stores, public_url: Url) -> Self {
        Self { stores, public_url }
    }

    /// Compare `local_version` with the published manifest.
    ///
    /// The comparison is string inequality: any difference, including a
    /// terminal reporting a newer version, is reported as an update.
    pub async fn check_update(&self, local_version: &str) -> Result<UpdateCheck, QueryError> {
        let manifest = self.current_manifest().await?;
        if !update_available(&manifest.version, local_version) {
            debug!(local = local_version, "terminal is up to date");
            return Ok(UpdateCheck::up_to_date());
        }
        let retrieval_ref = self.retrieval_ref(&manifest.artifact_name);
        debug!(
            local = local_version,
            latest = %manifest.version,
            url = %retrieval_ref,
            "update available"
        );
        Ok(UpdateCheck {
            update_available: true,
            latest_version: Some(manifest.version),
            retrieval_ref: Some(retrieval_ref),
        })
    }

    /// The current manifest, if one has been published.
    pub async fn current_manifest(&self) -> Result<Manifest, QueryError> {
        self.stores
            .manifests
            .get()
            .await?
            .ok_or(QueryError::ManifestNotFound)
    }

    /// Bytes of a stored artifact.
    pub async fn fetch_artifact(&self, name: &str) -> Result<Bytes, QueryError> {
        validate_artifact_name(name).map_err(QueryError::InvalidArtifactName)?;
        self.stores
            .artifacts
            .get(name)
            .await?
            .ok_or_else(|| QueryError::ArtifactNotFound(name.to_owned()))
    }

    fn retrieval_ref(&self, artifact_name: &str) -> String {
        if let Some(location) = self.stores.artifacts.locate(artifact_name) {
            return location;
        }
        let mut url = self.public_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("download").push(artifact_name);
        }
        url.to_string()
    }
}
