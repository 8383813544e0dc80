//! ---
//! termup_section: "02-update-protocol"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Manifest model and update protocol primitives."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::version::Version;
use crate::ManifestError;

/// Content type attached to stored and served package archives.
pub const ARTIFACT_CONTENT_TYPE: &str = "application/zip";

const ARTIFACT_PREFIX: &str = "erp_update_v";
const ARTIFACT_SUFFIX: &str = ".zip";

fn default_update_flag() -> bool {
    true
}

/// The single published-update descriptor.
///
/// Persisted as `{"update": true, "version": "...", "file": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Informational flag carried over from the stored document.
    #[serde(default = "default_update_flag")]
    pub update: bool,
    /// Currently published version.
    pub version: Version,
    /// Key of the package in the artifact store.
    #[serde(rename = "file", alias = "artifact_name")]
    pub artifact_name: String,
}

impl Manifest {
    /// Manifest pointing at the deterministic artifact name for `version`.
    #[must_use]
    pub fn for_version(version: Version) -> Self {
        let artifact_name = artifact_name_for(&version);
        Self {
            update: true,
            version,
            artifact_name,
        }
    }

    /// Serialise the manifest document as pretty JSON.
    pub fn to_json_pretty(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }

    /// Parse a stored manifest document.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Deterministic store key for the package of `version`.
#[must_use]
pub fn artifact_name_for(version: &Version) -> String {
    format!("{ARTIFACT_PREFIX}{version}{ARTIFACT_SUFFIX}")
}

/// Ensure `name` is usable as a flat artifact key.
pub fn validate_artifact_name(name: &str) -> Result<(), ManifestError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ManifestError::InvalidArtifactName(name.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn artifact_name_follows_release_scheme() {
        let version = Version::new("1.2.0").unwrap();
        assert_eq!(artifact_name_for(&version), "erp_update_v1.2.0.zip");
        let manifest = Manifest::for_version(version);
        assert_eq!(manifest.artifact_name, "erp_update_v1.2.0.zip");
        assert!(manifest.update);
    }

    #[test]
    fn persisted_form_uses_file_field() {
        let manifest = Manifest::for_version(Version::new("2.0").unwrap());
        let value: serde_json::Value =
            serde_json::from_slice(&manifest.to_json_pretty().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"update": true, "version": "2.0", "file": "erp_update_v2.0.zip"})
        );
    }

    #[test]
    fn reads_legacy_and_alias_documents() {
        let legacy = br#"{"version": "0.9.0", "file": "erp_update_v0.9.0.zip"}"#;
        let manifest = Manifest::from_json(legacy).unwrap();
        assert!(manifest.update);
        assert_eq!(manifest.version, "0.9.0");

        let aliased = br#"{"update": false, "version": "1", "artifact_name": "pkg.zip"}"#;
        let manifest = Manifest::from_json(aliased).unwrap();
        assert!(!manifest.update);
        assert_eq!(manifest.artifact_name, "pkg.zip");
    }

    #[test]
    fn rejects_path_like_artifact_names() {
        for bad in ["", ".", "..", "a/b", "..\\evil", "x\0y"] {
            assert!(validate_artifact_name(bad).is_err(), "{bad:?} accepted");
        }
        assert!(validate_artifact_name("erp_update_v1.2.0.zip").is_ok());
    }
}
