//! ---
//! termup_section: "02-update-protocol"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Manifest model and update protocol primitives."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Core crate describing the published update manifest, the opaque version
//! token exchanged between terminals and the server, and the JSON bodies of
//! the HTTP protocol.

pub mod manifest;
pub mod version;
pub mod wire;

pub use manifest::{artifact_name_for, validate_artifact_name, Manifest, ARTIFACT_CONTENT_TYPE};
pub use version::{update_available, Version, DEFAULT_LOCAL_VERSION};
pub use wire::{CheckUpdateResponse, ErrorBody, PublishResponse, PUBLISHED_STATUS};

/// Errors raised while constructing protocol values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    /// The supplied version token was empty after trimming.
    #[error("version must not be empty")]
    EmptyVersion,
    /// The artifact name cannot be used as a flat store key.
    #[error("invalid artifact name '{0}'")]
    InvalidArtifactName(String),
}
