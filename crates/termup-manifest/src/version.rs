//! ---
//! termup_section: "02-update-protocol"
//! termup_subsection: "module"
//! termup_type: "source"
//! termup_scope: "code"
//! termup_description: "Manifest model and update protocol primitives."
//! termup_version: "v0.1.0"
//! termup_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ManifestError;

/// Version reported by a terminal that has never recorded an installation.
pub const DEFAULT_LOCAL_VERSION: &str = "0.0.0";

/// Opaque version identifier.
///
/// Versions are compared for equality only. No ordering is defined: "1.10"
/// and "1.9" are simply different tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version(String);

impl Version {
    /// Build a version from a raw token, trimming surrounding whitespace.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ManifestError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ManifestError::EmptyVersion);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Version assumed for a terminal without local state.
    #[must_use]
    pub fn initial() -> Self {
        Self(DEFAULT_LOCAL_VERSION.to_owned())
    }

    /// Borrow the token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Version {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Version {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.0
    }
}

impl PartialEq<str> for Version {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Version {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Decide whether a terminal reporting `local` should be told to update.
///
/// This is plain inequality. A terminal that is "ahead" of the manifest is
/// also told to update, towards the published version.
#[must_use]
pub fn update_available(published: &Version, local: &str) -> bool {
    published.as_str() != local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_and_rejects_blank() {
        assert_eq!(Version::new("  1.2.0\n").unwrap().as_str(), "1.2.0");
        assert_eq!(Version::new("   "), Err(ManifestError::EmptyVersion));
        assert_eq!("".parse::<Version>(), Err(ManifestError::EmptyVersion));
    }

    #[test]
    fn differing_versions_in_either_direction_are_updates() {
        let published = Version::new("1.2.0").unwrap();
        assert!(update_available(&published, "1.1.0"));
        assert!(update_available(&published, "2.0.0"));
        assert!(update_available(&published, "0.0.0"));
        assert!(!update_available(&published, "1.2.0"));
    }

    #[test]
    fn comparison_is_not_normalised() {
        let published = Version::new("1.2").unwrap();
        assert!(update_available(&published, "1.2.0"));
        assert!(update_available(&published, " 1.2"));
    }

    #[test]
    fn serde_rejects_empty_token() {
        assert!(serde_json::from_str::<Version>("\"\"").is_err());
        let parsed: Version = serde_json::from_str("\"3.1\"").unwrap();
        assert_eq!(parsed, "3.1");
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"3.1\"");
    }

    #[test]
    fn initial_matches_default_constant() {
        assert_eq!(Version::initial().as_str(), DEFAULT_LOCAL_VERSION);
    }
}
