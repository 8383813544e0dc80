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

/// Status string returned by a successful publish.
pub const PUBLISHED_STATUS: &str = "published";

/// Body of `GET /check_update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckUpdateResponse {
    /// True when the caller's version differs from the published one.
    pub update_available: bool,
    /// Published version, present only when an update is available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    /// Locator for the package archive, present only when an update is available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl CheckUpdateResponse {
    /// Response for a terminal that already runs the published version.
    #[must_use]
    pub fn up_to_date() -> Self {
        Self {
            update_available: false,
            latest_version: None,
            url: None,
        }
    }

    /// Response pointing the terminal at a newer package.
    #[must_use]
    pub fn available(latest_version: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            update_available: true,
            latest_version: Some(latest_version.into()),
            url: Some(url.into()),
        }
    }
}

/// Body of a successful `POST /upload_update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResponse {
    /// Human readable status.
    pub status: String,
    /// Version that is now current.
    pub version: String,
}

/// Error body shared by every failing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Description of the failure.
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn up_to_date_omits_optional_fields() {
        let body = serde_json::to_value(CheckUpdateResponse::up_to_date()).unwrap();
        assert_eq!(body, json!({"update_available": false}));
    }

    #[test]
    fn available_carries_version_and_url() {
        let body = serde_json::to_value(CheckUpdateResponse::available(
            "1.2.0",
            "http://host/download/erp_update_v1.2.0.zip",
        ))
        .unwrap();
        assert_eq!(body["latest_version"], json!("1.2.0"));
        assert_eq!(body["url"], json!("http://host/download/erp_update_v1.2.0.zip"));

        let parsed: CheckUpdateResponse =
            serde_json::from_str(r#"{"update_available": false}"#).unwrap();
        assert_eq!(parsed, CheckUpdateResponse::up_to_date());
    }
}
