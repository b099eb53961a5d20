//! The `manifest.json` document
//!
//! A manifest describes what a bundle contains and how the server should run
//! it. Field order in the structs below is the serialization order, and the
//! file table is a `BTreeMap`, so two builds of the same content serialize
//! to identical text.

use crate::app_mode::AppMode;
use crate::error::{Error, Result};
use crate::integration::IntegrationRequest;
use crate::MANIFEST_VERSION;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level manifest document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,

    pub metadata: Metadata,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<PythonSection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentSection>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub integration_requests: Vec<IntegrationRequest>,

    pub files: BTreeMap<String, FileEntry>,
}

/// Execution metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub appmode: AppMode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_html: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Python runtime the content was built against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonSection {
    pub version: String,
    pub package_manager: PackageManager,
}

/// Package manager and the file listing the dependencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageManager {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub package_file: String,
}

/// Execution environment hints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<PythonRequirement>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_management: Option<EnvironmentManagement>,
}

impl EnvironmentSection {
    /// True when no field would be serialized
    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.python.is_none() && self.environment_management.is_none()
    }
}

/// Version constraint on the interpreter, e.g. `>=3.9`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PythonRequirement {
    pub requires: String,
}

/// Per-language switches telling the server not to install packages
///
/// `Some(false)` means the server must skip dependency restoration and rely on
/// the execution image already carrying the packages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentManagement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r: Option<bool>,
}

/// One payload file in the bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub checksum: String,
}

impl Manifest {
    /// Create an empty manifest for the given app mode
    pub fn new(appmode: AppMode) -> Self {
        Manifest {
            version: MANIFEST_VERSION,
            locale: None,
            metadata: Metadata {
                appmode,
                ..Default::default()
            },
            python: None,
            environment: None,
            integration_requests: Vec::new(),
            files: BTreeMap::new(),
        }
    }

    /// Record a payload file and its checksum
    pub fn add_file(&mut self, path: impl Into<String>, checksum: impl Into<String>) {
        self.files.insert(
            path.into(),
            FileEntry {
                checksum: checksum.into(),
            },
        );
    }

    /// Paths listed in the manifest, in serialization order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Serialize with 2-space indentation and a trailing newline
    pub fn to_canonical_json(&self) -> Result<String> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    /// Parse a manifest, rejecting versions this client cannot write
    pub fn from_json(text: &str) -> Result<Self> {
        let manifest: Manifest = serde_json::from_str(text)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(Error::VersionMismatch {
                expected: MANIFEST_VERSION,
                found: manifest.version,
            });
        }
        Ok(manifest)
    }

    /// Compare against a newer build of the same content
    pub fn diff(&self, newer: &Manifest) -> ManifestDiff {
        let mut diff = ManifestDiff::default();

        for (path, entry) in &newer.files {
            match self.files.get(path) {
                None => diff.added.push(path.clone()),
                Some(old) if old.checksum != entry.checksum => diff.changed.push(path.clone()),
                Some(_) => {}
            }
        }
        diff.removed = self
            .files
            .keys()
            .filter(|path| !newer.files.contains_key(*path))
            .cloned()
            .collect();

        diff.metadata_changed = self.metadata != newer.metadata
            || self.python != newer.python
            || self.environment != newer.environment
            || self.locale != newer.locale
            || self.integration_requests != newer.integration_requests;

        diff
    }
}

/// Differences between two manifests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
    pub metadata_changed: bool,
}

impl ManifestDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && !self.metadata_changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Manifest {
        let mut manifest = Manifest::new(AppMode::PythonApi);
        manifest.metadata.entrypoint = Some("app".to_string());
        manifest.add_file("requirements.txt", "b5d3a7a1e8b2c0f1a9d8e7c6b5a4f3e2");
        manifest.add_file("app.py", "0cc175b9c0f1b6a831c399e269772661");
        manifest
    }

    #[test]
    fn test_canonical_json_is_sorted_and_terminated() {
        let text = sample().to_canonical_json().unwrap();
        assert!(text.ends_with("}\n"));
        let app = text.find("\"app.py\"").unwrap();
        let reqs = text.find("\"requirements.txt\"").unwrap();
        assert!(app < reqs);
        assert!(text.starts_with("{\n  \"version\": 1,"));
    }

    #[test]
    fn test_optional_sections_omitted() {
        let text = sample().to_canonical_json().unwrap();
        assert!(!text.contains("\"python\""));
        assert!(!text.contains("\"environment\""));
        assert!(!text.contains("integration_requests"));
        assert!(!text.contains("primary_html"));
    }

    #[test]
    fn test_canonical_json_is_stable() {
        let a = sample().to_canonical_json().unwrap();
        let b = sample().to_canonical_json().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_round_trip() {
        let manifest = sample();
        let parsed = Manifest::from_json(&manifest.to_canonical_json().unwrap()).unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_version_rejected() {
        let text = r#"{"version": 2, "metadata": {"appmode": "static"}, "files": {}}"#;
        let err = Manifest::from_json(text).unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { found: 2, .. }));
    }

    #[test]
    fn test_environment_management_serialization() {
        let mut manifest = sample();
        manifest.environment = Some(EnvironmentSection {
            image: Some("ghcr.io/acme/py:3.11".to_string()),
            python: None,
            environment_management: Some(EnvironmentManagement {
                python: Some(false),
                r: None,
            }),
        });
        let value: serde_json::Value =
            serde_json::from_str(&manifest.to_canonical_json().unwrap()).unwrap();
        assert_eq!(value["environment"]["image"], "ghcr.io/acme/py:3.11");
        assert_eq!(value["environment"]["environment_management"]["python"], false);
        assert!(value["environment"]["environment_management"].get("r").is_none());
    }

    #[test]
    fn test_diff_reports_file_changes() {
        let old = sample();
        let mut new = sample();
        new.add_file("app.py", "ffffffffffffffffffffffffffffffff");
        new.add_file("static/site.css", "1111");
        new.files.remove("requirements.txt");

        let diff = old.diff(&new);
        assert_eq!(diff.added, vec!["static/site.css"]);
        assert_eq!(diff.removed, vec!["requirements.txt"]);
        assert_eq!(diff.changed, vec!["app.py"]);
        assert!(!diff.metadata_changed);
    }

    #[test]
    fn test_diff_of_identical_manifests_is_empty() {
        assert!(sample().diff(&sample()).is_empty());

        let mut retitled = sample();
        retitled.metadata.title = Some("Sales API".to_string());
        let diff = sample().diff(&retitled);
        assert!(diff.metadata_changed);
        assert!(!diff.is_empty());
    }
}
