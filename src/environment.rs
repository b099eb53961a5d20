/*!
 * Runtime environment description
 *
 * Describes the interpreter and dependency file a bundle targets. The
 * descriptor is produced outside this crate (by an inspector that queries the
 * local interpreter) and consumed as an immutable value.
 */

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, RsconnectError};

pub const DEFAULT_REQUIREMENTS_FILE: &str = "requirements.txt";

/// Where the dependency list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentSource {
    /// An existing file in the content directory
    #[default]
    File,
    /// Produced by the inspector, e.g. from `pip freeze`
    Generated,
}

/// Immutable snapshot of a runtime environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDescriptor {
    /// Interpreter version, e.g. `3.11.4`
    pub python: String,

    #[serde(default)]
    pub locale: Option<String>,

    #[serde(default = "default_package_manager")]
    pub package_manager: String,

    #[serde(default, alias = "pip")]
    pub package_manager_version: Option<String>,

    #[serde(default = "default_filename")]
    pub filename: String,

    /// Dependency list text; bundled from memory when the source is generated
    #[serde(default)]
    pub contents: Option<String>,

    #[serde(default)]
    pub source: EnvironmentSource,

    /// Interpreter constraint from project metadata, e.g. `>=3.9`
    #[serde(default)]
    pub python_requires: Option<String>,
}

fn default_package_manager() -> String {
    "pip".to_string()
}

fn default_filename() -> String {
    DEFAULT_REQUIREMENTS_FILE.to_string()
}

impl EnvironmentDescriptor {
    /// Load a descriptor written by an external inspector
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text =
            std::fs::read_to_string(path).map_err(|e| RsconnectError::filesystem(path, e))?;
        let descriptor: EnvironmentDescriptor = serde_json::from_str(&text).map_err(|e| {
            RsconnectError::Config(format!(
                "{} is not a valid environment description: {}",
                path.display(),
                e
            ))
        })?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Describe an environment whose dependencies are already listed on disk
    pub fn from_requirements_file(dir: &Path, python: impl Into<String>) -> Self {
        let path = dir.join(DEFAULT_REQUIREMENTS_FILE);
        let contents = std::fs::read_to_string(&path).ok();
        EnvironmentDescriptor {
            python: python.into(),
            locale: None,
            package_manager: default_package_manager(),
            package_manager_version: None,
            filename: DEFAULT_REQUIREMENTS_FILE.to_string(),
            contents,
            source: EnvironmentSource::File,
            python_requires: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.python.trim().is_empty() {
            return Err(RsconnectError::Config(
                "environment description has no python version".to_string(),
            ));
        }
        if self.filename.contains('/') || self.filename.contains('\\') {
            return Err(RsconnectError::Config(format!(
                "dependency file '{}' must be a plain file name",
                self.filename
            )));
        }
        Ok(())
    }

    /// Name of the dependency file inside the bundle
    pub fn package_file(&self) -> &str {
        &self.filename
    }

    /// The dependency file to bundle from memory instead of disk, if any
    pub fn generated_file(&self) -> Option<(&str, &[u8])> {
        match (self.source, &self.contents) {
            (EnvironmentSource::Generated, Some(contents)) => {
                Some((self.filename.as_str(), contents.as_bytes()))
            }
            _ => None,
        }
    }
}
