//! Integration requests
//!
//! Content can ask the server to attach an OAuth integration. A request names
//! the integration loosely: `name` and `description` are regular expressions,
//! every other field must match exactly. Absent fields match anything.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A request carried in `manifest.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub integration_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
}

/// An integration as the server lists it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub guid: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Integration template, e.g. `databricks` or `custom`
    #[serde(default)]
    pub template: String,

    #[serde(default)]
    pub auth_type: String,

    #[serde(default)]
    pub config: Map<String, Value>,
}

impl IntegrationRequest {
    /// Check the request compiles; called before a manifest is written
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::validation(
                "integration request must set at least one field",
            ));
        }
        for pattern in [&self.name, &self.description].into_iter().flatten() {
            compile(pattern)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.integration_type.is_none()
            && self.guid.is_none()
            && self.auth_type.is_none()
            && self.config.is_none()
    }

    /// Whether `integration` satisfies this request
    pub fn matches(&self, integration: &Integration) -> Result<bool> {
        if let Some(pattern) = &self.name {
            if !compile(pattern)?.is_match(&integration.name) {
                return Ok(false);
            }
        }
        if let Some(pattern) = &self.description {
            if !compile(pattern)?.is_match(&integration.description) {
                return Ok(false);
            }
        }
        if let Some(kind) = &self.integration_type {
            if kind != &integration.template {
                return Ok(false);
            }
        }
        if let Some(guid) = &self.guid {
            if guid != &integration.guid {
                return Ok(false);
            }
        }
        if let Some(auth_type) = &self.auth_type {
            if auth_type != &integration.auth_type {
                return Ok(false);
            }
        }
        if let Some(config) = &self.config {
            // Every requested key must be present with an equal value
            let all_equal = config
                .iter()
                .all(|(key, value)| integration.config.get(key) == Some(value));
            if !all_equal {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// First integration satisfying the request
    pub fn find_match<'a>(&self, integrations: &'a [Integration]) -> Result<Option<&'a Integration>> {
        for integration in integrations {
            if self.matches(integration)? {
                return Ok(Some(integration));
            }
        }
        Ok(None)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
