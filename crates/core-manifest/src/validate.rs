//! Validation functions for manifest documents
//!
//! This module provides JSON Schema validation for `manifest.json` plus the
//! structural checks a schema cannot express.

use crate::error::{Error, Result};
use crate::manifest::Manifest;
use crate::MANIFEST_FILENAME;
use jsonschema::{ValidationError, Validator};
use serde_json::{json, Value};

/// Validate a manifest before it is archived or written
pub fn validate_manifest(manifest: &Manifest) -> Result<()> {
    let schema = get_manifest_schema();
    let compiled = Validator::new(&schema)
        .map_err(|e| Error::validation(format!("Failed to compile schema: {}", e)))?;

    let value = serde_json::to_value(manifest)?;

    if let Err(errors) = compiled.validate(&value) {
        let error_messages: Vec<String> = errors.map(|e| format_validation_error(&e)).collect();

        return Err(Error::validation(format!(
            "Manifest validation failed:\n  - {}",
            error_messages.join("\n  - ")
        )));
    }

    check_structure(manifest)
}

fn check_structure(manifest: &Manifest) -> Result<()> {
    if manifest.files.contains_key(MANIFEST_FILENAME) {
        return Err(Error::validation(format!(
            "{} must not list itself as a payload file",
            MANIFEST_FILENAME
        )));
    }

    for path in manifest.files.keys() {
        if path.starts_with('/') || path.contains('\\') || path.split('/').any(|s| s == "..") {
            return Err(Error::validation(format!(
                "file path '{}' must be relative and POSIX-style",
                path
            )));
        }
    }

    // An entrypoint naming a file must ship in the bundle. Module-style
    // entrypoints ("app", "pkg.app:server") are resolved by the server.
    if let Some(entrypoint) = &manifest.metadata.entrypoint {
        if names_document(entrypoint) && !manifest.files.contains_key(entrypoint) {
            return Err(Error::validation(format!(
                "entrypoint '{}' is not among the bundled files",
                entrypoint
            )));
        }
    }

    if let Some(primary) = &manifest.metadata.primary_html {
        if !manifest.files.contains_key(primary) {
            return Err(Error::validation(format!(
                "primary_html '{}' is not among the bundled files",
                primary
            )));
        }
    }

    if let Some(python) = &manifest.python {
        if python.version.trim().is_empty() {
            return Err(Error::missing_field("python.version"));
        }
    }

    for request in &manifest.integration_requests {
        request.validate()?;
    }

    Ok(())
}

fn names_document(entrypoint: &str) -> bool {
    const DOCUMENT_EXTENSIONS: [&str; 6] = [".html", ".htm", ".ipynb", ".qmd", ".rmd", ".py"];
    let lower = entrypoint.to_ascii_lowercase();
    !entrypoint.contains(':') && DOCUMENT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Format a validation error into a readable string
fn format_validation_error(error: &ValidationError) -> String {
    format!("{}: {}", error.instance_path, error)
}

/// Get the manifest JSON Schema
fn get_manifest_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["version", "metadata", "files"],
        "properties": {
            "version": {
                "type": "integer",
                "const": 1
            },
            "locale": {
                "type": "string"
            },
            "metadata": {
                "type": "object",
                "required": ["appmode"],
                "properties": {
                    "appmode": { "type": "string", "minLength": 1 },
                    "entrypoint": { "type": "string", "minLength": 1 },
                    "primary_html": { "type": "string", "minLength": 1 },
                    "content_category": { "type": "string" },
                    "title": { "type": "string", "minLength": 1, "maxLength": 1024 }
                }
            },
            "python": {
                "type": "object",
                "required": ["version", "package_manager"],
                "properties": {
                    "version": { "type": "string" },
                    "package_manager": {
                        "type": "object",
                        "required": ["name", "package_file"],
                        "properties": {
                            "name": { "type": "string", "minLength": 1 },
                            "version": { "type": "string" },
                            "package_file": { "type": "string", "minLength": 1 }
                        }
                    }
                }
            },
            "environment": {
                "type": "object",
                "properties": {
                    "image": { "type": "string", "minLength": 1 },
                    "python": {
                        "type": "object",
                        "required": ["requires"],
                        "properties": {
                            "requires": { "type": "string" }
                        }
                    },
                    "environment_management": {
                        "type": "object",
                        "properties": {
                            "python": { "type": "boolean" },
                            "r": { "type": "boolean" }
                        }
                    }
                }
            },
            "integration_requests": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "description": { "type": "string" },
                        "type": { "type": "string" },
                        "guid": { "type": "string" },
                        "auth_type": { "type": "string" },
                        "config": { "type": "object" }
                    },
                    "additionalProperties": false
                }
            },
            "files": {
                "type": "object",
                "minProperties": 1,
                "additionalProperties": {
                    "type": "object",
                    "required": ["checksum"],
                    "properties": {
                        "checksum": {
                            "type": "string",
                            "pattern": "^[0-9a-f]{32}$"
                        }
                    }
                }
            }
        }
    })
}
