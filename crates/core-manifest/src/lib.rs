//! Core manifest data structures for rsconnect
//!
//! This crate models `manifest.json`, the document shipped at the root of
//! every content bundle. It tells the server which app mode to run, where the
//! entrypoint is, which runtime the content was built for, and the checksum of
//! every payload file.
//!
//! # Key Concepts
//!
//! - **App mode**: enum identifying the kind of content and how it executes
//! - **Manifest**: versioned document with metadata and a sorted file table
//! - **Integration request**: loose description of an OAuth integration the
//!   content wants attached
//!
//! # Example
//!
//! ```
//! use rsconnect_core_manifest::{AppMode, Manifest, validate_manifest};
//!
//! let mut manifest = Manifest::new(AppMode::PythonApi);
//! manifest.metadata.entrypoint = Some("app:app".to_string());
//! manifest.add_file("app.py", "0cc175b9c0f1b6a831c399e269772661");
//! validate_manifest(&manifest).unwrap();
//! ```

pub mod app_mode;
pub mod error;
pub mod integration;
pub mod manifest;
pub mod validate;

// Re-export main types for convenience
pub use app_mode::AppMode;
pub use error::{Error, Result};
pub use integration::{Integration, IntegrationRequest};
pub use manifest::{
    EnvironmentManagement, EnvironmentSection, FileEntry, Manifest, ManifestDiff, Metadata,
    PackageManager, PythonRequirement, PythonSection,
};
pub use validate::validate_manifest;

/// Manifest document version written by this client
pub const MANIFEST_VERSION: u32 = 1;

/// Fixed path of the manifest inside a bundle
pub const MANIFEST_FILENAME: &str = "manifest.json";
