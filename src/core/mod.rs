/*!
 * Bundle construction: directory walk, manifest, archive
 */

pub mod app_config;
pub mod archive;
pub mod atomic;
pub mod cancel;
pub mod checksum;
pub mod entrypoint;
pub mod filter;
pub mod manifest_builder;
pub mod walker;

pub use app_config::{AppConfig, ContentKind, EntrypointPolicy};
pub use archive::{Bundle, BundleArchiver};
pub use cancel::CancelToken;
pub use entrypoint::Entrypoint;
pub use filter::{FilterOptions, PathFilter};
pub use manifest_builder::{write_manifest, BuiltManifest, ManifestBuilder, ManifestOptions};
pub use walker::{walk, FileSet};
