/*!
 * rsconnect - publish content directories to a Connect server
 *
 * Turns a local directory into a deployable bundle and ships it:
 * - Directory walk with exclusion rules and virtual-environment detection
 * - Entrypoint discovery and a validated `manifest.json`
 * - Deterministic gzip tar bundles with the manifest at a fixed path
 * - HTTP client for content, bundle, deploy and task endpoints
 * - Task polling with timeouts, cancellation and local state tracking
 */

pub mod api;
pub mod cli_style;
pub mod config;
pub mod core;
pub mod deploy;
pub mod environment;
pub mod error;
pub mod logging;
pub mod metadata;

// Re-export commonly used types
pub use api::{ConnectApi, ConnectClient, TaskState};
pub use config::{DeployConfig, TlsMode};
pub use core::{Bundle, BundleArchiver, CancelToken, ContentKind, ManifestBuilder, PathFilter};
pub use deploy::{prepare_bundle, BundleRequest, DeployRequest, Deployer, DeploymentResult};
pub use environment::EnvironmentDescriptor;
pub use error::{Result, RsconnectError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
    }
}
