/*!
 * Configuration types for rsconnect
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, RsconnectError};

pub const ENV_SERVER: &str = "CONNECT_SERVER";
pub const ENV_API_KEY: &str = "CONNECT_API_KEY";
pub const ENV_REQUEST_TIMEOUT: &str = "CONNECT_REQUEST_TIMEOUT";
pub const ENV_TASK_TIMEOUT: &str = "CONNECT_TASK_TIMEOUT";
pub const ENV_BUILD_DIR: &str = "CONNECT_CONTENT_BUILD_DIR";

/// Main configuration for bundling and deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Server base URL, e.g. `https://connect.example.com`
    #[serde(default)]
    pub server: Option<String>,

    /// API key; never written back to disk
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Certificate verification mode
    #[serde(default)]
    pub tls: TlsMode,

    /// Per-request network timeout in seconds (0 = no timeout)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Overall wait for a deployment task in seconds
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,

    /// Task polling cadence
    #[serde(default)]
    pub poll: PollSettings,

    /// Maximum concurrent deployments in batch mode
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Directory for local task tracking state
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    /// Skip the GET check against the deployed content
    #[serde(default)]
    pub no_verify: bool,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    #[serde(default)]
    pub verbose: bool,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            server: None,
            api_key: None,
            tls: TlsMode::default(),
            request_timeout_secs: default_request_timeout(),
            task_timeout_secs: default_task_timeout(),
            poll: PollSettings::default(),
            max_in_flight: default_max_in_flight(),
            build_dir: default_build_dir(),
            no_verify: false,
            log_level: LogLevel::Info,
            log_file: None,
            verbose: false,
        }
    }
}

/// How server certificates are checked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum TlsMode {
    /// Platform trust store
    #[default]
    System,
    /// Additional PEM bundle of trusted roots
    CaBundle { path: PathBuf },
    /// Accept any certificate
    Insecure,
}

impl TlsMode {
    /// Build from the `--insecure`/`--cacert` flag pair
    pub fn from_flags(insecure: bool, cacert: Option<PathBuf>) -> Result<Self> {
        match (insecure, cacert) {
            (true, Some(_)) => Err(RsconnectError::Config(
                "--insecure and --cacert cannot be used together".to_string(),
            )),
            (true, None) => Ok(TlsMode::Insecure),
            (false, Some(path)) => Ok(TlsMode::CaBundle { path }),
            (false, None) => Ok(TlsMode::System),
        }
    }
}

/// Polling cadence for deployment tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollSettings {
    /// Delay between status requests in milliseconds
    #[serde(default = "default_poll_interval")]
    pub interval_ms: u64,

    /// Grow the delay after every poll that brings no new output
    #[serde(default)]
    pub exponential_backoff: bool,

    /// Upper bound on the delay in milliseconds
    #[serde(default = "default_poll_max_interval")]
    pub max_interval_ms: u64,

    /// Randomize delays by up to 10%
    #[serde(default)]
    pub jitter: bool,

    /// Give up after this many polls
    #[serde(default)]
    pub max_polls: Option<u32>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval(),
            exponential_backoff: false,
            max_interval_ms: default_poll_max_interval(),
            jitter: false,
            max_polls: None,
        }
    }
}

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_request_timeout() -> u64 {
    300
}

fn default_task_timeout() -> u64 {
    24 * 60 * 60
}

fn default_max_in_flight() -> usize {
    4
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("rsconnect-build")
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_poll_max_interval() -> u64 {
    10_000
}

impl DeployConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| RsconnectError::filesystem(path, e))?;
        toml::from_str(&contents).map_err(|e| {
            RsconnectError::Config(format!("{}: {}", path.display(), e))
        })
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| RsconnectError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(server) = lookup(ENV_SERVER).filter(|s| !s.is_empty()) {
            self.server = Some(server);
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|s| !s.is_empty()) {
            self.api_key = Some(key);
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT) {
            self.request_timeout_secs = parse_seconds(ENV_REQUEST_TIMEOUT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TASK_TIMEOUT) {
            let secs = parse_seconds(ENV_TASK_TIMEOUT, &raw)?;
            if secs == 0 {
                return Err(RsconnectError::Config(format!(
                    "{} must be greater than 0",
                    ENV_TASK_TIMEOUT
                )));
            }
            self.task_timeout_secs = secs;
        }
        if let Some(dir) = lookup(ENV_BUILD_DIR).filter(|s| !s.is_empty()) {
            self.build_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Request timeout, `None` when disabled
    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

fn parse_seconds(name: &str, raw: &str) -> Result<u64> {
    raw.trim().parse::<u64>().map_err(|_| {
        RsconnectError::Config(format!(
            "{} must be a whole number of seconds, got '{}'",
            name, raw
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = DeployConfig::default();
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.task_timeout(), Duration::from_secs(86_400));
        assert_eq!(config.tls, TlsMode::System);
        assert_eq!(config.poll.interval_ms, 1000);
        assert_eq!(config.max_in_flight, 4);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = DeployConfig::default();
        config
            .apply_env_from(env(&[
                (ENV_REQUEST_TIMEOUT, "0"),
                (ENV_TASK_TIMEOUT, "120"),
                (ENV_BUILD_DIR, "/var/tmp/builds"),
                (ENV_SERVER, "https://connect.example.com"),
            ]))
            .unwrap();
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.task_timeout(), Duration::from_secs(120));
        assert_eq!(config.build_dir, PathBuf::from("/var/tmp/builds"));
        assert_eq!(config.server.as_deref(), Some("https://connect.example.com"));
    }

    #[test]
    fn test_invalid_timeouts_rejected() {
        let mut config = DeployConfig::default();
        assert!(config
            .apply_env_from(env(&[(ENV_REQUEST_TIMEOUT, "-5")]))
            .is_err());
        assert!(config
            .apply_env_from(env(&[(ENV_TASK_TIMEOUT, "0")]))
            .is_err());
        assert!(config
            .apply_env_from(env(&[(ENV_TASK_TIMEOUT, "soon")]))
            .is_err());
    }

    #[test]
    fn test_tls_flags() {
        assert_eq!(TlsMode::from_flags(false, None).unwrap(), TlsMode::System);
        assert_eq!(TlsMode::from_flags(true, None).unwrap(), TlsMode::Insecure);
        assert_eq!(
            TlsMode::from_flags(false, Some(PathBuf::from("ca.pem"))).unwrap(),
            TlsMode::CaBundle {
                path: PathBuf::from("ca.pem")
            }
        );
        assert!(TlsMode::from_flags(true, Some(PathBuf::from("ca.pem"))).is_err());
    }

    #[test]
    fn test_toml_round_trip_omits_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsconnect.toml");

        let config = DeployConfig {
            server: Some("https://connect.example.com".to_string()),
            api_key: Some("secret".to_string()),
            tls: TlsMode::CaBundle {
                path: PathBuf::from("/etc/ssl/corp.pem"),
            },
            ..Default::default()
        };
        config.to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("secret"));

        let loaded = DeployConfig::from_file(&path).unwrap();
        assert_eq!(loaded.server, config.server);
        assert_eq!(loaded.tls, config.tls);
        assert_eq!(loaded.api_key, None);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: DeployConfig = toml::from_str(
            r#"
            server = "https://connect.example.com"
            task_timeout_secs = 600

            [poll]
            exponential_backoff = true
            "#,
        )
        .unwrap();
        assert_eq!(config.task_timeout_secs, 600);
        assert_eq!(config.request_timeout_secs, 300);
        assert!(config.poll.exponential_backoff);
        assert_eq!(config.poll.max_interval_ms, 10_000);
    }
}
