/*!
 * Error types for rsconnect
 */

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::TaskState;

pub type Result<T> = std::result::Result<T, RsconnectError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_DEPLOY_FAILED: i32 = 3;
pub const EXIT_TIMED_OUT: i32 = 4;
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Debug)]
pub enum RsconnectError {
    /// Unreadable path, permission denial or other traversal failure
    Filesystem { path: PathBuf, source: io::Error },

    /// Entrypoint discovery found zero or several candidates
    AmbiguousEntrypoint {
        expected: String,
        candidates: Vec<String>,
    },

    /// Manifest is structurally invalid
    ManifestValidation(String),

    /// DNS, connect, TLS or timeout failure
    Transport { url: String, message: String },

    /// Host answered but is not serving the Connect API
    ServerUnreachable { url: String, reason: String },

    /// Credentials rejected
    Authentication(String),

    /// Server accepted the request but reported a failure
    Application {
        message: String,
        hint: Option<String>,
    },

    /// Another deployment of the same content is running
    DeployInProgress { content: String },

    /// Task never reached a terminal state in time
    PollingTimedOut {
        task_id: String,
        last_state: TaskState,
        polls: u32,
        elapsed: Duration,
    },

    /// Interrupted by the user
    UserCancelled { stage: String },

    /// Configuration error
    Config(String),

    /// I/O error
    Io(io::Error),

    /// Generic error with message
    Other(String),
}

impl RsconnectError {
    pub fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        RsconnectError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn application(message: impl Into<String>, hint: Option<&str>) -> Self {
        RsconnectError::Application {
            message: message.into(),
            hint: hint.map(str::to_string),
        }
    }

    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RsconnectError::Filesystem { .. }
            | RsconnectError::AmbiguousEntrypoint { .. }
            | RsconnectError::ManifestValidation(_)
            | RsconnectError::Authentication(_)
            | RsconnectError::Config(_) => EXIT_FATAL,
            RsconnectError::Application { .. } | RsconnectError::DeployInProgress { .. } => {
                EXIT_DEPLOY_FAILED
            }
            RsconnectError::PollingTimedOut { .. } => EXIT_TIMED_OUT,
            RsconnectError::UserCancelled { .. } => EXIT_CANCELLED,
            _ => EXIT_FAILURE,
        }
    }

    /// Suggested next step for the user, if there is an obvious one
    pub fn hint(&self) -> Option<String> {
        match self {
            RsconnectError::AmbiguousEntrypoint { .. } => {
                Some("Use --entrypoint to name the file or module to run.".to_string())
            }
            RsconnectError::Authentication(_) => Some(
                "The server is reachable but rejected the API key. Check --api-key or CONNECT_API_KEY."
                    .to_string(),
            ),
            RsconnectError::ServerUnreachable { .. } => {
                Some("Check that --server points at a Connect server.".to_string())
            }
            RsconnectError::Transport { .. } => Some(
                "Check the server URL and network. For certificate problems use --cacert or --insecure."
                    .to_string(),
            ),
            RsconnectError::Application { hint, .. } => hint.clone(),
            RsconnectError::DeployInProgress { .. } => {
                Some("Wait for the running deployment or redeploy with --force.".to_string())
            }
            RsconnectError::PollingTimedOut { .. } => Some(
                "The deployment may still finish on the server. Set CONNECT_TASK_TIMEOUT to wait longer."
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            RsconnectError::Filesystem { .. } => ErrorCategory::Filesystem,
            RsconnectError::AmbiguousEntrypoint { .. } | RsconnectError::ManifestValidation(_) => {
                ErrorCategory::Validation
            }
            RsconnectError::Transport { .. } | RsconnectError::ServerUnreachable { .. } => {
                ErrorCategory::Network
            }
            RsconnectError::Authentication(_) => ErrorCategory::Security,
            RsconnectError::Application { .. } | RsconnectError::DeployInProgress { .. } => {
                ErrorCategory::Server
            }
            RsconnectError::PollingTimedOut { .. } => ErrorCategory::Timeout,
            RsconnectError::UserCancelled { .. } => ErrorCategory::Cancelled,
            RsconnectError::Config(_) => ErrorCategory::Configuration,
            RsconnectError::Io(_) => ErrorCategory::IoError,
            RsconnectError::Other(_) => ErrorCategory::Unknown,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Traversal and permission errors
    Filesystem,
    /// Entrypoint and manifest errors
    Validation,
    /// Configuration errors
    Configuration,
    /// Transport-level errors
    Network,
    /// Authentication/authorization errors
    Security,
    /// Errors reported by the server
    Server,
    /// Task polling window exceeded
    Timeout,
    /// User interrupt
    Cancelled,
    /// I/O operation errors
    IoError,
    /// Uncategorized errors
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Filesystem => write!(f, "filesystem"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Security => write!(f, "security"),
            ErrorCategory::Server => write!(f, "server"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Cancelled => write!(f, "cancelled"),
            ErrorCategory::IoError => write!(f, "io"),
            ErrorCategory::Unknown => write!(f, "unknown"),
        }
    }
}

impl fmt::Display for RsconnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RsconnectError::Filesystem { path, source } => {
                write!(f, "Cannot read {}: {}", path.display(), source)
            }
            RsconnectError::AmbiguousEntrypoint {
                expected,
                candidates,
            } => {
                if candidates.is_empty() {
                    write!(f, "Could not determine the entrypoint: no {} found", expected)
                } else {
                    write!(
                        f,
                        "Could not determine the entrypoint: several {} found ({})",
                        expected,
                        candidates.join(", ")
                    )
                }
            }
            RsconnectError::ManifestValidation(msg) => {
                write!(f, "Invalid manifest: {}", msg)
            }
            RsconnectError::Transport { url, message } => {
                write!(f, "Could not reach {}: {}", url, message)
            }
            RsconnectError::ServerUnreachable { url, reason } => {
                write!(f, "{} does not appear to be a Connect server: {}", url, reason)
            }
            RsconnectError::Authentication(msg) => {
                write!(f, "Authentication failed: {}", msg)
            }
            RsconnectError::Application { message, .. } => {
                write!(f, "Server error: {}", message)
            }
            RsconnectError::DeployInProgress { content } => {
                write!(f, "A deployment of {} is already in progress", content)
            }
            RsconnectError::PollingTimedOut {
                task_id,
                last_state,
                polls,
                elapsed,
            } => {
                write!(
                    f,
                    "Task {} did not finish within {}s ({} polls, last seen {})",
                    task_id,
                    elapsed.as_secs(),
                    polls,
                    last_state
                )
            }
            RsconnectError::UserCancelled { stage } => {
                write!(f, "Cancelled during {}", stage)
            }
            RsconnectError::Config(msg) => {
                write!(f, "Configuration error: {}", msg)
            }
            RsconnectError::Io(err) => {
                write!(f, "I/O error: {}", err)
            }
            RsconnectError::Other(msg) => {
                write!(f, "{}", msg)
            }
        }
    }
}

impl std::error::Error for RsconnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RsconnectError::Io(err) => Some(err),
            RsconnectError::Filesystem { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for RsconnectError {
    fn from(err: io::Error) -> Self {
        RsconnectError::Io(err)
    }
}

impl From<serde_json::Error> for RsconnectError {
    fn from(err: serde_json::Error) -> Self {
        RsconnectError::Other(format!("JSON error: {}", err))
    }
}

impl From<rsconnect_core_manifest::Error> for RsconnectError {
    fn from(err: rsconnect_core_manifest::Error) -> Self {
        match err {
            rsconnect_core_manifest::Error::Io(io_err) => RsconnectError::Io(io_err),
            other => RsconnectError::ManifestValidation(other.to_string()),
        }
    }
}
