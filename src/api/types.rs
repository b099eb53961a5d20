//! Wire types for the Connect server API

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

pub use rsconnect_core_manifest::Integration;

/// Lifecycle of a server-side deployment task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Success,
    Error,
    Aborted,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Running => "RUNNING",
            TaskState::Success => "SUCCESS",
            TaskState::Error => "ERROR",
            TaskState::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Success | TaskState::Error | TaskState::Aborted
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" | "QUEUED" => Ok(TaskState::Pending),
            "RUNNING" | "ACTIVE" => Ok(TaskState::Running),
            "SUCCESS" | "SUCCEEDED" | "COMPLETE" => Ok(TaskState::Success),
            "ERROR" | "FAILED" => Ok(TaskState::Error),
            "ABORTED" | "CANCELLED" | "CANCELED" => Ok(TaskState::Aborted),
            other => Err(format!("unknown task state '{}'", other)),
        }
    }
}

/// One response from `GET v1/tasks/{id}`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TaskStatus {
    #[serde(deserialize_with = "id_string")]
    pub id: String,

    /// Log lines after the requested cursor
    #[serde(default)]
    pub output: Vec<String>,

    #[serde(default)]
    pub finished: bool,

    #[serde(default)]
    pub code: i64,

    #[serde(default)]
    pub error: Option<String>,

    /// Cursor to pass as `first` on the next request
    #[serde(default)]
    pub last: Option<u64>,

    #[serde(default)]
    pub result: Option<serde_json::Value>,

    /// Explicit state, when the server reports one
    #[serde(default)]
    pub state: Option<String>,
}

impl TaskStatus {
    /// State as reported, or derived from the completion fields
    pub fn state(&self) -> TaskState {
        if let Some(state) = self.state.as_deref().and_then(|s| s.parse().ok()) {
            return state;
        }

        if !self.finished {
            let started = !self.output.is_empty() || self.last.unwrap_or(0) > 0;
            return if started {
                TaskState::Running
            } else {
                TaskState::Pending
            };
        }

        match self.error.as_deref().filter(|e| !e.is_empty()) {
            None if self.code == 0 => TaskState::Success,
            Some(error) if error.to_ascii_lowercase().contains("abort") => TaskState::Aborted,
            _ => TaskState::Error,
        }
    }

    /// Server error text, falling back to the exit code
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_deref().filter(|e| !e.is_empty()) {
            Some(error) => Some(error.to_string()),
            None if self.code != 0 => Some(format!("Task exited with status {}.", self.code)),
            None => None,
        }
    }
}

/// Content item as returned by `applications` endpoints
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ContentItem {
    #[serde(deserialize_with = "id_string")]
    pub id: String,

    pub guid: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub url: String,
}

/// Target of a create-or-update call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRequest {
    /// Existing content to update in place; `None` creates new content
    pub app_id: Option<String>,
    pub name: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub guid: Option<String>,
}

/// Result of the two-step server check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub version: Option<String>,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IdRef {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AppConfigResponse {
    pub config_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct EnvironmentVariable<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

/// `{ "error": "...", "code": n }` body sent with failed requests
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ServerErrorBody {
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub code: Option<i64>,
}

/// Ids arrive as integers from older endpoints and strings from newer ones
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u64),
        Text(String),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Number(n) => n.to_string(),
        Repr::Text(s) => s,
    })
}
