/*!
 * Local deployment metadata
 *
 * Two stores live on the publisher's machine:
 *
 * - [`AppStore`] remembers, per server, which remote content a directory was
 *   deployed to, so a redeploy updates that content in place.
 * - [`TaskStateStore`] keeps the last task state seen for each content item,
 *   so an interrupted or timed-out wait leaves an honest record behind.
 *
 * Both are small JSON documents replaced with write-then-rename.
 */

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::api::TaskState;
use crate::core::atomic::atomic_write;
use crate::deploy::poller::TaskTracker;
use crate::error::{Result, RsconnectError};

/// Bumped on incompatible changes to the app store layout
pub const APP_STORE_VERSION: u32 = 1;

pub const METADATA_DIR: &str = "rsconnect-python";
pub const TASKS_FILE: &str = "tasks.json";

/// Serializes read-modify-write cycles between concurrent deployments
static STORE_LOCK: Mutex<()> = Mutex::new(());

/// Where one directory was deployed on one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    pub server_url: String,
    pub filename: String,
    pub app_url: String,
    pub app_id: String,
    pub app_guid: String,
    #[serde(default)]
    pub title: Option<String>,
    pub app_mode: String,
    #[serde(default = "default_store_version")]
    pub app_store_version: u32,
}

fn default_store_version() -> u32 {
    APP_STORE_VERSION
}

/// Deployment records for one content directory, keyed by server URL
#[derive(Debug, Clone)]
pub struct AppStore {
    primary: PathBuf,
    fallback: Option<PathBuf>,
}

impl AppStore {
    /// Store for `content_dir`: beside the content, or in the user config
    /// directory when the content directory is not writable
    pub fn for_content(content_dir: &Path) -> Self {
        let absolute = content_dir
            .canonicalize()
            .unwrap_or_else(|_| content_dir.to_path_buf());
        let name = absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "content".to_string());

        let primary = absolute.join(METADATA_DIR).join(format!("{}.json", name));
        let fallback = dirs::config_dir().map(|dir| {
            let digest = Sha256::digest(absolute.to_string_lossy().as_bytes());
            dir.join(METADATA_DIR)
                .join("applications")
                .join(format!("{}.json", hex::encode(digest)))
        });
        Self::with_paths(primary, fallback)
    }

    pub fn with_paths(primary: PathBuf, fallback: Option<PathBuf>) -> Self {
        Self { primary, fallback }
    }

    pub fn get(&self, server_url: &str) -> Result<Option<AppRecord>> {
        Ok(self.load()?.remove(&server_key(server_url)))
    }

    /// Every record, ordered by server URL
    pub fn all(&self) -> Result<Vec<AppRecord>> {
        Ok(self.load()?.into_values().collect())
    }

    /// Remember `record`, replacing any earlier one for the same server
    pub fn set(&self, mut record: AppRecord) -> Result<PathBuf> {
        let _guard = STORE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        record.server_url = server_key(&record.server_url);
        record.app_store_version = APP_STORE_VERSION;

        let mut records = self.load()?;
        records.insert(record.server_url.clone(), record);
        let data = serde_json::to_vec_pretty(&records)?;

        match atomic_write(&self.primary, &data) {
            Ok(()) => Ok(self.primary.clone()),
            Err(primary_err) => {
                let Some(fallback) = &self.fallback else {
                    return Err(primary_err);
                };
                warn!(
                    path = %self.primary.display(),
                    error = %primary_err,
                    "Could not save deployment record beside the content; using {}",
                    fallback.display()
                );
                atomic_write(fallback, &data)?;
                Ok(fallback.clone())
            }
        }
    }

    /// File the records are read from, if any exists yet
    pub fn location(&self) -> Option<&Path> {
        std::iter::once(&self.primary)
            .chain(self.fallback.as_ref())
            .find(|path| path.is_file())
            .map(PathBuf::as_path)
    }

    fn load(&self) -> Result<BTreeMap<String, AppRecord>> {
        match self.location() {
            Some(path) => {
                debug!(path = %path.display(), "Loading deployment records");
                read_json(path)
            }
            None => Ok(BTreeMap::new()),
        }
    }
}

/// Last known state of the deployment task for one content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub server_url: String,
    pub task_id: String,
    pub state: TaskState,
    /// RFC 3339 timestamp of the last update
    pub updated_at: String,
}

/// `tasks.json` in the build directory
#[derive(Debug, Clone)]
pub struct TaskStateStore {
    path: PathBuf,
    server_url: String,
    content_key: String,
}

impl TaskStateStore {
    pub fn new(build_dir: &Path, server_url: &str, content_key: impl Into<String>) -> Self {
        Self {
            path: build_dir.join(TASKS_FILE),
            server_url: server_key(server_url),
            content_key: content_key.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Result<Option<TaskRecord>> {
        Ok(Self::load(&self.path)?.remove(&self.content_key))
    }

    pub fn load(path: &Path) -> Result<BTreeMap<String, TaskRecord>> {
        if path.is_file() {
            read_json(path)
        } else {
            Ok(BTreeMap::new())
        }
    }
}

impl TaskTracker for TaskStateStore {
    fn record(&mut self, task_id: &str, state: TaskState) -> Result<()> {
        let _guard = STORE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut records = Self::load(&self.path)?;
        records.insert(
            self.content_key.clone(),
            TaskRecord {
                server_url: self.server_url.clone(),
                task_id: task_id.to_string(),
                state,
                updated_at: Utc::now().to_rfc3339(),
            },
        );
        atomic_write(&self.path, &serde_json::to_vec_pretty(&records)?)
    }
}

fn server_key(server_url: &str) -> String {
    server_url.trim().trim_end_matches('/').to_string()
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|e| RsconnectError::filesystem(path, e))?;
    serde_json::from_str(&text).map_err(|e| {
        RsconnectError::Config(format!("{} is corrupt: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn record(server: &str, id: &str) -> AppRecord {
        AppRecord {
            server_url: server.to_string(),
            filename: "/work/app".to_string(),
            app_url: format!("{}/content/guid-{}/", server, id),
            app_id: id.to_string(),
            app_guid: format!("guid-{}", id),
            title: Some("Sales".to_string()),
            app_mode: "python-api".to_string(),
            app_store_version: 0,
        }
    }

    #[test]
    fn test_records_keyed_by_server() {
        let temp = TempDir::new().unwrap();
        let store = AppStore::with_paths(temp.path().join("rsconnect-python/app.json"), None);
        assert!(store.location().is_none());
        assert!(store.all().unwrap().is_empty());

        store.set(record("https://a.example.com/", "1")).unwrap();
        store.set(record("https://b.example.com", "2")).unwrap();
        store.set(record("https://a.example.com", "3")).unwrap();

        let a = store.get("https://a.example.com").unwrap().unwrap();
        assert_eq!(a.app_id, "3");
        assert_eq!(a.app_store_version, APP_STORE_VERSION);
        let all = store.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].server_url, "https://a.example.com");
        assert_eq!(store.location(), Some(temp.path().join("rsconnect-python/app.json").as_path()));
        assert!(store.get("https://c.example.com").unwrap().is_none());
    }

    #[test]
    fn test_no_temp_files_left() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("rsconnect-python");
        let store = AppStore::with_paths(dir.join("app.json"), None);
        store.set(record("https://a.example.com", "1")).unwrap();
        store.set(record("https://a.example.com", "2")).unwrap();

        let names: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["app.json"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_falls_back_when_primary_unwritable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let locked = temp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
        let fallback = temp.path().join("config/applications/abc.json");

        let store = AppStore::with_paths(
            locked.join("rsconnect-python/app.json"),
            Some(fallback.clone()),
        );
        let written = store.set(record("https://a.example.com", "1"));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // Running as root ignores directory permissions
        let written = written.unwrap();
        if written == fallback {
            assert_eq!(store.get("https://a.example.com").unwrap().unwrap().app_id, "1");
        }
    }

    #[test]
    fn test_for_content_uses_directory_name() {
        let temp = TempDir::new().unwrap();
        let content = temp.path().join("sales-api");
        fs::create_dir(&content).unwrap();

        let store = AppStore::for_content(&content);
        let path = store.set(record("https://a.example.com", "1")).unwrap();
        assert!(path.ends_with("sales-api/rsconnect-python/sales-api.json"));
    }

    #[test]
    fn test_task_state_store() {
        let temp = TempDir::new().unwrap();
        let build = temp.path().join("rsconnect-build");
        let mut store = TaskStateStore::new(&build, "https://a.example.com/", "guid-1");
        let mut other = TaskStateStore::new(&build, "https://a.example.com", "guid-2");

        store.record("task-9", TaskState::Running).unwrap();
        other.record("task-10", TaskState::Success).unwrap();

        let saved = store.get().unwrap().unwrap();
        assert_eq!(saved.state, TaskState::Running);
        assert_eq!(saved.task_id, "task-9");
        assert_eq!(saved.server_url, "https://a.example.com");
        assert_eq!(TaskStateStore::load(store.path()).unwrap().len(), 2);

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"RUNNING\""));
    }

    #[test]
    fn test_corrupt_store_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app.json");
        fs::write(&path, "{not json").unwrap();
        let store = AppStore::with_paths(path, None);
        assert!(matches!(
            store.get("https://a.example.com"),
            Err(RsconnectError::Config(_))
        ));
    }
}
