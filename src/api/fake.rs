//! Scripted in-memory server used by deploy and poller tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::client::ConnectApi;
use super::types::{
    ContentItem, ContentRequest, Integration, ServerSettings, TaskState, TaskStatus, User,
};
use crate::core::archive::Bundle;
use crate::error::{Result, RsconnectError};

pub(crate) fn task(state: TaskState, output: &[&str], last: u64) -> TaskStatus {
    TaskStatus {
        id: "task-1".to_string(),
        output: output.iter().map(|s| s.to_string()).collect(),
        finished: state.is_terminal(),
        code: if state == TaskState::Success { 0 } else { 1 },
        error: match state {
            TaskState::Error => Some("Build failed".to_string()),
            TaskState::Aborted => Some("Task aborted".to_string()),
            _ => None,
        },
        last: Some(last),
        result: None,
        state: Some(state.to_string()),
    }
}

#[derive(Default)]
pub(crate) struct FakeApi {
    pub script: Mutex<VecDeque<TaskStatus>>,
    /// Returned once the script runs out
    pub steady: Option<TaskStatus>,
    pub task_requests: AtomicU32,
    pub cursors: Mutex<Vec<Option<u64>>>,
    pub uploads: Mutex<Vec<Vec<String>>>,
    pub created: Mutex<Vec<ContentRequest>>,
    pub env_vars: Mutex<Vec<(String, String)>>,
    pub integrations: Vec<Integration>,
    pub deploy_conflict: bool,
    pub reject_key: bool,
    pub content_fails: bool,
}

impl FakeApi {
    pub fn scripted(states: Vec<TaskStatus>) -> Self {
        Self {
            script: Mutex::new(states.into()),
            ..Self::default()
        }
    }

    pub fn always(status: TaskStatus) -> Self {
        Self {
            steady: Some(status),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> u32 {
        self.task_requests.load(Ordering::SeqCst)
    }
}

impl ConnectApi for FakeApi {
    fn server_settings(&self) -> Result<ServerSettings> {
        Ok(ServerSettings {
            version: Some("2024.08.0".to_string()),
        })
    }

    fn me(&self) -> Result<User> {
        if self.reject_key {
            return Err(RsconnectError::Authentication(
                "The specified API key is not valid.".to_string(),
            ));
        }
        Ok(User {
            username: "publisher".to_string(),
            guid: None,
        })
    }

    fn create_or_update_content(&self, request: &ContentRequest) -> Result<ContentItem> {
        self.created.lock().unwrap().push(request.clone());
        let id = request.app_id.clone().unwrap_or_else(|| "17".to_string());
        Ok(ContentItem {
            guid: format!("guid-{}", id),
            url: format!("https://connect.example.com/content/guid-{}/", id),
            name: request.name.clone(),
            title: request.title.clone(),
            id,
        })
    }

    fn upload_bundle(&self, _content_id: &str, bundle: &Bundle) -> Result<String> {
        self.uploads.lock().unwrap().push(bundle.entries().to_vec());
        Ok("bundle-1".to_string())
    }

    fn deploy(&self, content_id: &str, _bundle_id: &str, force: bool) -> Result<String> {
        if self.deploy_conflict && !force {
            return Err(RsconnectError::DeployInProgress {
                content: content_id.to_string(),
            });
        }
        Ok("task-1".to_string())
    }

    fn set_environment_variables(&self, _guid: &str, vars: &[(String, String)]) -> Result<()> {
        self.env_vars.lock().unwrap().extend_from_slice(vars);
        Ok(())
    }

    fn task_status(&self, _task_id: &str, first: Option<u64>, _wait: u64) -> Result<TaskStatus> {
        self.task_requests.fetch_add(1, Ordering::SeqCst);
        self.cursors.lock().unwrap().push(first);
        let next = self.script.lock().unwrap().pop_front();
        next.or_else(|| self.steady.clone())
            .ok_or_else(|| RsconnectError::Other("task script exhausted".to_string()))
    }

    fn app_config(&self, content_id: &str) -> Result<String> {
        Ok(format!("https://connect.example.com/connect/#/apps/{}", content_id))
    }

    fn verify_content(&self, _guid: &str) -> Result<()> {
        if self.content_fails {
            return Err(RsconnectError::application("content returned 502", None));
        }
        Ok(())
    }

    fn integrations(&self) -> Result<Vec<Integration>> {
        Ok(self.integrations.clone())
    }
}
