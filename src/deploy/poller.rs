/*!
 * Deployment task polling
 *
 * The state of a task is always what the server last reported; nothing is
 * inferred locally. Each cycle checks for cancellation, the overall timeout
 * and the poll budget before issuing a request.
 */

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info};

use crate::api::{ConnectApi, TaskState, TaskStatus};
use crate::config::DeployConfig;
use crate::core::cancel::CancelToken;
use crate::error::{Result, RsconnectError};

/// Lines of task output kept for the failure excerpt
pub const LOG_EXCERPT_LINES: usize = 50;

/// How the delay between polls grows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Constant,
    /// Doubles after each poll with no new output, up to `max`
    Exponential { max: Duration },
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub backoff: Backoff,
    pub jitter: bool,
    pub timeout: Duration,
    pub max_polls: Option<u32>,
    /// Long-poll window requested from the server
    pub server_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            backoff: Backoff::Constant,
            jitter: false,
            timeout: Duration::from_secs(24 * 60 * 60),
            max_polls: None,
            server_wait: Duration::from_secs(1),
        }
    }
}

impl PollConfig {
    pub fn from_config(config: &DeployConfig) -> Self {
        let poll = &config.poll;
        Self {
            interval: Duration::from_millis(poll.interval_ms),
            backoff: if poll.exponential_backoff {
                Backoff::Exponential {
                    max: Duration::from_millis(poll.max_interval_ms),
                }
            } else {
                Backoff::Constant
            },
            jitter: poll.jitter,
            timeout: config.task_timeout(),
            max_polls: poll.max_polls,
            server_wait: Duration::from_secs(1),
        }
    }

    /// Delay before the next poll after `quiet` polls without new output
    fn delay(&self, quiet: u32) -> Duration {
        let base = match self.backoff {
            Backoff::Constant => self.interval,
            Backoff::Exponential { max } => self
                .interval
                .saturating_mul(2_u32.saturating_pow(quiet.min(16)))
                .min(max),
        };
        if self.jitter {
            base.mul_f64(rand::rng().random_range(0.9..=1.1))
        } else {
            base
        }
    }
}

/// Pause between polls, and the clock the timeout is measured on
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Sleeps the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Local record of the last state seen for a task
pub trait TaskTracker {
    fn record(&mut self, task_id: &str, state: TaskState) -> Result<()>;
}

/// Tracker for callers that keep no local state
#[derive(Debug, Default)]
pub struct NoopTracker;

impl TaskTracker for NoopTracker {
    fn record(&mut self, _task_id: &str, _state: TaskState) -> Result<()> {
        Ok(())
    }
}

/// Outcome of a finished task
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentResult {
    pub status: TaskState,
    pub task_id: String,
    pub content_guid: Option<String>,
    pub content_url: Option<String>,
    pub dashboard_url: Option<String>,
    /// Server error text for failed tasks
    pub error: Option<String>,
    pub elapsed: Duration,
    pub polls: u32,
    /// Last lines of task output
    pub log_excerpt: Vec<String>,
}

impl DeploymentResult {
    pub fn succeeded(&self) -> bool {
        self.status == TaskState::Success
    }
}

pub struct TaskPoller<'a> {
    api: &'a dyn ConnectApi,
    config: PollConfig,
    cancel: &'a CancelToken,
    sleeper: Box<dyn Sleeper + 'a>,
    content: Option<(String, String)>,
}

impl<'a> TaskPoller<'a> {
    pub fn new(api: &'a dyn ConnectApi, config: PollConfig, cancel: &'a CancelToken) -> Self {
        Self {
            api,
            config,
            cancel,
            sleeper: Box::new(ThreadSleeper),
            content: None,
        }
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'a) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Content the task deploys; its URL is reported on success
    pub fn for_content(mut self, guid: impl Into<String>, url: impl Into<String>) -> Self {
        self.content = Some((guid.into(), url.into()));
        self
    }

    pub fn poll(&self, task_id: &str, tracker: &mut dyn TaskTracker) -> Result<DeploymentResult> {
        let started = self.sleeper.now();
        let mut cursor: Option<u64> = None;
        let mut polls: u32 = 0;
        let mut quiet: u32 = 0;
        let mut last_state = TaskState::Pending;
        let mut excerpt: VecDeque<String> = VecDeque::with_capacity(LOG_EXCERPT_LINES);

        loop {
            if self.cancel.is_cancelled() {
                tracker.record(task_id, last_state)?;
                info!(task = task_id, state = %last_state, "Stopped waiting for task");
                return Err(RsconnectError::UserCancelled {
                    stage: "polling".to_string(),
                });
            }

            let budget_spent = self.config.max_polls.is_some_and(|max| polls >= max);
            if budget_spent || self.elapsed_since(started) >= self.config.timeout {
                tracker.record(task_id, last_state)?;
                return Err(RsconnectError::PollingTimedOut {
                    task_id: task_id.to_string(),
                    last_state,
                    polls,
                    elapsed: self.elapsed_since(started),
                });
            }

            let status =
                self.api
                    .task_status(task_id, cursor, self.config.server_wait.as_secs())?;
            polls += 1;

            for line in &status.output {
                info!(target: "rsconnect::task", "{}", line);
                if excerpt.len() == LOG_EXCERPT_LINES {
                    excerpt.pop_front();
                }
                excerpt.push_back(line.clone());
            }
            if status.last.is_some() {
                cursor = status.last;
            }
            quiet = if status.output.is_empty() { quiet + 1 } else { 0 };

            let state = status.state();
            if state != last_state {
                debug!(task = task_id, from = %last_state, to = %state, "Task state changed");
                tracker.record(task_id, state)?;
            }
            last_state = state;

            if state.is_terminal() {
                return Ok(self.finish(task_id, &status, started, polls, excerpt));
            }

            self.sleeper.sleep(self.config.delay(quiet));
        }
    }

    fn elapsed_since(&self, started: Instant) -> Duration {
        self.sleeper.now().saturating_duration_since(started)
    }

    fn finish(
        &self,
        task_id: &str,
        status: &TaskStatus,
        started: Instant,
        polls: u32,
        excerpt: VecDeque<String>,
    ) -> DeploymentResult {
        let state = status.state();
        let (content_guid, content_url) = match &self.content {
            Some((guid, url)) => (Some(guid.clone()), Some(url.clone())),
            None => (None, None),
        };
        DeploymentResult {
            status: state,
            task_id: task_id.to_string(),
            content_guid,
            content_url: if state == TaskState::Success {
                content_url
            } else {
                None
            },
            dashboard_url: None,
            error: if state == TaskState::Success {
                None
            } else {
                status.error_message()
            },
            elapsed: self.elapsed_since(started),
            polls,
            log_excerpt: excerpt.into(),
        }
    }
}
