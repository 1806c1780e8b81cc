//! Execution backends for documentation examples.
//!
//! A [`Runner`] runs one shell command under a deadline. An [`Environment`]
//! turns an [`Example`] into a script, runs it through the same process
//! primitive, and keeps a ledger of everything it created so `cleanup` can
//! remove it. Backends are chosen from a [`BackendConfig`] in [`backend`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core_types::Example;
use crate::errors::ExecutorError;
use crate::resources::Resource;

pub mod backend;
pub mod detection;
pub mod local_env;
pub mod local_runner;
pub(crate) mod process;
pub mod script;

pub use backend::{build_environment, build_runner};
pub use local_env::LocalEnvironment;
pub use local_runner::LocalRunner;

/// Exit code reported when the process was killed for a timeout or cancel.
pub const TERMINATED_EXIT_CODE: i32 = -1;

/// How a spawned process came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Exited,
    TimedOut,
    Canceled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub environment: String,
    pub working_dir: PathBuf,
    pub success: bool,
    pub error: Option<String>,
    pub termination: Termination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub example_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: Duration,
    pub environment: String,
    pub success: bool,
    pub exit_code: i32,
    pub output: String,
    pub error_output: String,
    pub errors: Vec<String>,
    pub metadata: HashMap<String, String>,
}

impl TestResult {
    pub(crate) fn started(example_id: &str, environment: &str, start_time: DateTime<Utc>) -> Self {
        Self {
            example_id: example_id.to_string(),
            start_time,
            end_time: start_time,
            duration: Duration::ZERO,
            environment: environment.to_string(),
            success: false,
            exit_code: TERMINATED_EXIT_CODE,
            output: String::new(),
            error_output: String::new(),
            errors: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Fail with `err`, tagging the metadata with the failure kind.
    pub(crate) fn fail(mut self, kind: &str, err: &ExecutorError) -> Self {
        self.success = false;
        self.errors.push(err.to_string());
        self.metadata.insert("failure_kind".to_string(), kind.to_string());
        self
    }

    /// Stamp the end time. The end never precedes the start, so `duration`
    /// is always `end_time - start_time`.
    pub(crate) fn finish(mut self) -> Self {
        let (end_time, duration) = elapsed_since(self.start_time);
        self.end_time = end_time;
        self.duration = duration;
        self
    }
}

pub(crate) fn elapsed_since(start: DateTime<Utc>) -> (DateTime<Utc>, Duration) {
    let end = Utc::now().max(start);
    let duration = (end - start).to_std().unwrap_or_default();
    (end, duration)
}

/// Single-command execution primitive.
///
/// Separate runner instances may execute concurrently. `set_working_directory`
/// and `cleanup` take `&mut self`: callers sharing one runner must serialize
/// those themselves; the runner holds no lock.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Environment tag copied into every `RunResult`.
    fn name(&self) -> &str;

    fn working_directory(&self) -> &Path;

    /// Run `command` through the configured shell. A process that starts and
    /// exits non-zero, times out, or is canceled yields `Ok` with
    /// `success == false`; only a failure to start yields `Err`.
    async fn execute(&self, cancel: &CancellationToken, command: &str) -> Result<RunResult, ExecutorError>;

    /// Switch to `path`, creating it if absent.
    fn set_working_directory(&mut self, path: &Path) -> Result<(), ExecutorError>;

    /// Remove the working directory if this runner created it under its temp root.
    async fn cleanup(&mut self) -> Result<(), ExecutorError>;

    /// Pre-flight probe: runs a marker command and checks status and output.
    async fn is_healthy(&self, cancel: &CancellationToken) -> bool;
}

/// Example-level orchestration with side-effect tracking.
///
/// `execute` takes `&mut self` because it appends to an unsynchronized
/// resource list; run separate environments to get parallelism.
#[async_trait]
pub trait Environment: Send {
    fn name(&self) -> &str;

    fn working_directory(&self) -> &Path;

    /// Create and register the workspace. Repeated calls are no-ops.
    async fn setup(&mut self, cancel: &CancellationToken) -> Result<(), ExecutorError>;

    /// Run one example. Per-example failures come back inside the
    /// `TestResult`; `Err` is reserved for a workspace that cannot be set up.
    async fn execute(&mut self, cancel: &CancellationToken, example: &Example) -> Result<TestResult, ExecutorError>;

    /// Remove registered resources newest first, aggregating failures.
    /// Cancellation stops the pass; unprocessed resources stay registered.
    async fn cleanup(&mut self, cancel: &CancellationToken) -> Result<(), ExecutorError>;

    /// Snapshot of resources still registered.
    fn resources(&self) -> Vec<Resource>;
}
