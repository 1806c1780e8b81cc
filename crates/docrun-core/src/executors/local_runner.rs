// src/executors/local_runner.rs
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{process, RunResult, Runner};
use crate::config::LocalConfig;
use crate::errors::ExecutorError;

const HEALTH_MARKER: &str = "docrun-runner-ok";

/// Runs shell commands directly on the host, inside a working directory.
pub struct LocalRunner {
    name: String,
    config: LocalConfig,
    working_dir: PathBuf,
    created_working_dir: bool,
}

impl LocalRunner {
    /// Build a runner and acquire its working directory. Without an explicit
    /// directory a fresh one is created under `config.temp_root`.
    pub fn new(config: LocalConfig) -> Result<Self, ExecutorError> {
        Self::named("local", config)
    }

    pub(crate) fn named(name: &str, config: LocalConfig) -> Result<Self, ExecutorError> {
        config.validate()?;
        if let Some(cpu) = config.resource_limits.max_cpu_percent {
            log::warn!(
                "max_cpu_percent={} is recognized but not enforced by the local runner",
                cpu
            );
        }

        let working_dir = config
            .working_directory
            .clone()
            .unwrap_or_else(|| config.temp_root.join(format!("docrun-run-{}", Uuid::new_v4())));

        let mut runner = Self {
            name: name.to_string(),
            config,
            working_dir: PathBuf::new(),
            created_working_dir: false,
        };
        runner.set_working_directory(&working_dir)?;
        Ok(runner)
    }

    fn is_ephemeral(&self) -> bool {
        self.created_working_dir && self.working_dir.starts_with(&self.config.temp_root)
    }
}

#[async_trait]
impl Runner for LocalRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn working_directory(&self) -> &Path {
        &self.working_dir
    }

    async fn execute(&self, cancel: &CancellationToken, command: &str) -> Result<RunResult, ExecutorError> {
        let mut cmd = Command::new(&self.config.shell);
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .envs(self.config.environment.clone());

        let timeout = self.config.timeout();
        let out = process::run(cmd, command, timeout, &self.config.resource_limits, cancel).await?;

        Ok(RunResult {
            command: command.to_string(),
            success: out.success(),
            error: out.error(timeout).map(|e| e.to_string()),
            exit_code: out.exit_code,
            termination: out.termination,
            stdout: out.stdout,
            stderr: out.stderr,
            duration: out.duration,
            start_time: out.start_time,
            end_time: out.end_time,
            environment: self.name.clone(),
            working_dir: self.working_dir.clone(),
        })
    }

    fn set_working_directory(&mut self, path: &Path) -> Result<(), ExecutorError> {
        if path.is_dir() {
            log::debug!("Using existing working directory {}", path.display());
            self.release_previous(path);
            self.working_dir = path.to_path_buf();
            self.created_working_dir = false;
            return Ok(());
        }

        std::fs::create_dir_all(path).map_err(|e| ExecutorError::Setup {
            path: path.to_path_buf(),
            message: format!("cannot create working directory: {}", e),
        })?;
        log::debug!("Created working directory {}", path.display());
        self.release_previous(path);
        self.working_dir = path.to_path_buf();
        self.created_working_dir = true;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), ExecutorError> {
        if !self.is_ephemeral() {
            log::debug!(
                "Leaving {} in place: not created by this runner under {}",
                self.working_dir.display(),
                self.config.temp_root.display()
            );
            return Ok(());
        }

        match tokio::fs::remove_dir_all(&self.working_dir).await {
            Ok(()) => log::debug!("Removed working directory {}", self.working_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ExecutorError::Io(format!(
                    "Failed to remove {}: {}",
                    self.working_dir.display(),
                    e
                )))
            }
        }
        self.created_working_dir = false;
        Ok(())
    }

    async fn is_healthy(&self, cancel: &CancellationToken) -> bool {
        match self.execute(cancel, &format!("echo {}", HEALTH_MARKER)).await {
            Ok(result) if result.success && result.stdout.contains(HEALTH_MARKER) => true,
            Ok(result) => {
                log::warn!(
                    "Health probe for runner '{}' failed: exit {} stdout {:?}",
                    self.name,
                    result.exit_code,
                    result.stdout
                );
                false
            }
            Err(e) => {
                log::warn!("Health probe for runner '{}' could not start: {}", self.name, e);
                false
            }
        }
    }
}

impl LocalRunner {
    /// Drop an empty directory this runner created before switching away from it.
    fn release_previous(&self, next: &Path) {
        if self.is_ephemeral() && self.working_dir != next {
            if let Err(e) = std::fs::remove_dir(&self.working_dir) {
                log::debug!("Kept previous working directory {}: {}", self.working_dir.display(), e);
            }
        }
    }
}
