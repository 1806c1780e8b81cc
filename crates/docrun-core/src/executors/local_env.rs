//! Host-local environment: scripts are written into a private workspace and
//! run with the matching interpreter.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{detection, process, script, Environment, Termination, TestResult};
use crate::config::LocalConfig;
use crate::core_types::{Example, Language};
use crate::errors::{CleanupFailure, ExecutorError};
use crate::resources::{Resource, ResourceLedger, ResourceType};

pub struct LocalEnvironment {
    name: String,
    config: LocalConfig,
    working_dir: PathBuf,
    ready: bool,
    resources: ResourceLedger,
    /// Copied into every `TestResult`, e.g. to mark a delegated backend.
    tags: HashMap<String, String>,
}

impl LocalEnvironment {
    pub fn new(config: LocalConfig) -> Result<Self, ExecutorError> {
        config.validate()?;
        if let Some(cpu) = config.resource_limits.max_cpu_percent {
            log::warn!(
                "max_cpu_percent={} is recognized but not enforced by the local environment",
                cpu
            );
        }

        let working_dir = config
            .working_directory
            .clone()
            .unwrap_or_else(|| config.temp_root.join(format!("docrun-env-{}", Uuid::new_v4())));

        Ok(Self {
            name: "local".to_string(),
            config,
            working_dir,
            ready: false,
            resources: ResourceLedger::new(),
            tags: HashMap::new(),
        })
    }

    pub(crate) fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub(crate) fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    fn base_result(&self, example: &Example) -> TestResult {
        let mut result = TestResult::started(&example.id, &self.name, Utc::now());
        result.metadata.extend(self.tags.clone());
        result.metadata.insert("language".to_string(), example.language.clone());
        result
            .metadata
            .insert("working_dir".to_string(), self.working_dir.to_string_lossy().into_owned());
        result
    }

    async fn write_script(&mut self, example: &Example, language: Language) -> Result<PathBuf, ExecutorError> {
        let path = self
            .working_dir
            .join(script::file_name(&example.id, language, Utc::now()));
        let body = script::wrap(language, &example.code);

        if let Err(e) = tokio::fs::write(&path, body).await {
            // A partial file may have been left behind.
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(rm) if rm.kind() == std::io::ErrorKind::NotFound => {}
                Err(rm) => log::debug!("Partial script {} left in place: {}", path.display(), rm),
            }
            return Err(ExecutorError::ScriptWrite {
                path,
                message: e.to_string(),
            });
        }

        self.resources.record(
            Resource::file(&path)
                .with_metadata("purpose", "script")
                .with_metadata("example_id", example.id.clone())
                .with_metadata("language", language.as_str()),
        );
        Ok(path)
    }

    fn record_side_effects(&mut self, example: &Example, result: &mut TestResult) {
        let detected = detection::scan(&example.code);
        result.metadata.extend(detection::as_metadata(&detected));

        for kind in detected {
            self.resources.record(
                Resource::new(ResourceType::SideEffect, format!("{}#{}", example.id, kind.key()))
                    .with_metadata("purpose", kind.key())
                    .with_metadata("example_id", example.id.clone())
                    .with_metadata("language", example.language.clone())
                    .with_metadata("detection", "heuristic"),
            );
        }
    }

    async fn release(&self, resource: &Resource) -> Result<(), CleanupFailure> {
        let removal = match resource.resource_type {
            ResourceType::File => tokio::fs::remove_file(resource.path()).await,
            ResourceType::Directory if resource.path() == self.working_dir => {
                tokio::fs::remove_dir_all(resource.path()).await
            }
            ResourceType::Directory => {
                log::warn!(
                    "Not removing directory {}: not this environment's workspace",
                    resource.identifier
                );
                Ok(())
            }
            ResourceType::SideEffect => {
                log::debug!("Releasing heuristic record {}", resource.identifier);
                Ok(())
            }
        };

        match removal {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CleanupFailure {
                identifier: resource.identifier.clone(),
                message: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Environment for LocalEnvironment {
    fn name(&self) -> &str {
        &self.name
    }

    fn working_directory(&self) -> &Path {
        &self.working_dir
    }

    async fn setup(&mut self, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        if self.ready && self.working_dir.is_dir() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(ExecutorError::Canceled);
        }

        let existed = self.working_dir.is_dir();
        tokio::fs::create_dir_all(&self.working_dir)
            .await
            .map_err(|e| ExecutorError::Setup {
                path: self.working_dir.clone(),
                message: format!("cannot create workspace: {}", e),
            })?;

        let identifier = self.working_dir.to_string_lossy().into_owned();
        if self.resources.contains(ResourceType::Directory, &identifier) {
            log::debug!("Workspace {} already registered", identifier);
        } else if existed {
            log::info!(
                "Using existing workspace {}; it will not be removed on cleanup",
                self.working_dir.display()
            );
        } else {
            self.resources.record(
                Resource::directory(&self.working_dir)
                    .with_metadata("purpose", "workspace")
                    .with_metadata("environment", self.name.clone()),
            );
            log::info!("Created workspace {}", self.working_dir.display());
        }

        self.ready = true;
        Ok(())
    }

    async fn execute(&mut self, cancel: &CancellationToken, example: &Example) -> Result<TestResult, ExecutorError> {
        // Rejected before setup so a non-executable example never creates anything.
        let language = match Language::from_tag(&example.language) {
            Ok(language) => language,
            Err(e) => {
                log::info!("Skipping example '{}': {}", example.id, e);
                return Ok(self.base_result(example).fail("unsupported_language", &e).finish());
            }
        };

        if cancel.is_cancelled() {
            return Ok(self
                .base_result(example)
                .fail("canceled", &ExecutorError::Canceled)
                .finish());
        }

        self.setup(cancel).await?;
        let mut result = self.base_result(example);

        let path = match self.write_script(example, language).await {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Example '{}': {}", example.id, e);
                return Ok(result.fail("script_write", &e).finish());
            }
        };
        result
            .metadata
            .insert("script_path".to_string(), path.to_string_lossy().into_owned());

        let mut cmd = script::command_for(language, &path);
        cmd.current_dir(&self.working_dir)
            .envs(self.config.environment.clone());

        let timeout = self.config.timeout();
        let display = format!("{} {}", language, path.display());
        match process::run(cmd, &display, timeout, &self.config.resource_limits, cancel).await {
            Ok(out) => {
                result.exit_code = out.exit_code;
                result.success = out.success();
                if let Some(e) = out.error(timeout) {
                    let kind = match out.termination {
                        Termination::TimedOut => "timeout",
                        Termination::Canceled => "canceled",
                        Termination::Exited => "exit_status",
                    };
                    result = result.fail(kind, &e);
                }
                result.output = out.stdout;
                result.error_output = out.stderr;
            }
            Err(e) => {
                log::warn!("Example '{}' could not start: {}", example.id, e);
                result = result.fail("launch", &e);
            }
        }

        self.record_side_effects(example, &mut result);

        let result = result.finish();
        log::debug!(
            "Example '{}' finished: success={} exit={} in {:?}",
            example.id,
            result.success,
            result.exit_code,
            result.duration
        );
        Ok(result)
    }

    async fn cleanup(&mut self, cancel: &CancellationToken) -> Result<(), ExecutorError> {
        let mut failures = Vec::new();
        let mut kept = Vec::new();
        let mut interrupted = false;

        let mut pending = self.resources.take_newest_first().into_iter();
        while let Some(resource) = pending.next() {
            if cancel.is_cancelled() {
                kept.push(resource);
                kept.extend(pending.by_ref());
                interrupted = true;
                break;
            }
            if let Err(failure) = self.release(&resource).await {
                log::warn!("Cleanup of {} failed: {}", failure.identifier, failure.message);
                failures.push(failure);
                kept.push(resource);
            }
        }

        self.resources.reinstate(kept);
        self.ready = false;

        if interrupted {
            log::warn!(
                "Cleanup canceled with {} resource(s) still registered",
                self.resources.len()
            );
            return Err(ExecutorError::Canceled);
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ExecutorError::Cleanup(failures))
        }
    }

    fn resources(&self) -> Vec<Resource> {
        self.resources.snapshot()
    }
}
