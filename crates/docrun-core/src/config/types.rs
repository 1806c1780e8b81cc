//! Configuration type definitions for execution backends
//!
//! Every field has a default so an empty YAML document yields a usable local
//! backend. Host state (the login shell, the temp directory) is read once when
//! a config value is constructed and never consulted again by the executors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ExecutorError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DocrunConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend selection. The tag picks the implementation at construction time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Local(LocalConfig),
    Docker(DockerConfig),
    Aws(AwsConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Local(LocalConfig::default())
    }
}

impl BackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::Local(_) => "local",
            BackendConfig::Docker(_) => "docker",
            BackendConfig::Aws(_) => "aws",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Workspace for scripts. `None` means a fresh directory under `temp_root`.
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    /// Extra variables layered over the inherited process environment.
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Only directories under this root are ever deleted by a runner.
    #[serde(default = "default_temp_root")]
    pub temp_root: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            working_directory: None,
            environment: HashMap::new(),
            resource_limits: ResourceLimits::default(),
            timeout_secs: default_timeout_secs(),
            shell: default_shell(),
            temp_root: default_temp_root(),
        }
    }
}

impl LocalConfig {
    /// Effective deadline; a limit-level timeout wins over the top-level one.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.resource_limits.timeout_secs.unwrap_or(self.timeout_secs))
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(path.into());
        self
    }

    pub fn with_temp_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_root = path.into();
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.timeout_secs == 0 {
            return Err(ExecutorError::Config("timeout_secs must be greater than 0".to_string()));
        }
        if self.shell.trim().is_empty() {
            return Err(ExecutorError::Config("shell cannot be empty".to_string()));
        }
        if !self.temp_root.is_absolute() {
            return Err(ExecutorError::Config(format!(
                "temp_root must be an absolute path, got {}",
                self.temp_root.display()
            )));
        }
        self.resource_limits.validate()
    }
}

/// Limits applied to each spawned example. `None` leaves the inherited value.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    #[serde(default)]
    pub max_memory_mb: Option<u64>,
    #[serde(default)]
    pub max_disk_mb: Option<u64>,
    #[serde(default)]
    pub max_cpu_percent: Option<u32>,
    #[serde(default)]
    pub max_processes: Option<u64>,
    #[serde(default)]
    pub max_file_handles: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ResourceLimits {
    pub fn is_unlimited(&self) -> bool {
        self.max_memory_mb.is_none()
            && self.max_disk_mb.is_none()
            && self.max_processes.is_none()
            && self.max_file_handles.is_none()
    }

    pub fn validate(&self) -> Result<(), ExecutorError> {
        if let Some(cpu) = self.max_cpu_percent {
            if cpu == 0 || cpu > 100 {
                return Err(ExecutorError::Config(format!(
                    "max_cpu_percent must be between 1 and 100, got {}",
                    cpu
                )));
            }
        }
        if self.timeout_secs == Some(0) {
            return Err(ExecutorError::Config(
                "resource_limits.timeout_secs must be greater than 0".to_string(),
            ));
        }
        for (name, value) in [
            ("max_memory_mb", self.max_memory_mb),
            ("max_disk_mb", self.max_disk_mb),
            ("max_processes", self.max_processes),
            ("max_file_handles", self.max_file_handles),
        ] {
            if value == Some(0) {
                return Err(ExecutorError::Config(format!("{} must be greater than 0", name)));
            }
        }
        Ok(())
    }
}

/// Recognized options for a container backend. Not implemented; see
/// `executors::backend` for how the fallback is reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    #[serde(default = "default_docker_image")]
    pub image: String,
    #[serde(default)]
    pub language_images: HashMap<String, String>,
    #[serde(default = "default_container_workdir")]
    pub container_working_directory: String,
    #[serde(default = "default_network_mode")]
    pub network_mode: String,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub allow_local_fallback: bool,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            image: default_docker_image(),
            language_images: HashMap::new(),
            container_working_directory: default_container_workdir(),
            network_mode: default_network_mode(),
            environment: HashMap::new(),
            resource_limits: ResourceLimits::default(),
            timeout_secs: default_timeout_secs(),
            allow_local_fallback: false,
        }
    }
}

/// Recognized options for a cloud backend. Not implemented.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default = "default_aws_region")]
    pub region: String,
    #[serde(default = "default_instance_type")]
    pub instance_type: String,
    #[serde(default)]
    pub ami_id: Option<String>,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub resource_limits: ResourceLimits,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub allow_local_fallback: bool,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_aws_region(),
            instance_type: default_instance_type(),
            ami_id: None,
            subnet_id: None,
            key_name: None,
            environment: HashMap::new(),
            resource_limits: ResourceLimits::default(),
            timeout_secs: default_timeout_secs(),
            allow_local_fallback: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl DocrunConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ExecutorError> {
        match &self.backend {
            BackendConfig::Local(local) => local.validate()?,
            BackendConfig::Docker(docker) => {
                if docker.image.is_empty() {
                    return Err(ExecutorError::Config("Docker image cannot be empty".to_string()));
                }
                if docker.timeout_secs == 0 {
                    return Err(ExecutorError::Config("timeout_secs must be greater than 0".to_string()));
                }
                docker.resource_limits.validate()?;
            }
            BackendConfig::Aws(aws) => {
                if aws.region.is_empty() {
                    return Err(ExecutorError::Config("AWS region cannot be empty".to_string()));
                }
                if aws.timeout_secs == 0 {
                    return Err(ExecutorError::Config("timeout_secs must be greater than 0".to_string()));
                }
                aws.resource_limits.validate()?;
            }
        }

        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            return Err(ExecutorError::Config(format!(
                "Unknown log level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }
}

fn default_timeout_secs() -> u64 { 30 }
fn default_log_level() -> String { "info".to_string() }
fn default_docker_image() -> String { "alpine:latest".to_string() }
fn default_container_workdir() -> String { "/workspace".to_string() }
fn default_network_mode() -> String { "none".to_string() }
fn default_aws_region() -> String { "us-east-1".to_string() }
fn default_instance_type() -> String { "t3.micro".to_string() }

fn default_temp_root() -> PathBuf {
    std::env::temp_dir()
}

/// Host login shell, falling back to bash on the PATH and then `/bin/sh`.
pub fn default_shell() -> String {
    match std::env::var("SHELL") {
        Ok(shell) if !shell.trim().is_empty() => shell,
        _ => which::which("bash")
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "/bin/sh".to_string()),
    }
}
