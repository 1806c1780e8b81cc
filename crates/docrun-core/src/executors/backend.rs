//! Backend selection from configuration.
//!
//! Only the local backend exists. Docker and AWS configurations are refused
//! unless they opt into `allow_local_fallback`, in which case the caller gets
//! a local implementation that says so: its tag reads `<backend>(local-fallback)`
//! and every `TestResult` carries `isolation=none` and `delegated_to=local`.

use std::collections::HashMap;

use super::{Environment, LocalEnvironment, LocalRunner, Runner};
use crate::config::{BackendConfig, LocalConfig, ResourceLimits};
use crate::errors::ExecutorError;

pub fn build_environment(config: &BackendConfig) -> Result<Box<dyn Environment>, ExecutorError> {
    match resolve(config)? {
        Resolved::Local(local) => Ok(Box::new(LocalEnvironment::new(local)?)),
        Resolved::Fallback { name, local } => Ok(Box::new(
            LocalEnvironment::new(local)?
                .with_name(&name)
                .with_tag("isolation", "none")
                .with_tag("delegated_to", "local"),
        )),
    }
}

pub fn build_runner(config: &BackendConfig) -> Result<Box<dyn Runner>, ExecutorError> {
    match resolve(config)? {
        Resolved::Local(local) => Ok(Box::new(LocalRunner::new(local)?)),
        Resolved::Fallback { name, local } => Ok(Box::new(LocalRunner::named(&name, local)?)),
    }
}

enum Resolved {
    Local(LocalConfig),
    Fallback { name: String, local: LocalConfig },
}

fn resolve(config: &BackendConfig) -> Result<Resolved, ExecutorError> {
    match config {
        BackendConfig::Local(local) => Ok(Resolved::Local(local.clone())),
        BackendConfig::Docker(docker) => fallback(
            config.name(),
            docker.allow_local_fallback,
            &docker.environment,
            &docker.resource_limits,
            docker.timeout_secs,
        ),
        BackendConfig::Aws(aws) => fallback(
            config.name(),
            aws.allow_local_fallback,
            &aws.environment,
            &aws.resource_limits,
            aws.timeout_secs,
        ),
    }
}

fn fallback(
    backend: &str,
    allowed: bool,
    environment: &HashMap<String, String>,
    limits: &ResourceLimits,
    timeout_secs: u64,
) -> Result<Resolved, ExecutorError> {
    if !allowed {
        return Err(ExecutorError::BackendUnavailable {
            backend: backend.to_string(),
            reason: "not implemented; set allow_local_fallback to run on the host without isolation"
                .to_string(),
        });
    }

    log::warn!(
        "Backend '{}' is not implemented; examples will run on the local host without isolation",
        backend
    );

    let mut local = LocalConfig::default()
        .with_timeout_secs(timeout_secs)
        .with_resource_limits(limits.clone());
    local.environment = environment.clone();

    Ok(Resolved::Fallback {
        name: format!("{}(local-fallback)", backend),
        local,
    })
}
