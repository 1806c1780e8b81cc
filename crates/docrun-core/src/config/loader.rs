//! Configuration loader for YAML files and environment resolution
//!
//! `${VAR}` references inside backend `environment` values are expanded from
//! the host environment once, at load time. Unset variables expand to an
//! empty string and are logged.

use crate::config::types::*;
use crate::errors::ExecutorError;
use std::collections::HashMap;
use std::env;
use std::path::Path;
use tokio::fs;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<DocrunConfig, ExecutorError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            ExecutorError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<DocrunConfig, ExecutorError> {
        let mut config: DocrunConfig = if content.trim().is_empty() {
            DocrunConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };

        Self::resolve_environment(&mut config);
        config.validate()?;

        Ok(config)
    }

    fn resolve_environment(config: &mut DocrunConfig) {
        let vars = match &mut config.backend {
            BackendConfig::Local(local) => &mut local.environment,
            BackendConfig::Docker(docker) => &mut docker.environment,
            BackendConfig::Aws(aws) => &mut aws.environment,
        };
        expand_all(vars);
    }
}

fn expand_all(vars: &mut HashMap<String, String>) {
    for (key, value) in vars.iter_mut() {
        if value.contains("${") {
            let expanded = expand_env_refs(value);
            log::debug!("Expanded environment reference in '{}'", key);
            *value = expanded;
        }
    }
}

/// Replace each `${NAME}` with the value of `NAME` from the host environment.
/// An unterminated `${` is kept literally.
pub fn expand_env_refs(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match env::var(name) {
                    Ok(v) => out.push_str(&v),
                    Err(_) => log::warn!("Environment variable '{}' is not set; expanding to empty", name),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
