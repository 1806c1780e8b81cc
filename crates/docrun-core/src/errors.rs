//! Error taxonomy for example execution
//!
//! Errors are split by the stage that produced them. `UnsupportedLanguage` and
//! `Setup` are raised before any resource exists. `Launch`, `Execution`,
//! `Timeout` and `Canceled` describe a single example and are folded into its
//! `TestResult` by environments so a batch keeps going. `Cleanup` collects
//! every per-resource failure of one cleanup pass.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ExecutorError {
    #[error("language '{0}' is not executable")]
    UnsupportedLanguage(String),
    #[error("Workspace setup failed for {path}: {message}")]
    Setup { path: PathBuf, message: String },
    #[error("Failed to launch '{command}': {message}")]
    Launch { command: String, message: String },
    #[error("Execution failed with exit code {exit_code}")]
    Execution { exit_code: i32 },
    #[error("deadline exceeded after {0:?}")]
    Timeout(std::time::Duration),
    #[error("execution canceled")]
    Canceled,
    #[error("Script write failed for {path}: {message}")]
    ScriptWrite { path: PathBuf, message: String },
    #[error("Cleanup failed for {} resource(s): {}", .0.len(), CleanupFailures(.0))]
    Cleanup(Vec<CleanupFailure>),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Backend '{backend}' is not available: {reason}")]
    BackendUnavailable { backend: String, reason: String },
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ExecutorError {
    fn from(err: std::io::Error) -> Self {
        ExecutorError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ExecutorError {
    fn from(err: serde_yaml::Error) -> Self {
        ExecutorError::Config(format!("Failed to parse YAML config: {}", err))
    }
}

/// One resource that could not be removed during cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub identifier: String,
    pub message: String,
}

impl fmt::Display for CleanupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.identifier, self.message)
    }
}

struct CleanupFailures<'a>(&'a [CleanupFailure]);

impl fmt::Display for CleanupFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

impl ExecutorError {
    /// True for errors that end an entire batch rather than a single example.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExecutorError::Setup { .. } | ExecutorError::BackendUnavailable { .. } | ExecutorError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_error_lists_every_failure() {
        let err = ExecutorError::Cleanup(vec![
            CleanupFailure {
                identifier: "/tmp/a".to_string(),
                message: "permission denied".to_string(),
            },
            CleanupFailure {
                identifier: "/tmp/b".to_string(),
                message: "busy".to_string(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("2 resource(s)"));
        assert!(msg.contains("/tmp/a: permission denied"));
        assert!(msg.contains("/tmp/b: busy"));
    }

    #[test]
    fn test_unsupported_language_message() {
        let err = ExecutorError::UnsupportedLanguage("yaml".to_string());
        assert_eq!(err.to_string(), "language 'yaml' is not executable");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_setup_is_fatal() {
        let err = ExecutorError::Setup {
            path: PathBuf::from("/nonexistent"),
            message: "denied".to_string(),
        };
        assert!(err.is_fatal());
    }
}
