//! Logger setup for hosts embedding the engine.
//!
//! The library itself only uses the `log` macros; this helper wires them to
//! `env_logger` the same way for every host.

use std::fs::OpenOptions;

use crate::config::LoggingConfig;
use crate::errors::ExecutorError;

/// Build an `env_logger` logger from the config and install it. A second call
/// in the same process is a no-op.
pub fn init(config: &LoggingConfig) -> Result<(), ExecutorError> {
    let level = config
        .level
        .parse::<log::LevelFilter>()
        .map_err(|_| ExecutorError::Config(format!("Unknown log level '{}'", config.level)))?;

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);

    if let Some(path) = &config.file {
        let log_file = OpenOptions::new().create(true).append(true).open(path).map_err(|e| {
            ExecutorError::Config(format!("Failed to open log file {}: {}", path.display(), e))
        })?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    if builder.try_init().is_err() {
        log::debug!("Logger already initialized; keeping the existing one");
    }
    Ok(())
}
