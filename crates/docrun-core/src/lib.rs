//! Sandboxed execution of code examples extracted from documentation.
//!
//! An orchestrator hands language-tagged [`Example`]s to an [`Environment`],
//! which writes each one to a script in a private workspace, runs it under a
//! deadline, and returns a structured [`TestResult`]. Every file the
//! environment creates, and every side effect it can spot in the source, is
//! recorded as a [`Resource`] so `cleanup` can undo it.
//!
//! # Architecture Overview
//!
//! - **Runner**: one shell command, one deadline, one [`RunResult`]
//! - **Environment**: setup / execute / cleanup lifecycle with resource tracking
//! - **Backends**: chosen from [`BackendConfig`]; only the local backend is
//!   implemented, container and cloud configs fall back explicitly or fail
//! - **Configuration**: YAML-loadable config with documented defaults
//!
//! ```no_run
//! use docrun_core::{build_environment, BackendConfig, Example};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), docrun_core::ExecutorError> {
//! let cancel = CancellationToken::new();
//! let mut env = build_environment(&BackendConfig::default())?;
//! env.setup(&cancel).await?;
//! let result = env
//!     .execute(&cancel, &Example::new("intro-1", "bash", "echo hello"))
//!     .await?;
//! assert!(result.success);
//! env.cleanup(&cancel).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core_types;
pub mod errors;
pub mod executors;
pub mod logging;
pub mod resources;

pub use config::*;
pub use core_types::{Example, Language};
pub use errors::{CleanupFailure, ExecutorError};
pub use executors::{
    build_environment, build_runner, Environment, LocalEnvironment, LocalRunner, RunResult, Runner,
    Termination, TestResult, TERMINATED_EXIT_CODE,
};
pub use resources::{Resource, ResourceType};
