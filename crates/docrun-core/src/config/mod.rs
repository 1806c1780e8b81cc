//! Configuration for execution backends
//!
//! YAML documents are parsed into `DocrunConfig`, environment references are
//! resolved, and the result is validated before any backend is built.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;

use crate::errors::ExecutorError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<DocrunConfig, ExecutorError> {
    ConfigLoader::from_file(path).await
}
