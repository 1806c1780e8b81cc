// src/core_types.rs

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ExecutorError;

/// A language-tagged snippet handed over by the extractor. Never modified here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub id: String,
    pub language: String,
    pub code: String,
}

impl Example {
    pub fn new(id: impl Into<String>, language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            language: language.into(),
            code: code.into(),
        }
    }
}

/// Languages the local environment knows how to wrap and run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Bash,
    Sh,
    Go,
    Python,
}

impl Language {
    /// Resolve a documentation fence tag. Anything unknown is not executable.
    pub fn from_tag(tag: &str) -> Result<Self, ExecutorError> {
        match tag.trim().to_lowercase().as_str() {
            "bash" | "shell" => Ok(Language::Bash),
            "sh" => Ok(Language::Sh),
            "go" => Ok(Language::Go),
            "python" => Ok(Language::Python),
            _ => Err(ExecutorError::UnsupportedLanguage(tag.to_string())),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Language::Bash | Language::Sh => "sh",
            Language::Go => "go",
            Language::Python => "py",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Bash => "bash",
            Language::Sh => "sh",
            Language::Go => "go",
            Language::Python => "python",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
