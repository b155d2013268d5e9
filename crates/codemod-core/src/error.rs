use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// An exception raised by script code, as reported by the JS engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    pub message: String,
    pub stack: Option<String>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: Option<String>) -> Self {
        self.stack = stack.filter(|s| !s.trim().is_empty());
        self
    }

    /// Render the message shown to the user for load and transform failures.
    pub fn user_message(&self) -> String {
        match &self.stack {
            Some(stack) => format!("Transform error:\n{}\n{}", self.message, stack.trim_end()),
            None => format!("Transform error:\n{}", self.message),
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScriptError {}

#[derive(Debug, Error)]
pub enum CodemodError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config {path}: {message}")]
    Config { path: PathBuf, message: String },

    /// The script could not be read, failed to compile, or threw while its
    /// top-level code ran.
    #[error("Failed to load codemod {}: {error}", path.display())]
    Load { path: PathBuf, error: ScriptError },

    #[error("Codemod {}: exported value is not callable", path.display())]
    NotCallable { path: PathBuf },

    #[error("JavaScript engine error: {0}")]
    Engine(#[from] rquickjs::Error),
}

impl CodemodError {
    /// The script-level error behind a load failure, if any.
    pub fn script_error(&self) -> ScriptError {
        match self {
            CodemodError::Load { error, .. } => error.clone(),
            CodemodError::NotCallable { .. } => ScriptError::new("exported value is not callable"),
            other => ScriptError::new(other.to_string()),
        }
    }
}
