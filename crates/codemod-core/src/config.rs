//! `codemod.toml` configuration and project root discovery.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::CodemodError;
use crate::lexer::Dialect;

/// File name of the optional per-project configuration.
pub const CONFIG_FILE: &str = "codemod.toml";

/// Default name of the directory holding codemod scripts.
pub const DEFAULT_DIR: &str = "codemods";

/// Extensions recognised as codemod scripts, plain and typed forms.
pub const DEFAULT_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx", "ts", "mts", "cts", "tsx"];

/// How candidate scripts are picked out of the codemod directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Discovery {
    /// Every file with an allow-listed extension.
    #[default]
    All,
    /// Only files named `<name>.<suffix>.<ext>`, e.g. `rename.cm.ts`.
    Suffix,
}

/// Top-level codemod.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodemodToml {
    #[serde(default)]
    pub codemods: CodemodConfig,
}

/// `[codemods]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodemodConfig {
    /// Codemod directory, relative to the project root
    pub dir: PathBuf,
    pub discovery: Discovery,
    /// Naming suffix required in `suffix` discovery mode (without dots)
    pub suffix: String,
    pub extensions: Vec<String>,
    /// Dialect the transform toolkit is pre-bound to
    pub parser: Dialect,
}

impl Default for CodemodConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_DIR),
            discovery: Discovery::default(),
            suffix: "cm".to_string(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            parser: Dialect::Tsx,
        }
    }
}

impl CodemodConfig {
    pub fn with_discovery(mut self, discovery: Discovery) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn is_script_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e == ext)
    }
}

impl CodemodToml {
    pub fn parse(contents: &str, path: &Path) -> Result<Self, CodemodError> {
        toml::from_str(contents).map_err(|e| CodemodError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load `<root>/codemod.toml`, falling back to defaults when it does not exist.
    pub fn load(root: &Path) -> Result<Self, CodemodError> {
        let path = root.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents, &path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Find the nearest ancestor of `start` that looks like a project root: it holds
/// a `codemod.toml`, a `codemods/` directory, or a `.git` entry.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| {
            dir.join(CONFIG_FILE).is_file()
                || dir.join(DEFAULT_DIR).is_dir()
                || dir.join(".git").exists()
        })
        .map(Path::to_path_buf)
}
