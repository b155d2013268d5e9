use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use codemod_core::config::{self, CodemodToml};
use codemod_core::{CodemodConfig, Discovery};
use log::debug;

/// Project root and its codemod configuration, after CLI overrides.
pub struct Project {
    pub root: Option<PathBuf>,
    pub config: CodemodConfig,
}

impl Project {
    /// Resolve the project from `--root`, or by walking up from `start`.
    ///
    /// A missing root is not an error here; commands report it the same way
    /// an editor with no folder open would.
    pub fn resolve(root: Option<&Path>, start: &Path, suffix_only: bool) -> Result<Self> {
        let root = match root {
            Some(root) => Some(
                root.canonicalize()
                    .with_context(|| format!("Project root {} not found", root.display()))?,
            ),
            None => config::find_project_root(&std::path::absolute(start)?),
        };

        let mut config = match &root {
            Some(root) => CodemodToml::load(root)?.codemods,
            None => CodemodConfig::default(),
        };
        if suffix_only {
            config.discovery = Discovery::Suffix;
        }

        if let Some(root) = &root {
            debug!("Project root: {}", root.display());
        }
        Ok(Self { root, config })
    }

    /// `path` relative to the project root when it lives under it.
    pub fn display_path(&self, path: &Path) -> String {
        self.root
            .as_deref()
            .and_then(|root| pathdiff::diff_paths(path, root))
            .filter(|rel| !rel.starts_with(".."))
            .unwrap_or_else(|| path.to_path_buf())
            .display()
            .to_string()
    }
}
