//! Locating and listing codemod scripts.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::config::{CodemodConfig, Discovery};

/// One candidate transform script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodemodCandidate {
    /// Absolute path to the script
    pub path: PathBuf,
    /// File name shown to the user
    pub label: String,
}

/// Result of listing the codemod directory.
///
/// Listing never fails: when the directory cannot be read for a reason other
/// than not existing, `candidates` is empty and `diagnostic` carries the
/// underlying message for the caller to report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    pub candidates: Vec<CodemodCandidate>,
    pub diagnostic: Option<String>,
}

/// `<root>/<config.dir>`, or `None` when no project is open.
pub fn codemod_dir(root: Option<&Path>, config: &CodemodConfig) -> Option<PathBuf> {
    let root = root?;
    let dir = root.join(&config.dir);
    if dir.is_absolute() {
        Some(dir)
    } else {
        Some(std::path::absolute(&dir).unwrap_or(dir))
    }
}

/// Whether `file_name` is a codemod script under the configured naming rule.
pub fn is_codemod_file(file_name: &str, config: &CodemodConfig) -> bool {
    let Some((stem, ext)) = file_name.rsplit_once('.') else {
        return false;
    };
    if stem.is_empty() || !config.is_script_extension(ext) {
        return false;
    }
    match config.discovery {
        Discovery::All => true,
        Discovery::Suffix => stem
            .strip_suffix(config.suffix.as_str())
            .and_then(|rest| rest.strip_suffix('.'))
            .is_some_and(|name| !name.is_empty()),
    }
}

/// List the codemod scripts directly inside `dir`, sorted by label.
pub fn enumerate(dir: &Path, config: &CodemodConfig) -> Enumeration {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No codemod directory at {}", dir.display());
            return Enumeration::default();
        }
        Err(e) => {
            warn!("Failed to list {}: {e}", dir.display());
            return Enumeration {
                candidates: Vec::new(),
                diagnostic: Some(e.to_string()),
            };
        }
    };

    let mut candidates: Vec<CodemodCandidate> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            // Follows symlinks
            if !path.is_file() {
                return None;
            }
            let label = entry.file_name().to_str()?.to_string();
            is_codemod_file(&label, config).then_some(CodemodCandidate { path, label })
        })
        .collect();
    candidates.sort_by(|a, b| a.label.cmp(&b.label));

    debug!(
        "Found {} codemod(s) in {}",
        candidates.len(),
        dir.display()
    );
    Enumeration {
        candidates,
        diagnostic: None,
    }
}
