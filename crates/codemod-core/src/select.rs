use anyhow::Result;

use crate::discovery::CodemodCandidate;

/// Presents candidates to the user and returns the chosen index, or `None`
/// when the user cancels. Never called with an empty slice.
pub trait Selector {
    fn select(&self, candidates: &[CodemodCandidate]) -> Result<Option<usize>>;
}

impl<S: Selector + ?Sized> Selector for &S {
    fn select(&self, candidates: &[CodemodCandidate]) -> Result<Option<usize>> {
        (**self).select(candidates)
    }
}

/// Non-interactive selection by name.
///
/// Matches the full label (`rename.cm.ts`), the label without its extension
/// (`rename.cm`) or the bare name with the suffix removed too (`rename`).
#[derive(Debug, Clone)]
pub struct ByName {
    name: String,
    suffix: String,
}

impl ByName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            suffix: "cm".to_string(),
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    fn matches(&self, label: &str) -> bool {
        if label == self.name {
            return true;
        }
        let Some((stem, _)) = label.rsplit_once('.') else {
            return false;
        };
        if stem == self.name {
            return true;
        }
        stem.strip_suffix(self.suffix.as_str())
            .and_then(|s| s.strip_suffix('.'))
            .is_some_and(|bare| bare == self.name)
    }
}

impl Selector for ByName {
    fn select(&self, candidates: &[CodemodCandidate]) -> Result<Option<usize>> {
        Ok(candidates.iter().position(|c| self.matches(&c.label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn candidates(labels: &[&str]) -> Vec<CodemodCandidate> {
        labels
            .iter()
            .map(|label| CodemodCandidate {
                path: PathBuf::from("/p/codemods").join(label),
                label: label.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_by_name_forms() {
        let list = candidates(&["add-header.js", "reverse.cm.ts"]);
        assert_eq!(ByName::new("reverse.cm.ts").select(&list).unwrap(), Some(1));
        assert_eq!(ByName::new("reverse.cm").select(&list).unwrap(), Some(1));
        assert_eq!(ByName::new("reverse").select(&list).unwrap(), Some(1));
        assert_eq!(ByName::new("add-header").select(&list).unwrap(), Some(0));
        assert_eq!(ByName::new("missing").select(&list).unwrap(), None);
    }

    #[test]
    fn test_by_name_custom_suffix() {
        let list = candidates(&["rename.mod.js"]);
        assert_eq!(ByName::new("rename").select(&list).unwrap(), None);
        assert_eq!(
            ByName::new("rename").with_suffix("mod").select(&list).unwrap(),
            Some(0)
        );
    }
}
