//! The codemod command: resolve, enumerate, select, load, execute, apply.

use std::path::Path;

use log::{debug, info, warn};

use crate::buffer::{TextBuffer, replace_all};
use crate::config::CodemodConfig;
use crate::discovery;
use crate::error::ScriptError;
use crate::executor::{self, CursorPosition, TransformInput, TransformResult};
use crate::loader::{self, ModuleLoader};
use crate::select::Selector;

/// Where user-facing messages go (status bar, terminal, test recorder).
pub trait Notifier {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

/// Everything one run of the command needs from its host.
pub struct Invocation<'a> {
    /// Project root, `None` when no workspace is open
    pub root: Option<&'a Path>,
    pub config: &'a CodemodConfig,
    /// The active document, `None` when there is none
    pub buffer: Option<&'a mut dyn TextBuffer>,
    pub position: Option<CursorPosition>,
    pub selector: &'a dyn Selector,
    pub notifier: &'a dyn Notifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NoWorkspace,
    NoActiveBuffer,
    NoCodemods,
    NoSelection,
    Skipped,
    Applied { label: String },
    LoadFailed(ScriptError),
    TransformFailed(ScriptError),
    BufferFailed(String),
}

impl Outcome {
    /// The message shown to the user for this outcome.
    pub fn message(&self) -> String {
        match self {
            Outcome::NoWorkspace => "No workspace is open".to_string(),
            Outcome::NoActiveBuffer => "No active file".to_string(),
            Outcome::NoCodemods => "No codemods were found".to_string(),
            Outcome::NoSelection => "No selection".to_string(),
            Outcome::Skipped => "File skipped".to_string(),
            Outcome::Applied { label } => format!("Applied {label}"),
            Outcome::LoadFailed(err) | Outcome::TransformFailed(err) => err.user_message(),
            Outcome::BufferFailed(message) => message.clone(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Outcome::LoadFailed(_) | Outcome::TransformFailed(_) | Outcome::BufferFailed(_)
        )
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }
}

/// Long-lived command state. Holds the module registry so that it survives
/// between invocations against the same codemod directory.
#[derive(Default)]
pub struct Pipeline {
    loader: Option<ModuleLoader>,
    loads: usize,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The loader for the codemod directory of the last invocation.
    pub fn loader(&self) -> Option<&ModuleLoader> {
        self.loader.as_ref()
    }

    /// Number of script loads performed so far.
    pub fn loads(&self) -> usize {
        self.loads
    }

    /// Run the command once. Never fails: every problem becomes an [`Outcome`]
    /// that has already been reported through the invocation's notifier.
    /// The buffer is only written after the transform returned new text.
    pub fn run(&mut self, invocation: Invocation<'_>) -> Outcome {
        let notifier = invocation.notifier;
        let outcome = self.run_inner(invocation);
        match &outcome {
            Outcome::NoWorkspace | Outcome::NoActiveBuffer => {
                warn!("Codemod command unavailable: {}", outcome.message());
                notifier.info(&outcome.message());
            }
            o if o.is_error() => notifier.error(&o.message()),
            o => notifier.info(&o.message()),
        }
        outcome
    }

    fn run_inner(&mut self, invocation: Invocation<'_>) -> Outcome {
        let Invocation {
            root,
            config,
            buffer,
            position,
            selector,
            notifier,
        } = invocation;

        let Some(dir) = discovery::codemod_dir(root, config) else {
            return Outcome::NoWorkspace;
        };
        let Some(buffer) = buffer else {
            return Outcome::NoActiveBuffer;
        };

        let enumeration = discovery::enumerate(&dir, config);
        if let Some(diagnostic) = &enumeration.diagnostic {
            notifier.error(diagnostic);
        }
        let candidates = enumeration.candidates;
        if candidates.is_empty() {
            return Outcome::NoCodemods;
        }

        let choice = match selector.select(&candidates) {
            Ok(choice) => choice,
            Err(e) => {
                notifier.warn(&format!("Codemod selection failed: {e:#}"));
                None
            }
        };
        let Some(candidate) = choice.and_then(|i| candidates.get(i)) else {
            debug!("Codemod selection cancelled");
            return Outcome::NoSelection;
        };
        debug!("Selected codemod {}", candidate.label);

        self.loads += 1;
        let transform = match self.loader_for(&dir, config).load(&candidate.path) {
            Ok(transform) => transform,
            Err(e) => {
                warn!("{e}");
                return Outcome::LoadFailed(e.script_error());
            }
        };

        let source = match buffer.text() {
            Ok(source) => source,
            Err(e) => return Outcome::BufferFailed(format!("{e:#}")),
        };
        let input = TransformInput {
            source,
            path: buffer.name(),
        };

        let execution = executor::execute(&transform, &input, position);
        for line in &execution.logs {
            info!("[{}] {}: {}", candidate.label, line.level, line.message);
        }
        for (name, count) in &execution.stats {
            debug!("[{}] {name}: {count}", candidate.label);
        }

        match execution.result {
            TransformResult::Skip => Outcome::Skipped,
            TransformResult::Failed(err) => Outcome::TransformFailed(err),
            TransformResult::Replace(text) => match replace_all(buffer, &text) {
                Ok(()) => Outcome::Applied {
                    label: candidate.label.clone(),
                },
                Err(e) => Outcome::BufferFailed(format!("{e:#}")),
            },
        }
    }

    fn loader_for(&mut self, dir: &Path, config: &CodemodConfig) -> &mut ModuleLoader {
        let dir = loader::normalize(dir);
        let stale = self
            .loader
            .as_ref()
            .is_none_or(|loader| loader.codemod_dir() != dir);
        if stale {
            self.loader = None;
        }
        self.loader
            .get_or_insert_with(|| ModuleLoader::with_config(&dir, config))
    }
}
