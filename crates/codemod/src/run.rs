use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use clap::Args;
use codemod_core::buffer::{MemoryBuffer, TextBuffer, TextEdit};
use codemod_core::{ByName, CodemodCandidate, CursorPosition, Invocation, Notifier, Pipeline, Selector};
use colored::Colorize;
use inquire::InquireError;
use inquire::Select;
use log::debug;
use similar::TextDiff;

use crate::project::Project;
use crate::tty;

#[derive(Args, Debug, Clone)]
#[command(about = "Apply a codemod from the project's codemods/ directory to a file")]
pub struct RunArgs {
    /// File to transform
    #[arg(value_name = "FILE", value_hint = clap::ValueHint::FilePath)]
    pub file: PathBuf,

    /// Project root. Defaults to the nearest ancestor of FILE holding
    /// codemod.toml, codemods/ or .git
    #[arg(long, value_name = "DIR", value_hint = clap::ValueHint::DirPath)]
    pub root: Option<PathBuf>,

    /// Codemod to apply, by file name with or without extension.
    /// Prompts with a picker when omitted
    #[arg(short = 'c', long, value_name = "NAME")]
    pub codemod: Option<String>,

    /// Cursor handed to the codemod: 1-based line, 0-based column
    #[arg(long, value_name = "LINE:COL", value_parser = parse_cursor)]
    pub cursor: Option<CursorPosition>,

    /// Print a unified diff instead of writing the file
    #[arg(long)]
    pub diff: bool,

    /// Only consider scripts named `<name>.<suffix>.<ext>`
    #[arg(long)]
    pub suffix_only: bool,
}

pub fn execute(args: RunArgs) -> Result<()> {
    let file = std::path::absolute(&args.file)?;
    let start = file.parent().unwrap_or(&file);
    let project = Project::resolve(args.root.as_deref(), start, args.suffix_only)?;

    let selector: Box<dyn Selector> = match &args.codemod {
        Some(name) => Box::new(ByName::new(name.as_str()).with_suffix(project.config.suffix.as_str())),
        None if tty::can_prompt() => Box::new(PromptSelector),
        None => anyhow::bail!("No codemod given; pass --codemod NAME when not running in a terminal"),
    };

    let notifier = TerminalNotifier;
    let mut pipeline = Pipeline::new();

    let original = match std::fs::read_to_string(&file) {
        Ok(text) => Some(text),
        Err(e) => {
            debug!("Cannot open {}: {e}", file.display());
            None
        }
    };
    let name = project.display_path(&file);

    let outcome = if args.diff {
        let mut buffer = original.as_ref().map(|text| MemoryBuffer::new(name.as_str(), text.as_str()));
        let outcome = pipeline.run(Invocation {
            root: project.root.as_deref(),
            config: &project.config,
            buffer: buffer.as_mut().map(|b| b as &mut dyn TextBuffer),
            position: args.cursor,
            selector: selector.as_ref(),
            notifier: &notifier,
        });
        if let (Some(before), Some(after)) = (&original, &buffer) {
            if before != after.as_str() {
                print!("{}", unified_diff(&name, before, after.as_str()));
            }
        }
        outcome
    } else {
        let mut buffer = original.as_ref().map(|_| FileBuffer::new(&file, &name));
        pipeline.run(Invocation {
            root: project.root.as_deref(),
            config: &project.config,
            buffer: buffer.as_mut().map(|b| b as &mut dyn TextBuffer),
            position: args.cursor,
            selector: selector.as_ref(),
            notifier: &notifier,
        })
    };

    if outcome.is_error() {
        anyhow::bail!("Codemod did not complete");
    }
    Ok(())
}

/// `LINE:COL`, line starting at 1 and column at 0.
fn parse_cursor(s: &str) -> Result<CursorPosition, String> {
    let (line, column) = s
        .split_once(':')
        .ok_or_else(|| format!("expected LINE:COL, got '{s}'"))?;
    let line: u32 = line
        .trim()
        .parse()
        .map_err(|e| format!("invalid line '{line}': {e}"))?;
    let column: u32 = column
        .trim()
        .parse()
        .map_err(|e| format!("invalid column '{column}': {e}"))?;
    if line == 0 {
        return Err("line numbers start at 1".to_string());
    }
    Ok(CursorPosition { line, column })
}

fn unified_diff(name: &str, before: &str, after: &str) -> String {
    let diff = TextDiff::from_lines(before, after);
    format!(
        "{}",
        diff.unified_diff()
            .context_radius(3)
            .header(&format!("old/{name}"), &format!("new/{name}"))
    )
}

/// A file on disk. Every edit re-reads the file and replaces it atomically,
/// so concurrent readers see either the old or the new contents.
struct FileBuffer {
    path: PathBuf,
    name: String,
}

impl FileBuffer {
    fn new(path: &Path, name: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            name: name.to_string(),
        }
    }
}

impl TextBuffer for FileBuffer {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn text(&self) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }

    fn apply(&mut self, edit: TextEdit) -> Result<()> {
        let mut text = self.text()?;
        edit.apply_to(&mut text)?;
        AtomicFile::new(&self.path, OverwriteBehavior::AllowOverwrite)
            .write(|f| {
                f.write_all(text.as_bytes())?;
                f.flush()
            })
            .map_err(|err| anyhow::anyhow!("Failed to write {}: {err}", self.path.display()))
    }
}

/// Interactive picker over the candidate labels.
struct PromptSelector;

impl Selector for PromptSelector {
    fn select(&self, candidates: &[CodemodCandidate]) -> Result<Option<usize>> {
        let labels: Vec<&str> = candidates.iter().map(|c| c.label.as_str()).collect();
        match Select::new("Select a codemod:", labels.clone()).prompt() {
            Ok(choice) => Ok(labels.iter().position(|label| *label == choice)),
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Prints user-facing messages to stderr, keeping stdout for diffs.
struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn info(&self, message: &str) {
        eprintln!("{}", message.green());
    }

    fn warn(&self, message: &str) {
        eprintln!("{} {message}", "Warning:".yellow().bold());
    }

    fn error(&self, message: &str) {
        eprintln!("{}", message.red());
    }
}
