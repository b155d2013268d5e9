use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use codemod_core::discovery;
use colored::Colorize;

use crate::project::Project;

#[derive(Args, Debug, Clone)]
#[command(about = "List the codemods available in the project")]
pub struct ListArgs {
    /// Project root. Defaults to the nearest ancestor of the current directory
    /// holding codemod.toml, codemods/ or .git
    #[arg(long, value_name = "DIR", value_hint = clap::ValueHint::DirPath)]
    pub root: Option<PathBuf>,

    /// Only consider scripts named `<name>.<suffix>.<ext>`
    #[arg(long)]
    pub suffix_only: bool,

    /// Print absolute script paths instead of file names
    #[arg(long)]
    pub paths: bool,
}

pub fn execute(args: ListArgs) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let project = Project::resolve(args.root.as_deref(), &cwd, args.suffix_only)?;

    let Some(dir) = discovery::codemod_dir(project.root.as_deref(), &project.config) else {
        eprintln!("{}", "No workspace is open".green());
        return Ok(());
    };

    let enumeration = discovery::enumerate(&dir, &project.config);
    if let Some(diagnostic) = &enumeration.diagnostic {
        eprintln!("{}", diagnostic.red());
    }
    if enumeration.candidates.is_empty() {
        eprintln!("{}", "No codemods were found".green());
        return Ok(());
    }

    for candidate in &enumeration.candidates {
        if args.paths {
            println!("{}", candidate.path.display());
        } else {
            println!("{}", candidate.label);
        }
    }
    Ok(())
}
