//! `--profile <path>` support.
//!
//! Writes a Chrome-compatible trace of the `load_codemod` and `execute_codemod`
//! spans (each carrying the script path) recorded by `codemod-core`. Open it in
//! `chrome://tracing` or https://ui.perfetto.dev/

use std::path::PathBuf;
use tracing_subscriber::prelude::*;

/// Flushes the trace file when dropped; hold it for the whole command.
pub struct ProfileGuard {
    _guard: tracing_chrome::FlushGuard,
}

pub fn init(output_path: Option<PathBuf>) -> Option<ProfileGuard> {
    let output_path = output_path?;

    let (chrome_layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
        .file(output_path)
        .include_args(true)
        .build();

    // Another subscriber may already be installed
    let _ = tracing_subscriber::registry().with(chrome_layer).try_init();

    Some(ProfileGuard { _guard: guard })
}
