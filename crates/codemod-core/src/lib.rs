pub mod buffer;
pub mod config;
pub mod discovery;
pub mod error;
pub mod esm;
pub mod executor;
pub mod lexer;
pub mod loader;
pub mod pipeline;
pub mod select;
pub mod strip;
pub mod toolkit;

pub use buffer::{MemoryBuffer, Position, TextBuffer, TextEdit};
pub use config::{CodemodConfig, CodemodToml, Discovery};
pub use discovery::{CodemodCandidate, Enumeration};
pub use error::{CodemodError, ScriptError};
pub use executor::{CursorPosition, Execution, TransformInput, TransformResult};
pub use lexer::Dialect;
pub use loader::{ModuleLoader, Transform};
pub use pipeline::{Invocation, Notifier, Outcome, Pipeline};
pub use select::{ByName, Selector};
