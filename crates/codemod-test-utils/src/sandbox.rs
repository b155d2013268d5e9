//! Throwaway project directories for codemod tests.
//!
//! A [`Sandbox`] is a temporary project root with a private `HOME`, into which
//! tests write source files and codemod scripts before driving the library or
//! the `codemod` binary against it. Everything lives under an
//! `assert_fs::TempDir` and is cleaned up on drop.
//!
//! ## Quick example
//! ```no_run
//! use codemod_test_utils::sandbox::Sandbox;
//!
//! let mut sb = Sandbox::new();
//! sb.write("src/app.ts", "const foo = 1;\n")
//!     .codemod("rename.cm.ts", "export default (f) => f.source.replace('foo', 'bar');");
//!
//! let output = sb
//!     .run("codemod", ["run", "src/app.ts", "--codemod", "rename"], None)
//!     .unwrap();
//! println!("{output}");
//! assert_eq!(sb.read("src/app.ts"), "const bar = 1;\n");
//! ```

use assert_fs::TempDir;
use assert_fs::fixture::PathChild;
use duct::Expression;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory codemods are written to, relative to the sandbox root.
pub const CODEMOD_DIR: &str = "codemods";

pub struct Sandbox {
    root: TempDir,
    pub home: PathBuf,
    default_cwd: PathBuf,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox {
    /// Create a new sandbox with an empty project root and a private home.
    pub fn new() -> Self {
        let root = TempDir::new().expect("create sandbox TempDir");
        let home = root.child(".home").to_path_buf();
        fs::create_dir_all(&home).expect("create home dir");
        let default_cwd = root.path().to_path_buf();
        Self {
            root,
            home,
            default_cwd,
        }
    }

    pub fn default_cwd(&self) -> &Path {
        &self.default_cwd
    }

    /// Set the default working directory for commands. Relative paths are
    /// taken from the sandbox root.
    pub fn set_default_cwd<P: AsRef<Path>>(&mut self, cwd: P) -> &mut Self {
        self.default_cwd = self.resolve(cwd.as_ref());
        self
    }

    /// Absolute path to the sandbox root, which doubles as the project root.
    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    /// Absolute path of the codemod directory.
    pub fn codemod_dir(&self) -> PathBuf {
        self.root_path().join(CODEMOD_DIR)
    }

    /// Write/overwrite a file relative to the sandbox root.
    pub fn write<P: AsRef<Path>, S: AsRef<[u8]>>(&mut self, rel: P, contents: S) -> &mut Self {
        let p = self.root_path().join(rel);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(p, contents).expect("write file");
        self
    }

    /// Write/overwrite a script in the codemod directory.
    pub fn codemod<S: AsRef<[u8]>>(&mut self, name: &str, contents: S) -> &mut Self {
        self.write(Path::new(CODEMOD_DIR).join(name), contents)
    }

    /// Create the (empty) codemod directory.
    pub fn empty_codemod_dir(&mut self) -> &mut Self {
        fs::create_dir_all(self.codemod_dir()).expect("create codemod dir");
        self
    }

    /// Read a file relative to the sandbox root.
    pub fn read<P: AsRef<Path>>(&self, rel: P) -> String {
        let p = self.root_path().join(rel);
        fs::read_to_string(&p).unwrap_or_else(|e| panic!("read {}: {e}", p.display()))
    }

    /// Build a `duct::Expression` pre-wired with the sandbox env and default cwd.
    pub fn cmd<S: AsRef<OsStr>, I: IntoIterator>(&self, program: S, args: I) -> Expression
    where
        I::Item: AsRef<OsStr>,
    {
        let args: Vec<_> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect();
        let expr = duct::cmd(program.as_ref(), args).dir(&self.default_cwd);
        self.inject_env(expr)
    }

    /// Run a cargo binary inside this sandbox and return stdout.
    /// Errors if the process exits with a non-zero status.
    pub fn run<I>(&self, program: &str, args: I, cwd: Option<&Path>) -> Result<String, String>
    where
        I: IntoIterator,
        I::Item: AsRef<OsStr>,
    {
        let bin = assert_cmd::cargo::cargo_bin(program);
        let working_dir = cwd.map_or_else(|| self.default_cwd.clone(), |dir| self.resolve(dir));
        self.cmd(bin, args)
            .dir(working_dir)
            .read()
            .map_err(|e| format!("command failed: {e}"))
    }

    /// Same as [`Sandbox::run`] but captures stderr too and never fails on the
    /// exit status. Returns `(success, stdout, stderr)`.
    pub fn run_unchecked<I>(&self, program: &str, args: I) -> (bool, String, String)
    where
        I: IntoIterator,
        I::Item: AsRef<OsStr>,
    {
        let bin = assert_cmd::cargo::cargo_bin(program);
        let output = self
            .cmd(bin, args)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .expect("spawn command");
        (
            output.status.success(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        )
    }

    pub fn inject_env(&self, expr: Expression) -> Expression {
        let mut env_map: HashMap<String, String> = HashMap::new();
        if let Ok(path) = std::env::var("PATH") {
            env_map.insert("PATH".into(), path);
        }
        env_map.insert("HOME".into(), self.home.to_string_lossy().into_owned());
        env_map.insert("NO_COLOR".into(), "1".into());
        expr.full_env(&env_map)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_path().join(path)
        }
    }
}
