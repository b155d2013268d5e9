//! Loads codemod scripts into fresh JavaScript contexts.
//!
//! Every call to [`ModuleLoader::load`] first evicts all cached units that
//! touch the codemod directory, then evaluates the script (and anything it
//! `require`s) from disk in a brand-new QuickJS runtime. Edits to a codemod or
//! to a helper next to it are therefore visible on the very next load, without
//! restarting the host.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use log::debug;
use rquickjs::{Context, Ctx, Function, Object, Runtime, Type, Value};
use serde_json::json;

use crate::config::{CodemodConfig, DEFAULT_EXTENSIONS};
use crate::error::{CodemodError, ScriptError};
use crate::esm;
use crate::lexer::Dialect;
use crate::strip::strip_types;
use crate::toolkit;

const PRELUDE: &str = include_str!("prelude.js");

/// Global under which the resolved transform function is kept.
const TRANSFORM_KEY: &str = "__codemod_transform";

/// A line written by script code through `console.*` or `api.report`/`api.stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: String,
    pub message: String,
}

/// State shared between the Rust host and the native functions of one unit.
struct HostState {
    extensions: Vec<String>,
    logs: Mutex<Vec<LogLine>>,
    dependencies: Mutex<Vec<PathBuf>>,
}

impl HostState {
    fn new(extensions: Vec<String>) -> Self {
        Self {
            extensions,
            logs: Mutex::new(Vec::new()),
            dependencies: Mutex::new(Vec::new()),
        }
    }

    fn log(&self, level: String, message: String) {
        if let Ok(mut logs) = self.logs.lock() {
            logs.push(LogLine { level, message });
        }
    }

    fn take_logs(&self) -> Vec<LogLine> {
        self.logs
            .lock()
            .map(|mut logs| std::mem::take(&mut *logs))
            .unwrap_or_default()
    }

    fn dependencies(&self) -> Vec<PathBuf> {
        self.dependencies
            .lock()
            .map(|deps| deps.clone())
            .unwrap_or_default()
    }

    /// Read a module for the prelude's registry, erasing types and lowering
    /// ES module syntax.
    fn read(&self, path: &str) -> String {
        let path = PathBuf::from(path);
        match std::fs::read_to_string(&path) {
            Ok(source) => {
                if let Ok(mut deps) = self.dependencies.lock() {
                    if !deps.contains(&path) {
                        deps.push(path.clone());
                    }
                }
                let dialect = dialect_for(&path);
                let lowered = esm::lower(&strip_types(&source, dialect), dialect);
                json!({ "source": lowered.code }).to_string()
            }
            Err(e) => json!({ "error": format!("Cannot read {}: {e}", path.display()) }).to_string(),
        }
    }

    /// Resolve a `require` specifier relative to the requiring module's directory.
    fn resolve(&self, dir: &str, specifier: &str) -> String {
        let is_relative = specifier.starts_with("./")
            || specifier.starts_with("../")
            || Path::new(specifier).is_absolute();
        if !is_relative {
            return json!({
                "error": format!("Cannot find module '{specifier}': only relative paths can be required from a codemod")
            })
            .to_string();
        }

        let base = Path::new(dir).join(specifier);
        let mut candidates = vec![base.clone()];
        candidates.extend(
            self.extensions
                .iter()
                .map(|ext| PathBuf::from(format!("{}.{ext}", base.display()))),
        );
        candidates.extend(self.extensions.iter().map(|ext| base.join(format!("index.{ext}"))));

        match candidates.into_iter().find(|c| c.is_file()) {
            Some(found) => json!({ "path": normalize(&found).to_string_lossy() }).to_string(),
            None => json!({
                "error": format!("Cannot find module '{specifier}' from '{dir}'")
            })
            .to_string(),
        }
    }
}

/// A loaded codemod: an isolated JS runtime holding the resolved transform.
pub struct Transform {
    path: PathBuf,
    dialect: Dialect,
    host: Arc<HostState>,
    context: Context,
    // Dropped last; the context above references it.
    _runtime: Runtime,
}

impl Transform {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dialect the toolkit handed to this transform is bound to.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Files read while loading: the script itself followed by required helpers.
    pub fn dependencies(&self) -> Vec<PathBuf> {
        self.host.dependencies()
    }

    pub(crate) fn context(&self) -> &Context {
        &self.context
    }

    pub(crate) fn take_logs(&self) -> Vec<LogLine> {
        self.host.take_logs()
    }
}

impl std::fmt::Debug for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transform")
            .field("path", &self.path)
            .field("dialect", &self.dialect)
            .finish_non_exhaustive()
    }
}

struct ModuleCacheEntry {
    transform: Rc<Transform>,
    dependencies: Vec<PathBuf>,
}

impl ModuleCacheEntry {
    fn lives_under(&self, path: &Path, prefix: &Path) -> bool {
        path.starts_with(prefix) || self.dependencies.iter().any(|d| d.starts_with(prefix))
    }
}

/// Registry of loaded codemods keyed by their normalised absolute path.
pub struct ModuleLoader {
    codemod_dir: PathBuf,
    extensions: Vec<String>,
    dialect: Dialect,
    cache: HashMap<PathBuf, ModuleCacheEntry>,
}

impl ModuleLoader {
    pub fn new(codemod_dir: impl AsRef<Path>) -> Self {
        Self {
            codemod_dir: normalize(codemod_dir.as_ref()),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            dialect: Dialect::default(),
            cache: HashMap::new(),
        }
    }

    pub fn with_config(codemod_dir: impl AsRef<Path>, config: &CodemodConfig) -> Self {
        Self {
            extensions: config.extensions.clone(),
            dialect: config.parser,
            ..Self::new(codemod_dir)
        }
    }

    pub fn codemod_dir(&self) -> &Path {
        &self.codemod_dir
    }

    /// Evict every cached unit whose script or any of whose dependencies lives
    /// under `prefix`. Returns the number of evicted entries.
    pub fn invalidate(&mut self, prefix: &Path) -> usize {
        let prefix = normalize(prefix);
        let before = self.cache.len();
        self.cache
            .retain(|path, entry| !entry.lives_under(path, &prefix));
        let evicted = before - self.cache.len();
        if evicted > 0 {
            debug!("Evicted {evicted} cached codemod(s) under {}", prefix.display());
        }
        evicted
    }

    pub fn cached(&self, path: &Path) -> Option<Rc<Transform>> {
        self.cache
            .get(&normalize(path))
            .map(|entry| entry.transform.clone())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Load `path` fresh and return its transform.
    pub fn load(&mut self, path: &Path) -> Result<Rc<Transform>, CodemodError> {
        let path = normalize(path);
        let _span = tracing::info_span!("load_codemod", path = %path.display()).entered();

        let codemod_dir = self.codemod_dir.clone();
        self.invalidate(&codemod_dir);
        // A script outside the codemod directory still never outlives its own reload.
        self.cache.remove(&path);

        let runtime = Runtime::new()?;
        let context = Context::full(&runtime)?;
        let host = Arc::new(HostState::new(self.extensions.clone()));

        context.with(|ctx| -> Result<(), CodemodError> {
            install_host(&ctx, host.clone(), self.dialect)?;
            let _: Value = ctx.eval(PRELUDE)?;

            let load: Function = ctx.globals().get("__codemod_load")?;
            let exports: Value = load
                .call((path.to_string_lossy().to_string(),))
                .map_err(|err| CodemodError::Load {
                    path: path.clone(),
                    error: script_error(&ctx, err),
                })?;

            let transform = resolve_export(&exports).ok_or_else(|| CodemodError::NotCallable {
                path: path.clone(),
            })?;
            ctx.globals().set(TRANSFORM_KEY, transform)?;
            Ok(())
        })?;

        let transform = Rc::new(Transform {
            path: path.clone(),
            dialect: self.dialect,
            host,
            context,
            _runtime: runtime,
        });
        let dependencies = transform.dependencies();
        debug!(
            "Loaded codemod {} ({} file(s))",
            path.display(),
            dependencies.len()
        );
        self.cache.insert(
            path,
            ModuleCacheEntry {
                transform: transform.clone(),
                dependencies,
            },
        );
        Ok(transform)
    }
}

/// Fetch the resolved transform function of a loaded unit.
pub(crate) fn transform_function<'js>(ctx: &Ctx<'js>) -> rquickjs::Result<Function<'js>> {
    ctx.globals().get(TRANSFORM_KEY)
}

fn install_host<'js>(
    ctx: &Ctx<'js>,
    host: Arc<HostState>,
    dialect: Dialect,
) -> rquickjs::Result<()> {
    let bindings = Object::new(ctx.clone())?;
    // Parser of the toolkit that `require("jscodeshift")` hands out
    bindings.set("parser", dialect.name())?;

    let state = host.clone();
    bindings.set(
        "read",
        Function::new(ctx.clone(), move |path: String| state.read(&path))?,
    )?;

    let state = host.clone();
    bindings.set(
        "resolve",
        Function::new(ctx.clone(), move |dir: String, specifier: String| {
            state.resolve(&dir, &specifier)
        })?,
    )?;

    bindings.set(
        "tokenize",
        Function::new(ctx.clone(), |source: String, parser: String| {
            toolkit::tokens_json(&source, &parser)
        })?,
    )?;

    bindings.set(
        "log",
        Function::new(ctx.clone(), move |level: String, message: String| {
            host.log(level, message)
        })?,
    )?;

    ctx.globals().set("__codemod_host", bindings)?;
    Ok(())
}

/// `default` when it is callable, else the export object itself when callable.
fn resolve_export<'js>(exports: &Value<'js>) -> Option<Function<'js>> {
    if let Some(object) = exports.as_object() {
        if let Ok(default) = object.get::<_, Value>("default") {
            if let Some(function) = default.as_function() {
                return Some(function.clone());
            }
        }
    }
    exports.as_function().cloned()
}

/// Convert a failed engine call into a [`ScriptError`], taking the pending
/// exception off the context.
pub(crate) fn script_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> ScriptError {
    if !err.is_exception() {
        return ScriptError::new(err.to_string());
    }
    let thrown = ctx.catch();
    if let Some(exception) = thrown.as_exception() {
        return ScriptError::new(exception.message().unwrap_or_default())
            .with_stack(exception.stack());
    }
    let message = match thrown.type_of() {
        Type::String => thrown
            .as_string()
            .and_then(|s| s.to_string().ok())
            .unwrap_or_default(),
        Type::Int | Type::Float | Type::Bool => ctx
            .json_stringify(thrown.clone())
            .ok()
            .flatten()
            .and_then(|s| s.to_string().ok())
            .unwrap_or_default(),
        other => format!("Uncaught {other:?}"),
    };
    ScriptError::new(message)
}

/// Codemods are parsed permissively per extension when lowering.
fn dialect_for(path: &Path) -> Dialect {
    match path.extension().and_then(|e| e.to_str()) {
        Some("ts" | "mts" | "cts") => Dialect::Ts,
        Some("tsx") => Dialect::Tsx,
        Some("jsx") => Dialect::Jsx,
        _ => Dialect::Js,
    }
}

/// Absolute, symlink-resolved form of `path` when it exists; absolute otherwise.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn codemods() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let codemods = dir.path().join("codemods");
        fs::create_dir_all(&codemods).unwrap();
        (dir, codemods)
    }

    #[test]
    fn test_load_commonjs_function() {
        let (_dir, codemods) = codemods();
        let script = codemods.join("upper.js");
        fs::write(&script, "module.exports = (file) => file.source.toUpperCase();").unwrap();

        let mut loader = ModuleLoader::new(&codemods);
        let transform = loader.load(&script).unwrap();
        assert_eq!(transform.path(), normalize(&script));
        assert_eq!(loader.len(), 1);
        assert!(loader.cached(&script).is_some());
    }

    #[test]
    fn test_default_export_preferred() {
        let (_dir, codemods) = codemods();
        let script = codemods.join("both.js");
        fs::write(
            &script,
            "function bare() { return 'bare'; }\nbare.default = function () { return 'default'; };\nmodule.exports = bare;\n",
        )
        .unwrap();

        let mut loader = ModuleLoader::new(&codemods);
        let transform = loader.load(&script).unwrap();
        let name = transform.context().with(|ctx| {
            let f = transform_function(&ctx).unwrap();
            f.call::<_, String>(()).unwrap()
        });
        assert_eq!(name, "default");
    }

    #[test]
    fn test_typed_script_loads() {
        let (_dir, codemods) = codemods();
        let script = codemods.join("suffix.cm.ts");
        fs::write(
            &script,
            "interface Options {\n  suffix: string;\n}\nconst options: Options = { suffix: '!' };\n\nexport default function transform(source: string): string {\n  return (source as string) + options.suffix!;\n}\n",
        )
        .unwrap();

        let mut loader = ModuleLoader::new(&codemods);
        let transform = loader.load(&script).unwrap();
        let out = transform.context().with(|ctx| {
            let f = transform_function(&ctx).unwrap();
            f.call::<_, String>(("hi",)).unwrap()
        });
        assert_eq!(out, "hi!");
    }

    #[test]
    fn test_required_toolkit_uses_configured_parser() {
        let (_dir, codemods) = codemods();
        let script = codemods.join("parser.js");
        fs::write(
            &script,
            "const j = require('jscodeshift');\nmodule.exports = () => j.parser;",
        )
        .unwrap();
        let config = CodemodConfig {
            parser: Dialect::Js,
            ..CodemodConfig::default()
        };

        let mut loader = ModuleLoader::with_config(&codemods, &config);
        let transform = loader.load(&script).unwrap();
        let parser = transform.context().with(|ctx| {
            let f = transform_function(&ctx).unwrap();
            f.call::<_, String>(()).unwrap()
        });
        assert_eq!(parser, "js");
    }

    #[test]
    fn test_not_callable() {
        let (_dir, codemods) = codemods();
        let script = codemods.join("data.js");
        fs::write(&script, "module.exports = { answer: 42 };").unwrap();

        let mut loader = ModuleLoader::new(&codemods);
        let err = loader.load(&script).unwrap_err();
        assert!(matches!(err, CodemodError::NotCallable { .. }), "{err}");
        assert!(loader.is_empty());
    }

    #[test]
    fn test_syntax_error_is_load_failure() {
        let (_dir, codemods) = codemods();
        let script = codemods.join("broken.js");
        fs::write(&script, "module.exports = function ( {").unwrap();

        let mut loader = ModuleLoader::new(&codemods);
        match loader.load(&script) {
            Err(CodemodError::Load { error, .. }) => assert!(!error.message.is_empty()),
            other => panic!("expected load failure, got {other:?}"),
        }
    }

    #[test]
    fn test_throwing_top_level_message_verbatim() {
        let (_dir, codemods) = codemods();
        let script = codemods.join("throws.js");
        fs::write(&script, "throw new Error('config missing: FOO');").unwrap();

        let mut loader = ModuleLoader::new(&codemods);
        match loader.load(&script) {
            Err(CodemodError::Load { error, .. }) => {
                assert_eq!(error.message, "config missing: FOO")
            }
            other => panic!("expected load failure, got {other:?}"),
        }
    }

    #[test]
    fn test_require_records_dependencies() {
        let (_dir, codemods) = codemods();
        fs::create_dir_all(codemods.join("lib")).unwrap();
        fs::write(codemods.join("lib/index.js"), "exports.suffix = '!';").unwrap();
        let script = codemods.join("shout.js");
        fs::write(
            &script,
            "const { suffix } = require('./lib');\nmodule.exports = (f) => f.source + suffix;",
        )
        .unwrap();

        let mut loader = ModuleLoader::new(&codemods);
        let transform = loader.load(&script).unwrap();
        let deps = transform.dependencies();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0], normalize(&script));
        assert_eq!(deps[1], normalize(&codemods.join("lib/index.js")));
    }

    #[test]
    fn test_missing_module_is_load_failure() {
        let (_dir, codemods) = codemods();
        let script = codemods.join("needs.js");
        fs::write(&script, "require('left-pad'); module.exports = () => null;").unwrap();

        let mut loader = ModuleLoader::new(&codemods);
        match loader.load(&script) {
            Err(CodemodError::Load { error, .. }) => {
                assert!(error.message.contains("Cannot find module 'left-pad'"))
            }
            other => panic!("expected load failure, got {other:?}"),
        }
    }

    #[test]
    fn test_load_evicts_whole_subtree() {
        let (_dir, codemods) = codemods();
        let a = codemods.join("a.js");
        let b = codemods.join("b.js");
        fs::write(&a, "module.exports = () => 'a';").unwrap();
        fs::write(&b, "module.exports = () => 'b';").unwrap();

        let mut loader = ModuleLoader::new(&codemods);
        let first = loader.load(&a).unwrap();
        loader.load(&b).unwrap();
        assert!(loader.cached(&a).is_none());
        assert!(loader.cached(&b).is_some());

        let again = loader.load(&a).unwrap();
        assert!(!Rc::ptr_eq(&first, &again));
        assert_eq!(loader.len(), 1);
    }

    #[test]
    fn test_invalidate_by_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let codemods = dir.path().join("codemods");
        let shared = dir.path().join("shared");
        fs::create_dir_all(&codemods).unwrap();
        fs::create_dir_all(&shared).unwrap();
        fs::write(shared.join("util.js"), "exports.x = 1;").unwrap();
        let script = codemods.join("uses_shared.js");
        fs::write(
            &script,
            "require('../shared/util.js'); module.exports = () => null;",
        )
        .unwrap();

        let mut loader = ModuleLoader::new(&codemods);
        loader.load(&script).unwrap();
        assert_eq!(loader.invalidate(&dir.path().join("elsewhere")), 0);
        assert_eq!(loader.invalidate(&shared), 1);
        assert!(loader.is_empty());
    }
}
