use std::collections::BTreeMap;

use rquickjs::{Ctx, Object, Type, Value};
use serde::Deserialize;

use crate::error::ScriptError;
use crate::loader::{self, LogLine, Transform};

/// The file handed to a transform as its first argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformInput {
    pub source: String,
    /// Logical identity of the buffer; informational only.
    pub path: String,
}

/// Cursor handed to a transform: 1-based line, 0-based column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
}

impl CursorPosition {
    /// Convert an editor cursor (0-based line and column).
    pub fn from_editor(line: u32, column: u32) -> Self {
        Self {
            line: line + 1,
            column,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformResult {
    /// Replace the whole buffer with this text
    Replace(String),
    /// The transform asked for no change
    Skip,
    Failed(ScriptError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub result: TransformResult,
    /// `console.*` and `api.report` output, in call order
    pub logs: Vec<LogLine>,
    /// Counters bumped through `api.stats(name, quantity)`
    pub stats: BTreeMap<String, u64>,
}

#[derive(Deserialize)]
struct StatEvent {
    name: String,
    quantity: f64,
}

/// Run `transform(input, api, position)` and classify what it returned.
///
/// Exceptions thrown by the transform are captured as [`TransformResult::Failed`];
/// this function never panics or returns an error because of script behaviour.
pub fn execute(
    transform: &Transform,
    input: &TransformInput,
    position: Option<CursorPosition>,
) -> Execution {
    let _span = tracing::info_span!("execute_codemod", path = %transform.path().display()).entered();

    // Drop anything logged by top-level code while loading.
    transform.take_logs();

    let dialect = transform.dialect().name();
    let result = transform.context().with(|ctx| {
        match call_transform(&ctx, input, position, dialect) {
            Ok(value) => classify(&value),
            Err(err) => TransformResult::Failed(loader::script_error(&ctx, err)),
        }
    });

    let mut logs = Vec::new();
    let mut stats = BTreeMap::new();
    for line in transform.take_logs() {
        if line.level == "stats" {
            if let Ok(event) = serde_json::from_str::<StatEvent>(&line.message) {
                *stats.entry(event.name).or_insert(0) += event.quantity.max(0.0) as u64;
            }
        } else {
            logs.push(line);
        }
    }

    Execution {
        result,
        logs,
        stats,
    }
}

fn call_transform<'js>(
    ctx: &Ctx<'js>,
    input: &TransformInput,
    position: Option<CursorPosition>,
    dialect: &str,
) -> rquickjs::Result<Value<'js>> {
    let transform = loader::transform_function(ctx)?;
    let make_api: rquickjs::Function = ctx.globals().get("__codemod_api")?;
    let api: Value = make_api.call((dialect,))?;

    let file = Object::new(ctx.clone())?;
    file.set("source", input.source.as_str())?;
    file.set("path", input.path.as_str())?;

    let position = match position {
        Some(p) => {
            let object = Object::new(ctx.clone())?;
            object.set("line", p.line)?;
            object.set("column", p.column)?;
            Some(object)
        }
        None => None,
    };

    transform.call((file, api, position))
}

/// Falsy results mean "no change"; non-empty strings replace the buffer.
fn classify(value: &Value<'_>) -> TransformResult {
    let unexpected = |kind: &str| {
        TransformResult::Failed(ScriptError::new(format!(
            "transform returned {kind}, expected a string"
        )))
    };
    match value.type_of() {
        Type::Undefined | Type::Null => TransformResult::Skip,
        Type::String => {
            let text = value
                .as_string()
                .and_then(|s| s.to_string().ok())
                .unwrap_or_default();
            if text.is_empty() {
                TransformResult::Skip
            } else {
                TransformResult::Replace(text)
            }
        }
        Type::Bool => match value.as_bool() {
            Some(true) => unexpected("a boolean"),
            _ => TransformResult::Skip,
        },
        Type::Int => match value.as_int() {
            Some(0) => TransformResult::Skip,
            _ => unexpected("a number"),
        },
        Type::Float => match value.as_float() {
            Some(f) if f != 0.0 && !f.is_nan() => unexpected("a number"),
            _ => TransformResult::Skip,
        },
        Type::Array => unexpected("an array"),
        Type::Function => unexpected("a function"),
        Type::Object => unexpected("an object"),
        other => unexpected(&format!("{other:?}").to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ModuleLoader;
    use std::fs;
    use std::rc::Rc;

    fn load(source: &str) -> (tempfile::TempDir, Rc<Transform>) {
        load_file("t.js", source)
    }

    fn load_file(name: &str, source: &str) -> (tempfile::TempDir, Rc<Transform>) {
        let dir = tempfile::tempdir().unwrap();
        let codemods = dir.path().join("codemods");
        fs::create_dir_all(&codemods).unwrap();
        let script = codemods.join(name);
        fs::write(&script, source).unwrap();
        let transform = ModuleLoader::new(&codemods).load(&script).unwrap();
        (dir, transform)
    }

    fn input(source: &str) -> TransformInput {
        TransformInput {
            source: source.to_string(),
            path: "/project/src/app.ts".to_string(),
        }
    }

    #[test]
    fn test_replace() {
        let (_dir, t) = load("module.exports = (file) => file.path + ':' + file.source;");
        let run = execute(&t, &input("x"), None);
        assert_eq!(
            run.result,
            TransformResult::Replace("/project/src/app.ts:x".to_string())
        );
    }

    #[test]
    fn test_falsy_results_skip() {
        for body in ["undefined", "null", "''", "false", "0"] {
            let (_dir, t) = load(&format!("module.exports = () => {body};"));
            assert_eq!(
                execute(&t, &input("x"), None).result,
                TransformResult::Skip,
                "{body}"
            );
        }
    }

    #[test]
    fn test_unexpected_result_type() {
        let (_dir, t) = load("module.exports = () => ({ source: 'x' });");
        match execute(&t, &input("x"), None).result {
            TransformResult::Failed(err) => {
                assert_eq!(err.message, "transform returned an object, expected a string")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_throw_is_captured_with_stack() {
        let (_dir, t) = load(
            "function explode() { throw new Error('bad input'); }\nmodule.exports = () => explode();",
        );
        match execute(&t, &input("x"), None).result {
            TransformResult::Failed(err) => {
                assert_eq!(err.message, "bad input");
                assert!(err.stack.is_some_and(|s| s.contains("explode")));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_thrown_string() {
        let (_dir, t) = load("module.exports = () => { throw 'plain'; };");
        assert_eq!(
            execute(&t, &input("x"), None).result,
            TransformResult::Failed(ScriptError::new("plain"))
        );
    }

    #[test]
    fn test_position_passed_through() {
        let (_dir, t) = load(
            "module.exports = (f, api, pos) => pos === undefined ? 'none' : pos.line + ':' + pos.column;",
        );
        assert_eq!(
            execute(&t, &input("x"), None).result,
            TransformResult::Replace("none".into())
        );
        assert_eq!(
            execute(&t, &input("x"), Some(CursorPosition::from_editor(0, 4))).result,
            TransformResult::Replace("1:4".into())
        );
    }

    #[test]
    fn test_logs_report_and_stats() {
        let (_dir, t) = load(
            r#"
            console.log("loading");
            module.exports = (f, api) => {
                console.log("visited", { n: 1 });
                api.report("renamed foo");
                api.stats("rename");
                api.stats("rename", 2);
                return null;
            };
            "#,
        );
        let run = execute(&t, &input("x"), None);
        assert_eq!(run.result, TransformResult::Skip);
        let messages: Vec<_> = run.logs.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["visited {\"n\":1}", "renamed foo"]);
        assert_eq!(run.logs[1].level, "report");
        assert_eq!(run.stats.get("rename"), Some(&3));
    }

    #[test]
    fn test_repeatable_for_same_input() {
        let (_dir, t) = load("module.exports = (f, { j }) => j(f.source).toSource() + ';';");
        let first = execute(&t, &input("a = 1"), None);
        let second = execute(&t, &input("a = 1"), None);
        assert_eq!(first, second);
        assert_eq!(first.result, TransformResult::Replace("a = 1;".into()));
    }

    #[test]
    fn test_toolkit_reverse_identifiers() {
        let (_dir, t) = load(
            r#"
            module.exports = function (file, { j }) {
                const root = j(file.source);
                root.find(j.Identifier).replaceWith((p) =>
                    j.identifier(p.value.name.split("").reverse().join(""))
                );
                return root.toSource();
            };
            "#,
        );
        insta::assert_snapshot!(
            match execute(&t, &input("const foo = bar(`x ${baz}`); // foo"), None).result {
                TransformResult::Replace(s) => s,
                other => panic!("unexpected {other:?}"),
            },
            @"const oof = rab(`x ${zab}`); // foo"
        );
    }

    #[test]
    fn test_toolkit_cursor_and_literals() {
        let (_dir, t) = load(
            r#"
            module.exports = function (file, api, position) {
                const j = api.jscodeshift;
                const root = j(file.source);
                root.closestTo(position).replaceWith(j.identifier("renamed"));
                root.find(j.StringLiteral, { value: "old" }).forEach((p) => {
                    p.value.value = "new";
                });
                return root.toSource();
            };
            "#,
        );
        let run = execute(
            &t,
            &input("let a = 'old';\nlet target = 'keep';"),
            Some(CursorPosition::from_editor(1, 6)),
        );
        assert_eq!(
            run.result,
            TransformResult::Replace("let a = \"new\";\nlet renamed = 'keep';".into())
        );
    }

    #[test]
    fn test_typed_codemod_over_tsx() {
        let (_dir, t) = load_file(
            "reverse.cm.tsx",
            r#"
            import type { API, FileInfo } from "jscodeshift";

            export default function transform(file: FileInfo, { j }: API): string {
                return j(file.source)
                    .find(j.Identifier)
                    .replaceWith((p) => j.identifier(p.value.name.split("").reverse().join("")))
                    .toSource();
            }
            "#,
        );
        let source = "const el = <div>hello</div>;\nconst msg = <p>don't stop</p>;";
        assert_eq!(
            execute(&t, &input(source), None).result,
            TransformResult::Replace(
                "const le = <div>hello</div>;\nconst gsm = <p>don't stop</p>;".into()
            )
        );
    }

    #[test]
    fn test_toolkit_jsx_text() {
        let (_dir, t) = load(
            r#"
            module.exports = function (file, { j }) {
                const root = j(file.source);
                root.find(j.JSXText).forEach((p) => {
                    p.value.value = p.value.value.toUpperCase();
                });
                return root.toSource();
            };
            "#,
        );
        assert_eq!(
            execute(&t, &input("const el = <p className=\"x\">don't stop</p>;"), None).result,
            TransformResult::Replace("const el = <p className=\"x\">DON'T STOP</p>;".into())
        );
    }
}
