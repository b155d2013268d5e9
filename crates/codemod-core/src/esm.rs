//! Lowers ES module syntax to the CommonJS shape the loader evaluates.
//!
//! Codemods may be written either as CommonJS (`module.exports = fn`) or with
//! `import`/`export` statements. The loader evaluates every unit as a CommonJS
//! function body so that a single, explicit module registry handles all
//! `require`s; this pass rewrites the top-level `import`/`export` statements
//! in place and appends the export assignments that need the whole module to
//! have run first.

use crate::lexer::{Dialect, Token, TokenKind, tokenize};

/// Global helper installed by the prelude: unwraps `default` when present.
const IMPORT_DEFAULT: &str = "__codemod_importDefault";
/// Global helper installed by the prelude: copies (renamed) exports across.
const REEXPORT: &str = "__codemod_reexport";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lowered {
    pub code: String,
    /// Whether any `import`/`export` statement was rewritten
    pub is_esm: bool,
}

struct Edit {
    start: usize,
    end: usize,
    text: String,
}

pub fn lower(source: &str, dialect: Dialect) -> Lowered {
    let tokens = tokenize(source, dialect);
    let sig: Vec<&Token> = tokens.iter().filter(|t| !t.kind.is_trivia()).collect();
    let mut cx = Cx {
        source,
        sig,
        edits: Vec::new(),
        trailer: Vec::new(),
        imports: 0,
    };

    let mut depth = 0usize;
    let mut k = 0;
    while k < cx.sig.len() {
        let token = cx.sig[k];
        let text = cx.text(k);
        if token.kind == TokenKind::Punctuator {
            match text {
                "{" => depth += 1,
                "}" => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        let member_access = k > 0 && matches!(cx.text(k - 1), "." | "?.");
        let is_top_level = depth == 0 && token.kind == TokenKind::Keyword && !member_access;
        k = match text {
            "import" if is_top_level && !matches!(cx.text(k + 1), "(" | ".") => cx.import(k),
            "export" if is_top_level => cx.export(k),
            _ => k + 1,
        };
    }

    let is_esm = !cx.edits.is_empty() || !cx.trailer.is_empty();
    let mut code = String::with_capacity(source.len());
    let mut cursor = 0;
    for edit in &cx.edits {
        code.push_str(&source[cursor..edit.start]);
        code.push_str(&edit.text);
        cursor = edit.end;
    }
    code.push_str(&source[cursor..]);
    if !cx.trailer.is_empty() {
        if !code.ends_with('\n') {
            code.push('\n');
        }
        code.push_str(&cx.trailer.join("\n"));
        code.push('\n');
    }
    Lowered { code, is_esm }
}

struct Cx<'a> {
    source: &'a str,
    sig: Vec<&'a Token>,
    edits: Vec<Edit>,
    trailer: Vec<String>,
    imports: usize,
}

impl<'a> Cx<'a> {
    fn text(&self, k: usize) -> &'a str {
        self.sig.get(k).map(|t| t.text(self.source)).unwrap_or("")
    }

    fn kind(&self, k: usize) -> Option<TokenKind> {
        self.sig.get(k).map(|t| t.kind)
    }

    fn replace(&mut self, from: usize, to_inclusive: usize, text: String) {
        self.edits.push(Edit {
            start: self.sig[from].start,
            end: self.sig[to_inclusive].end,
            text,
        });
    }

    /// Remove `from..=to_inclusive` and a directly following `;`.
    fn remove_statement(&mut self, from: usize, mut to_inclusive: usize) -> usize {
        if self.text(to_inclusive + 1) == ";" {
            to_inclusive += 1;
        }
        self.replace(from, to_inclusive, String::new());
        to_inclusive + 1
    }

    /// Index of the first `needle` at or after `k` on the same nesting level.
    fn find(&self, k: usize, needle: &str) -> Option<usize> {
        let mut depth = 0i32;
        for i in k..self.sig.len() {
            let text = self.text(i);
            if depth == 0 && text == needle {
                return Some(i);
            }
            match text {
                "{" | "(" | "[" => depth += 1,
                "}" | ")" | "]" => depth -= 1,
                ";" if depth == 0 => return None,
                _ => {}
            }
        }
        None
    }

    fn import(&mut self, k: usize) -> usize {
        // import "side-effect";
        if self.kind(k + 1) == Some(TokenKind::String) {
            let specifier = self.text(k + 1);
            self.replace(k, k + 1, format!("require({specifier})"));
            return k + 2;
        }

        let Some(from) = self.find(k + 1, "from") else {
            return k + 1;
        };
        if self.kind(from + 1) != Some(TokenKind::String) {
            return k + 1;
        }
        let specifier = self.text(from + 1);

        // import type { A } from "./types";
        if self.text(k + 1) == "type" && !matches!(self.text(k + 2), "from" | ",") {
            return self.remove_statement(k, from + 1);
        }

        let module = format!("__import{}", self.imports);
        self.imports += 1;
        let mut declarators = vec![format!("{module} = require({specifier})")];

        let mut i = k + 1;
        while i < from {
            match self.text(i) {
                "," => i += 1,
                "*" => {
                    // * as ns
                    let ns = self.text(i + 2);
                    declarators.push(format!("{ns} = {module}"));
                    i += 3;
                }
                "{" => {
                    let close = self.find(i + 1, "}").unwrap_or(from);
                    let props = self.named_bindings(i + 1, close, &module, &mut declarators);
                    if !props.is_empty() {
                        declarators.push(format!("{{ {} }} = {module}", props.join(", ")));
                    }
                    i = close + 1;
                }
                name => {
                    declarators.push(format!("{name} = {IMPORT_DEFAULT}({module})"));
                    i += 1;
                }
            }
        }

        self.replace(k, from + 1, format!("const {}", declarators.join(", ")));
        from + 2
    }

    /// Parse `a, b as c, default as d, type T` between braces into destructuring
    /// properties; `default` imports become separate declarators.
    fn named_bindings(
        &self,
        start: usize,
        close: usize,
        module: &str,
        declarators: &mut Vec<String>,
    ) -> Vec<String> {
        let mut props = Vec::new();
        for (imported, local) in self.specifiers(start, close) {
            if imported == "default" {
                declarators.push(format!("{local} = {IMPORT_DEFAULT}({module})"));
            } else if imported == local {
                props.push(local.to_string());
            } else {
                props.push(format!("{imported}: {local}"));
            }
        }
        props
    }

    /// `(imported, local)` pairs of a specifier list, skipping `type` entries.
    fn specifiers(&self, start: usize, close: usize) -> Vec<(&'a str, &'a str)> {
        let mut out = Vec::new();
        let mut i = start;
        while i < close {
            if self.text(i) == "," {
                i += 1;
                continue;
            }
            if self.text(i) == "type" && !matches!(self.text(i + 1), "," | "}" | "as") {
                // `type T` / `type T as U`
                i += 2;
                if self.text(i) == "as" {
                    i += 2;
                }
                continue;
            }
            let imported = self.text(i);
            if self.text(i + 1) == "as" {
                out.push((imported, self.text(i + 2)));
                i += 3;
            } else {
                out.push((imported, imported));
                i += 1;
            }
        }
        out
    }

    fn export(&mut self, k: usize) -> usize {
        let next = self.text(k + 1);
        match next {
            "=" => {
                self.replace(k, k + 1, "module.exports =".to_string());
                k + 2
            }
            "default" => self.export_default(k),
            "function" | "class" | "async" => {
                let mut name_at = k + 2;
                if next == "async" {
                    name_at += 1;
                }
                if self.text(name_at) == "*" {
                    name_at += 1;
                }
                let name = self.text(name_at);
                self.strip_keyword(k);
                self.trailer.push(format!("module.exports.{name} = {name};"));
                k + 1
            }
            "const" | "let" | "var" => {
                if self.kind(k + 2) == Some(TokenKind::Identifier) {
                    let name = self.text(k + 2);
                    self.trailer.push(format!("module.exports.{name} = {name};"));
                }
                self.strip_keyword(k);
                k + 1
            }
            "type" if self.text(k + 2) == "{" => {
                let close = self.find(k + 3, "}").unwrap_or(k + 2);
                let end = if self.text(close + 1) == "from" {
                    close + 2
                } else {
                    close
                };
                self.remove_statement(k, end)
            }
            "{" => {
                let close = self.find(k + 2, "}").unwrap_or(k + 1);
                let specifiers = self.specifiers(k + 2, close);
                if self.text(close + 1) == "from" {
                    let specifier = self.text(close + 2);
                    let renames: Vec<String> = specifiers
                        .iter()
                        .map(|(imported, local)| format!("[\"{imported}\", \"{local}\"]"))
                        .collect();
                    self.replace(
                        k,
                        close + 2,
                        format!(
                            "{REEXPORT}(module.exports, require({specifier}), [{}])",
                            renames.join(", ")
                        ),
                    );
                    return close + 3;
                }
                for (local, exported) in specifiers {
                    self.trailer
                        .push(format!("module.exports.{exported} = {local};"));
                }
                self.remove_statement(k, close)
            }
            "*" => {
                // export * from "m";  export * as ns from "m";
                let Some(from) = self.find(k + 1, "from") else {
                    return k + 1;
                };
                let specifier = self.text(from + 1);
                let text = if self.text(k + 2) == "as" {
                    let ns = self.text(k + 3);
                    format!("module.exports.{ns} = require({specifier})")
                } else {
                    format!("{REEXPORT}(module.exports, require({specifier}), null)")
                };
                self.replace(k, from + 1, text);
                from + 2
            }
            _ => k + 1,
        }
    }

    fn export_default(&mut self, k: usize) -> usize {
        let mut name_at = k + 2;
        let declaration = match self.text(k + 2) {
            "function" | "class" => true,
            "async" if self.text(k + 3) == "function" => {
                name_at += 1;
                true
            }
            _ => false,
        };
        if declaration {
            name_at += 1;
            if self.text(name_at) == "*" {
                name_at += 1;
            }
            if self.kind(name_at) == Some(TokenKind::Identifier) {
                let name = self.text(name_at);
                // Keep the declaration so the name stays hoisted and in scope.
                self.replace(k, k + 1, String::new());
                self.trailer.push(format!("module.exports.default = {name};"));
                return k + 2;
            }
        }
        self.replace(k, k + 1, "module.exports.default =".to_string());
        k + 2
    }

    /// Drop the `export` keyword and the whitespace after it.
    fn strip_keyword(&mut self, k: usize) {
        self.edits.push(Edit {
            start: self.sig[k].start,
            end: self.sig[k + 1].start,
            text: String::new(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower_js(source: &str) -> String {
        lower(source, Dialect::Tsx).code
    }

    #[test]
    fn test_commonjs_untouched() {
        let source = "module.exports = function (file) { return file.source; };\n";
        let lowered = lower(source, Dialect::Tsx);
        assert!(!lowered.is_esm);
        assert_eq!(lowered.code, source);
    }

    #[test]
    fn test_export_default_expression() {
        insta::assert_snapshot!(
            lower_js("export default (file) => file.source.toUpperCase();"),
            @"module.exports.default = (file) => file.source.toUpperCase();"
        );
    }

    #[test]
    fn test_export_default_named_function_keeps_declaration() {
        let code = lower_js("export default function transform(file) {\n  return null;\n}\n");
        assert_eq!(
            code,
            " function transform(file) {\n  return null;\n}\nmodule.exports.default = transform;\n"
        );
    }

    #[test]
    fn test_export_equals() {
        assert_eq!(
            lower_js("export = function (file) {};"),
            "module.exports = function (file) {};"
        );
    }

    #[test]
    fn test_named_exports() {
        let code = lower_js("export const a = 1;\nexport function b() {}\nconst c = 2;\nexport { c as d };\n");
        assert_eq!(
            code,
            "const a = 1;\nfunction b() {}\nconst c = 2;\n\nmodule.exports.a = a;\nmodule.exports.b = b;\nmodule.exports.d = c;\n"
        );
    }

    #[test]
    fn test_imports() {
        assert_eq!(
            lower_js("import helper, { rename as r, keep } from \"./helper\";"),
            "const __import0 = require(\"./helper\"), helper = __codemod_importDefault(__import0), { rename: r, keep } = __import0;"
        );
        assert_eq!(
            lower_js("import * as util from './util';"),
            "const __import0 = require('./util'), util = __import0;"
        );
        assert_eq!(lower_js("import './setup';"), "require('./setup');");
    }

    #[test]
    fn test_type_only_imports_dropped() {
        let code = lower_js("import type { API, FileInfo } from 'jscodeshift';\nimport { type Node, walk } from './walk';\n");
        assert_eq!(
            code,
            "\nconst __import0 = require('./walk'), { walk } = __import0;\n"
        );
    }

    #[test]
    fn test_reexports() {
        assert_eq!(
            lower_js("export { a as b } from './a';"),
            "__codemod_reexport(module.exports, require('./a'), [[\"a\", \"b\"]]);"
        );
        assert_eq!(
            lower_js("export * from './a';"),
            "__codemod_reexport(module.exports, require('./a'), null);"
        );
    }

    #[test]
    fn test_nested_and_dynamic_import_untouched() {
        let source = "function f() { return import('./x'); }\nconst meta = import.meta;\n";
        let lowered = lower(source, Dialect::Tsx);
        assert!(!lowered.is_esm);
        assert_eq!(lowered.code, source);
    }
}
