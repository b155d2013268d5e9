//! Erases TypeScript type syntax so typed codemods evaluate as JavaScript.
//!
//! Like [`crate::esm`], this works on the token stream rather than a syntax
//! tree. Annotations, casts, generic argument lists and type-only declarations
//! are blanked out with spaces and their newlines kept, so line and column
//! numbers in stack traces still point into the file on disk. `enum` and
//! `namespace` carry runtime values and are left as they are.

use crate::lexer::{Dialect, Token, TokenKind, tokenize};

/// Modifiers that only exist in the type system.
const MODIFIERS: &[&str] = &[
    "public",
    "private",
    "protected",
    "readonly",
    "declare",
    "abstract",
    "override",
];

/// Class member prefixes that survive erasure.
const MEMBER_PREFIXES: &[&str] = &["static", "async", "get", "set", "accessor"];

/// Words that start a type operator rather than name a type.
const TYPE_OPERATORS: &[&str] = &["keyof", "typeof", "readonly", "unique", "infer", "asserts"];

pub fn strip_types(source: &str, dialect: Dialect) -> String {
    if !dialect.is_typed() {
        return source.to_string();
    }
    let tokens = tokenize(source, dialect);
    let sig: Vec<&Token> = tokens.iter().filter(|t| !t.kind.is_trivia()).collect();
    let mut eraser = Eraser::new(source, sig);
    eraser.run();
    eraser.finish()
}

struct Eraser<'a> {
    source: &'a str,
    sig: Vec<&'a Token>,
    /// Index of the matching closer for every `(`, `[` and `{`
    matching: Vec<Option<usize>>,
    /// Tokens inside `import { .. }` / `export { .. }` specifier lists
    clause: Vec<bool>,
    erased: Vec<bool>,
}

impl<'a> Eraser<'a> {
    fn new(source: &'a str, sig: Vec<&'a Token>) -> Self {
        let len = sig.len();
        let mut eraser = Self {
            source,
            sig,
            matching: vec![None; len],
            clause: vec![false; len],
            erased: vec![false; len],
        };
        eraser.match_brackets();
        eraser.mark_clauses();
        eraser
    }

    fn text(&self, k: usize) -> &'a str {
        self.sig.get(k).map(|t| t.text(self.source)).unwrap_or("")
    }

    fn kind(&self, k: usize) -> Option<TokenKind> {
        self.sig.get(k).map(|t| t.kind)
    }

    fn punct(&self, k: usize, text: &str) -> bool {
        self.kind(k) == Some(TokenKind::Punctuator) && self.text(k) == text
    }

    fn is_name(&self, k: usize) -> bool {
        matches!(
            self.kind(k),
            Some(TokenKind::Identifier | TokenKind::Keyword)
        )
    }

    fn word(&self, k: usize, word: &str) -> bool {
        self.is_name(k) && self.text(k) == word
    }

    fn erase(&mut self, from: usize, to_inclusive: usize) {
        let to = to_inclusive.min(self.sig.len().saturating_sub(1));
        for flag in self.erased.iter_mut().take(to + 1).skip(from) {
            *flag = true;
        }
    }

    fn match_brackets(&mut self) {
        let mut open: Vec<usize> = Vec::new();
        for k in 0..self.sig.len() {
            if self.kind(k) != Some(TokenKind::Punctuator) {
                continue;
            }
            let closes = match self.text(k) {
                "(" | "[" | "{" => {
                    open.push(k);
                    continue;
                }
                ")" => "(",
                "]" => "[",
                "}" => "{",
                _ => continue,
            };
            if open.last().is_some_and(|&o| self.text(o) == closes) {
                if let Some(o) = open.pop() {
                    self.matching[o] = Some(k);
                }
            }
        }
    }

    fn mark_clauses(&mut self) {
        for k in 1..self.sig.len() {
            if !self.punct(k, "{") {
                continue;
            }
            let opens_clause = self.word(k - 1, "import")
                || self.word(k - 1, "export")
                || (self.word(k - 1, "type") && k >= 2 && self.word(k - 2, "import"))
                || (self.word(k - 1, "type") && k >= 2 && self.word(k - 2, "export"))
                || (self.punct(k - 1, ",") && k >= 3 && self.word(k - 3, "import"));
            if let (true, Some(close)) = (opens_clause, self.matching[k]) {
                for flag in &mut self.clause[k..=close] {
                    *flag = true;
                }
            }
        }
    }

    /// First token of a statement: after `;`, a brace, or on a fresh line.
    fn statement_start(&self, k: usize) -> bool {
        if k == 0 {
            return true;
        }
        matches!(self.text(k - 1), ";" | "{" | "}")
            || self.sig[k].loc_start.line > self.sig[k - 1].loc_end.line
    }

    /// Whether `k` can end an expression, so that a following `as` or `!`
    /// applies to it.
    fn expression_end(&self, k: usize) -> bool {
        let text = self.text(k);
        match self.kind(k) {
            Some(TokenKind::Identifier | TokenKind::Number | TokenKind::String) => true,
            Some(TokenKind::Regex) => true,
            Some(TokenKind::Template) => text.len() > 1 && text.ends_with('`'),
            Some(TokenKind::Keyword) => {
                matches!(text, "this" | "super" | "null" | "true" | "false")
            }
            Some(TokenKind::Punctuator) => matches!(text, ")" | "]" | "}"),
            _ => false,
        }
    }

    fn run(&mut self) {
        let mut k = 0;
        while k < self.sig.len() {
            k = if self.erased[k] { k + 1 } else { self.visit(k) };
        }
    }

    fn visit(&mut self, k: usize) -> usize {
        if self.statement_start(k) {
            if let Some(end) = self.type_declaration(k) {
                self.erase(k, end);
                return end + 1;
            }
        }
        let text = self.text(k);
        match self.kind(k) {
            Some(TokenKind::Keyword | TokenKind::Identifier) => match text {
                "as" | "satisfies" if self.is_cast(k) => {
                    let end = self.skip_type(k + 1);
                    self.erase(k, end - 1);
                    end
                }
                "abstract" if self.word(k + 1, "class") => {
                    self.erase(k, k);
                    k + 1
                }
                "const" | "let" | "var" if self.kind(k) == Some(TokenKind::Keyword) => {
                    self.declaration(k);
                    k + 1
                }
                "class" if self.kind(k) == Some(TokenKind::Keyword) => {
                    self.class(k);
                    k + 1
                }
                _ => k + 1,
            },
            Some(TokenKind::Punctuator) => {
                match text {
                    "!" if k > 0
                        && self.expression_end(k - 1)
                        && self.sig[k - 1].end == self.sig[k].start =>
                    {
                        self.erase(k, k);
                    }
                    "(" => self.parameters(k),
                    "<" => self.type_arguments(k),
                    _ => {}
                }
                k + 1
            }
            _ => k + 1,
        }
    }

    /// `interface`, `type X =` and `declare` statements, with any leading
    /// `export`. Returns the last token of the statement.
    fn type_declaration(&self, k: usize) -> Option<usize> {
        let mut d = k;
        if self.word(d, "export") {
            d += 1;
        }
        if self.kind(d) != Some(TokenKind::Keyword) {
            return None;
        }
        match self.text(d) {
            "interface" if self.kind(d + 1) == Some(TokenKind::Identifier) => {
                let open = (d + 2..self.sig.len()).find(|&i| self.punct(i, "{"))?;
                self.matching[open]
            }
            "type" if self.kind(d + 1) == Some(TokenKind::Identifier) => {
                let mut n = d + 2;
                if self.punct(n, "<") {
                    n = self.angle_end(n)?;
                }
                if !self.punct(n, "=") {
                    return None;
                }
                Some(self.statement_end(self.skip_type(n + 1)))
            }
            "declare" => {
                let mut i = d + 1;
                while i < self.sig.len() {
                    match self.text(i) {
                        "(" | "[" => i = self.matching[i]? + 1,
                        "{" => return self.matching[i].map(|c| self.statement_end(c + 1)),
                        ";" => return Some(i),
                        ":" => return Some(self.statement_end(self.skip_type(i + 1))),
                        _ => i += 1,
                    }
                }
                None
            }
            _ => None,
        }
    }

    /// `end` is the first token after a statement body: include it when it
    /// is the terminating `;`.
    fn statement_end(&self, end: usize) -> usize {
        if self.punct(end, ";") { end } else { end - 1 }
    }

    fn is_cast(&self, k: usize) -> bool {
        k > 0
            && !self.clause[k]
            && self.expression_end(k - 1)
            && self.skip_type(k + 1) > k + 1
    }

    /// `const x: T = ..`, `let [a, b]: T`, `let x!: T`.
    fn declaration(&mut self, k: usize) {
        let name = k + 1;
        let end = match self.text(name) {
            "{" | "[" => match self.matching[name] {
                Some(close) => close,
                None => return,
            },
            _ if self.kind(name) == Some(TokenKind::Identifier) => name,
            _ => return,
        };
        let mut colon = end + 1;
        if self.punct(colon, "!") && self.punct(colon + 1, ":") {
            colon += 1;
        }
        if self.punct(colon, ":") {
            let type_end = self.skip_type(colon + 1);
            self.erase(end + 1, type_end - 1);
        }
    }

    /// Type parameters, `implements` clauses and member annotations of a class.
    fn class(&mut self, k: usize) {
        let mut n = k + 1;
        if self.kind(n) == Some(TokenKind::Identifier) && !self.word(n, "implements") {
            n += 1;
        }
        if self.punct(n, "<") {
            match self.angle_end(n) {
                Some(end) => {
                    self.erase(n, end - 1);
                    n = end;
                }
                None => return,
            }
        }
        if self.word(n, "extends") {
            n += 1;
            while n < self.sig.len() && !self.punct(n, "{") && !self.word(n, "implements") {
                if self.punct(n, "<") {
                    if let Some(end) = self.angle_end(n) {
                        self.erase(n, end - 1);
                        n = end;
                        continue;
                    }
                }
                n = match self.text(n) {
                    "(" | "[" => self.matching[n].map_or(n + 1, |c| c + 1),
                    _ => n + 1,
                };
            }
        }
        if self.word(n, "implements") {
            let Some(open) = (n..self.sig.len()).find(|&i| self.punct(i, "{")) else {
                return;
            };
            self.erase(n, open - 1);
            n = open;
        }
        if self.punct(n, "{") {
            self.members(n);
        }
    }

    fn members(&mut self, open: usize) {
        let Some(close) = self.matching[open] else {
            return;
        };
        let mut i = open + 1;
        let mut start = true;
        while i < close {
            let fresh_line = self.sig[i].loc_start.line > self.sig[i - 1].loc_end.line;
            if start || (fresh_line && self.expression_end(i - 1)) {
                i = self.member(i);
                start = false;
                continue;
            }
            match self.text(i) {
                "(" | "[" => i = self.matching[i].map_or(i + 1, |c| c + 1),
                "{" => {
                    i = self.matching[i].map_or(i + 1, |c| c + 1);
                    start = true;
                }
                ";" => {
                    i += 1;
                    start = true;
                }
                _ => i += 1,
            }
        }
    }

    /// Erase modifiers and the field annotation of the member starting at
    /// `i`. Returns where scanning of the member continues.
    fn member(&mut self, mut i: usize) -> usize {
        loop {
            let word = self.text(i);
            if self.is_name(i) && MODIFIERS.contains(&word) && self.member_name_follows(i) {
                self.erase(i, i);
                i += 1;
            } else if self.is_name(i)
                && MEMBER_PREFIXES.contains(&word)
                && self.member_name_follows(i)
            {
                i += 1;
            } else if self.punct(i, "*") {
                i += 1;
            } else {
                break;
            }
        }
        let after_name = match self.text(i) {
            "[" => match self.matching[i] {
                Some(c) => c + 1,
                None => return i + 1,
            },
            "#" => i + 2,
            _ if self.is_name(i)
                || matches!(self.kind(i), Some(TokenKind::String | TokenKind::Number)) =>
            {
                i + 1
            }
            _ => return i,
        };
        let mut colon = after_name;
        if (self.punct(colon, "?") || self.punct(colon, "!"))
            && matches!(self.text(colon + 1), ":" | "(" | ";" | "=" | "}")
        {
            self.erase(colon, colon);
            colon += 1;
        }
        if self.punct(colon, ":") {
            let end = self.skip_type(colon + 1);
            self.erase(colon, end - 1);
            return end;
        }
        colon
    }

    fn member_name_follows(&self, k: usize) -> bool {
        self.is_name(k + 1)
            || self.kind(k + 1) == Some(TokenKind::String)
            || matches!(self.text(k + 1), "[" | "#" | "*")
    }

    /// Whether the `(` at `k` opens the parameters of a function or method
    /// declaration rather than a call or grouping.
    fn declares_function(&self, k: usize) -> bool {
        let mut p = k;
        while p > 0 && self.erased[p - 1] {
            p -= 1;
        }
        if p == 0 {
            return false;
        }
        let prev = p - 1;
        match self.kind(prev) {
            Some(TokenKind::Identifier) => true,
            Some(TokenKind::Keyword) => {
                matches!(self.text(prev), "function" | "catch" | "get" | "set")
            }
            _ => false,
        }
    }

    /// Parameter annotations, optional markers and the return type of the
    /// function whose parameter list opens at `k`.
    fn parameters(&mut self, k: usize) {
        let Some(close) = self.matching[k] else {
            return;
        };
        let after = close + 1;
        let mut return_type = None;
        let is_params = match self.text(after) {
            "=>" => true,
            ":" => {
                let end = self.skip_type(after + 1);
                let arrow = self.punct(end, "=>");
                let body = self.punct(end, "{") && self.declares_function(k);
                if arrow || body {
                    return_type = Some(end);
                }
                arrow || body
            }
            "{" => self.declares_function(k),
            _ => false,
        };
        if !is_params {
            return;
        }

        let mut i = k + 1;
        let mut param_start = true;
        let mut in_default = false;
        while i < close {
            if param_start {
                param_start = false;
                while self.is_name(i)
                    && MODIFIERS.contains(&self.text(i))
                    && (self.is_name(i + 1) || matches!(self.text(i + 1), "{" | "["))
                {
                    self.erase(i, i);
                    i += 1;
                }
                if self.word(i, "this") && self.punct(i + 1, ":") {
                    let mut end = self.skip_type(i + 2);
                    if self.punct(end, ",") {
                        end += 1;
                    }
                    self.erase(i, end - 1);
                    i = end;
                    param_start = true;
                    continue;
                }
            }
            match self.text(i) {
                "(" | "[" | "{" => i = self.matching[i].map_or(i + 1, |c| c + 1),
                "," => {
                    in_default = false;
                    param_start = true;
                    i += 1;
                }
                "=" => {
                    in_default = true;
                    i += 1;
                }
                "?" if !in_default && matches!(self.text(i + 1), ":" | "," | ")") => {
                    self.erase(i, i);
                    i += 1;
                }
                ":" if !in_default => {
                    let end = self.skip_type(i + 1);
                    self.erase(i, end - 1);
                    i = end;
                }
                _ => i += 1,
            }
        }
        if let Some(end) = return_type {
            self.erase(after, end - 1);
        }
    }

    /// `f<T>(..)`, `new Map<K, V>()` and `<T,>(x: T) => x`.
    fn type_arguments(&mut self, k: usize) {
        let applies = k == 0
            || !self.expression_end(k - 1)
            || self.kind(k - 1) == Some(TokenKind::Identifier);
        if !applies {
            return;
        }
        if let Some(end) = self.angle_end(k) {
            if self.punct(end, "(") {
                self.erase(k, end - 1);
            }
        }
    }

    /// Index just past the `>` that closes the `<` at `k`, if the tokens in
    /// between can form a type argument list.
    fn angle_end(&self, k: usize) -> Option<usize> {
        let mut depth = 0i32;
        let mut i = k;
        while i < self.sig.len() {
            let text = self.text(i);
            match self.kind(i) {
                Some(TokenKind::Punctuator) => match text {
                    "<" => depth += 1,
                    ">" => depth -= 1,
                    ">>" => depth -= 2,
                    ">>>" => depth -= 3,
                    "(" | "[" | "{" => i = self.matching[i]?,
                    "," | "." | "|" | "&" | "?" | ":" | "=>" | "=" | "..." | "-" => {}
                    _ => return None,
                },
                Some(
                    TokenKind::Identifier
                    | TokenKind::Keyword
                    | TokenKind::String
                    | TokenKind::Number
                    | TokenKind::Template,
                ) => {}
                _ => return None,
            }
            i += 1;
            if depth == 0 {
                return Some(i);
            }
            if depth < 0 {
                return None;
            }
        }
        None
    }

    /// Index just past the type starting at `p`; `p` itself when none starts
    /// there.
    fn skip_type(&self, p: usize) -> usize {
        let q = self.skip_union(p);
        if q == p || !self.word(q, "extends") {
            return q;
        }
        // Conditional type: `A extends B ? C : D`
        let r = self.skip_union(q + 1);
        if !self.punct(r, "?") {
            return r;
        }
        let s = self.skip_type(r + 1);
        if self.punct(s, ":") {
            self.skip_type(s + 1)
        } else {
            s
        }
    }

    fn skip_union(&self, mut p: usize) -> usize {
        let start = p;
        if self.punct(p, "|") || self.punct(p, "&") {
            p += 1;
        }
        loop {
            let q = self.skip_postfix(p);
            if q == p {
                return if p == start + 1 { start } else { p };
            }
            p = q;
            if self.punct(p, "|") || self.punct(p, "&") {
                p += 1;
                continue;
            }
            return p;
        }
    }

    /// A primary type followed by any `[]` or `[K]` suffixes.
    fn skip_postfix(&self, p: usize) -> usize {
        let mut q = self.skip_primary(p);
        if q == p {
            return p;
        }
        while self.punct(q, "[") && self.sig[q].loc_start.line == self.sig[q - 1].loc_end.line {
            match self.matching[q] {
                Some(close) => q = close + 1,
                None => break,
            }
        }
        q
    }

    fn skip_primary(&self, p: usize) -> usize {
        let text = self.text(p);
        match self.kind(p) {
            Some(TokenKind::Punctuator) => match text {
                "(" => {
                    let Some(close) = self.matching[p] else {
                        return p;
                    };
                    if self.punct(close + 1, "=>") {
                        self.skip_type(close + 2)
                    } else {
                        close + 1
                    }
                }
                "{" | "[" => self.matching[p].map_or(p, |c| c + 1),
                // Generic function type: `<T>(x: T) => T`
                "<" => self.angle_end(p).map_or(p, |q| self.skip_primary(q)),
                "-" if self.kind(p + 1) == Some(TokenKind::Number) => p + 2,
                _ => p,
            },
            Some(TokenKind::String | TokenKind::Number) => p + 1,
            Some(TokenKind::Template) => {
                if text.len() > 1 && text.ends_with('`') {
                    return p + 1;
                }
                (p + 1..self.sig.len())
                    .find(|&i| self.kind(i) == Some(TokenKind::Template) && self.text(i).ends_with('`'))
                    .map_or(p + 1, |i| i + 1)
            }
            Some(TokenKind::Identifier | TokenKind::Keyword) => {
                if TYPE_OPERATORS.contains(&text) && self.skip_primary(p + 1) > p + 1 {
                    return self.skip_postfix(p + 1);
                }
                if text == "new" {
                    return self.skip_primary(p + 1);
                }
                let mut q = p + 1;
                while self.punct(q, ".") && self.is_name(q + 1) {
                    q += 2;
                }
                if self.punct(q, "<") {
                    if let Some(end) = self.angle_end(q) {
                        q = end;
                    }
                }
                if self.word(q, "is") {
                    return self.skip_type(q + 1);
                }
                q
            }
            _ => p,
        }
    }

    /// Rebuild the source with erased tokens (and the trivia between them)
    /// blanked out. Newlines stay so positions do not move.
    fn finish(self) -> String {
        let mut out = String::with_capacity(self.source.len());
        let mut cursor = 0;
        let mut k = 0;
        while k < self.sig.len() {
            if !self.erased[k] {
                k += 1;
                continue;
            }
            let mut last = k;
            while last + 1 < self.sig.len() && self.erased[last + 1] {
                last += 1;
            }
            let (start, end) = (self.sig[k].start, self.sig[last].end);
            out.push_str(&self.source[cursor..start]);
            out.extend(
                self.source[start..end]
                    .chars()
                    .map(|c| if c == '\n' || c == '\r' { c } else { ' ' }),
            );
            cursor = end;
            k = last + 1;
        }
        out.push_str(&self.source[cursor..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Strip and collapse runs of blanks so expectations stay readable.
    fn strip(source: &str) -> String {
        let stripped = strip_types(source, Dialect::Ts);
        assert_eq!(stripped.lines().count(), source.lines().count());
        stripped
            .split('\n')
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_parameter_and_return_annotations() {
        assert_eq!(
            strip("export default function transform(file: FileInfo, { j }: API): string {"),
            "export default function transform(file , { j } ) {"
        );
        assert_eq!(
            strip("const f = (a?: number, b: Array<Map<string, number>> = []): void => a;"),
            "const f = (a , b = []) => a;"
        );
        assert_eq!(
            strip("function g(cb: (x: number) => void, ...rest: string[]) {}"),
            "function g(cb , ...rest ) {}"
        );
    }

    #[test]
    fn test_variable_annotations_and_casts() {
        assert_eq!(
            strip("const n: number = (x as any).length!;"),
            "const n = (x ).length ;"
        );
        assert_eq!(
            strip("let { a }: Props = props satisfies Props;"),
            "let { a } = props ;"
        );
        assert_eq!(strip("const all = [1, 2] as const;"), "const all = [1, 2] ;");
    }

    #[test]
    fn test_type_declarations_removed() {
        let source = "interface Options {\n  name: string;\n}\nexport type Pair<T> = [T, T];\ndeclare const VERSION: string;\nconst x = 1;";
        assert_eq!(strip(source), "\n\n\n\n\nconst x = 1;");
    }

    #[test]
    fn test_generics() {
        assert_eq!(
            strip("function first<T extends object>(items: T[]): T | undefined { return items[0]; }"),
            "function first (items ) { return items[0]; }"
        );
        assert_eq!(
            strip("const seen = new Map<string, number>();"),
            "const seen = new Map ();"
        );
        assert_eq!(strip("if (a < b && c > (d)) {}"), "if (a < b && c > (d)) {}");
    }

    #[test]
    fn test_class_members() {
        let source = "abstract class Walker<T> extends Base<T> implements Visitor {\n  private readonly seen: Set<string> = new Set();\n  count?: number;\n  constructor(public root: T) { super(); }\n  visit(node: T): boolean { return true; }\n}";
        assert_eq!(
            strip(source),
            "class Walker extends Base {\nseen = new Set();\ncount ;\nconstructor( root ) { super(); }\nvisit(node ) { return true; }\n}"
        );
    }

    #[test]
    fn test_javascript_untouched() {
        let source = "const o = { a: 1, b: c ? d : e };\nimport { a as b } from './x';\nlabel: for (;;) {}";
        assert_eq!(strip_types(source, Dialect::Ts), source);
        assert_eq!(strip_types("let x: number;", Dialect::Js), "let x: number;");
    }
}
