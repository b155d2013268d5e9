//! Permissive, lossless tokenizer for JavaScript-family source.
//!
//! The token stream partitions the input: concatenating every token's text
//! reproduces the source byte-for-byte. Malformed input (unterminated strings,
//! comments or templates, stray characters) never fails; the offending span is
//! closed at the end of the line or file and lexing continues.
//!
//! JSX dialects also track element context: tag and attribute names become
//! [`TokenKind::JsxIdentifier`] and element children become
//! [`TokenKind::JsxText`], so neither is mistaken for code.

use serde::{Deserialize, Serialize};

/// Source dialect. Typed dialects add TypeScript's contextual keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Js,
    #[serde(alias = "babel", alias = "flow")]
    Jsx,
    Ts,
    #[default]
    Tsx,
}

impl Dialect {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "js" | "javascript" => Some(Dialect::Js),
            "jsx" | "babel" | "babylon" | "flow" => Some(Dialect::Jsx),
            "ts" | "typescript" => Some(Dialect::Ts),
            "tsx" => Some(Dialect::Tsx),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Js => "js",
            Dialect::Jsx => "jsx",
            Dialect::Ts => "ts",
            Dialect::Tsx => "tsx",
        }
    }

    pub fn is_typed(self) -> bool {
        matches!(self, Dialect::Ts | Dialect::Tsx)
    }

    pub fn has_jsx(self) -> bool {
        matches!(self, Dialect::Jsx | Dialect::Tsx)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    Whitespace,
    Comment,
    Identifier,
    Keyword,
    Number,
    String,
    /// A template literal chunk: from the opening backtick or closing `}` of a
    /// substitution up to and including the next `${` or closing backtick.
    Template,
    Regex,
    Punctuator,
    /// Tag or attribute name inside a JSX element (`div`, `data-id`)
    JsxIdentifier,
    /// Literal text between JSX tags
    JsxText,
}

impl TokenKind {
    pub fn is_trivia(self) -> bool {
        matches!(self, TokenKind::Whitespace | TokenKind::Comment)
    }
}

/// 1-based line, 0-based column (in characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Loc {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offsets into the source
    pub start: usize,
    pub end: usize,
    pub loc_start: Loc,
    pub loc_end: Loc,
}

impl Token {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

const RESERVED: &[&str] = &[
    "await",
    "break",
    "case",
    "catch",
    "class",
    "const",
    "continue",
    "debugger",
    "default",
    "delete",
    "do",
    "else",
    "enum",
    "export",
    "extends",
    "false",
    "finally",
    "for",
    "function",
    "if",
    "implements",
    "import",
    "in",
    "instanceof",
    "interface",
    "let",
    "new",
    "null",
    "package",
    "private",
    "protected",
    "public",
    "return",
    "static",
    "super",
    "switch",
    "this",
    "throw",
    "true",
    "try",
    "typeof",
    "var",
    "void",
    "while",
    "with",
    "yield",
];

/// Words that are keywords only in keyword position (see [`is_keyword_position`]).
const CONTEXTUAL: &[&str] = &["as", "async", "from", "get", "of", "set"];

const TYPED_CONTEXTUAL: &[&str] = &[
    "abstract",
    "asserts",
    "declare",
    "infer",
    "is",
    "keyof",
    "module",
    "namespace",
    "override",
    "readonly",
    "satisfies",
    "type",
    "unique",
];

/// Longest first so that greedy matching picks the right operator.
const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "<<", ">>", "**",
];

pub fn tokenize(source: &str, dialect: Dialect) -> Vec<Token> {
    let mut lexer = Lexer {
        src: source,
        pos: 0,
        line: 1,
        column: 0,
        jsx: dialect.has_jsx(),
        stack: Vec::new(),
        tokens: Vec::new(),
    };
    lexer.run();
    let mut tokens = lexer.tokens;
    classify_contextual(&mut tokens, source, dialect);
    tokens
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    column: u32,
    jsx: bool,
    stack: Vec<Context>,
    tokens: Vec<Token>,
}

/// What an open delimiter on the lexer stack belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    /// `{` in code
    Brace,
    /// `${` in a template literal
    Substitution,
    /// `{` inside a JSX tag or children
    JsxExpression,
    /// Between `<` and `>` of a JSX tag; `closing` for `</name>`
    JsxTag { closing: bool },
    /// Between an opening tag's `>` and the `<` of its closing tag
    JsxChildren,
}

impl Lexer<'_> {
    fn run(&mut self) {
        while let Some(c) = self.peek() {
            let start = self.pos;
            let loc_start = self.loc();
            let kind = match self.stack.last() {
                Some(Context::JsxTag { .. }) => self.jsx_tag_kind(c),
                Some(Context::JsxChildren) => self.jsx_children_kind(c),
                _ => self.next_kind(c),
            };
            debug_assert!(self.pos > start, "lexer made no progress");
            self.tokens.push(Token {
                kind,
                start,
                end: self.pos,
                loc_start,
                loc_end: self.loc(),
            });
        }
    }

    fn next_kind(&mut self, c: char) -> TokenKind {
        let next = self.peek_at(1);
        if c.is_whitespace() {
            self.eat_while(char::is_whitespace);
            TokenKind::Whitespace
        } else if c == '/' && next == Some('/') {
            self.eat_while(|c| c != '\n');
            TokenKind::Comment
        } else if c == '/' && next == Some('*') {
            self.bump();
            self.bump();
            while self.peek().is_some() && !self.rest().starts_with("*/") {
                self.bump();
            }
            self.bump();
            self.bump();
            TokenKind::Comment
        } else if is_id_start(c) {
            self.eat_while(is_id_continue);
            let word = &self.src[self.tokens_end()..self.pos];
            if RESERVED.contains(&word) {
                TokenKind::Keyword
            } else {
                TokenKind::Identifier
            }
        } else if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) {
            self.number();
            TokenKind::Number
        } else if c == '"' || c == '\'' {
            self.string(c);
            TokenKind::String
        } else if c == '`' {
            self.bump();
            self.template_chunk();
            TokenKind::Template
        } else if c == '}' && self.stack.last() == Some(&Context::Substitution) {
            self.stack.pop();
            self.bump();
            self.template_chunk();
            TokenKind::Template
        } else if c == '}' && self.stack.last() == Some(&Context::JsxExpression) {
            self.stack.pop();
            self.bump();
            TokenKind::Punctuator
        } else if c == '<' && self.jsx && self.jsx_element_starts() {
            self.bump();
            self.stack.push(Context::JsxTag { closing: false });
            TokenKind::Punctuator
        } else if c == '/' && self.regex_allowed() {
            self.regex();
            TokenKind::Regex
        } else {
            self.punctuator(c);
            TokenKind::Punctuator
        }
    }

    /// Start offset of the token being lexed.
    fn tokens_end(&self) -> usize {
        self.tokens.last().map(|t| t.end).unwrap_or(0)
    }

    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn loc(&self) -> Loc {
        Loc {
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }

    fn number(&mut self) {
        let radix_prefix = self.peek() == Some('0')
            && matches!(
                self.peek_at(1),
                Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')
            );
        if radix_prefix {
            self.bump();
            self.bump();
            self.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
            return;
        }
        self.eat_while(|c| c.is_ascii_digit() || c == '_');
        if self.peek() == Some('.') {
            self.bump();
            self.eat_while(|c| c.is_ascii_digit() || c == '_');
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let signed = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
                if signed {
                    self.bump();
                }
                self.eat_while(|c| c.is_ascii_digit() || c == '_');
            }
        }
        if self.peek() == Some('n') {
            self.bump();
        }
    }

    fn string(&mut self, quote: char) {
        self.bump();
        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    self.bump();
                    self.bump();
                }
                '\n' => return,
                c if c == quote => {
                    self.bump();
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// Scan template text up to and including `${` or the closing backtick.
    fn template_chunk(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    self.bump();
                    self.bump();
                }
                '`' => {
                    self.bump();
                    return;
                }
                '$' if self.peek_at(1) == Some('{') => {
                    self.bump();
                    self.bump();
                    self.stack.push(Context::Substitution);
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    fn regex_allowed(&self) -> bool {
        let Some(prev) = self.tokens.iter().rev().find(|t| !t.kind.is_trivia()) else {
            return true;
        };
        let text = prev.text(self.src);
        match prev.kind {
            TokenKind::Punctuator => !matches!(text, ")" | "]" | "}" | "++" | "--"),
            TokenKind::Keyword => !matches!(text, "this" | "super" | "null" | "true" | "false"),
            TokenKind::Template => text.ends_with("${"),
            _ => false,
        }
    }

    fn regex(&mut self) {
        self.bump();
        let mut in_class = false;
        while let Some(c) = self.peek() {
            match c {
                '\\' => {
                    self.bump();
                    self.bump();
                }
                '\n' => return,
                '[' => {
                    in_class = true;
                    self.bump();
                }
                ']' => {
                    in_class = false;
                    self.bump();
                }
                '/' if !in_class => {
                    self.bump();
                    break;
                }
                _ => {
                    self.bump();
                }
            }
        }
        self.eat_while(is_id_continue);
    }

    /// `<` opens an element where an expression may start and a tag name or
    /// fragment `>` follows. `<T,>` and `<T extends U>` are type parameters.
    fn jsx_element_starts(&self) -> bool {
        if !self.regex_allowed() {
            return false;
        }
        let after = &self.rest()[1..];
        let Some(first) = after.chars().next() else {
            return false;
        };
        if first == '>' {
            return true;
        }
        if !is_id_start(first) {
            return false;
        }
        let name_end = after
            .find(|c: char| !is_id_continue(c) && c != '-' && c != '.' && c != ':')
            .unwrap_or(after.len());
        let tail = after[name_end..].trim_start();
        !(tail.starts_with(',') || tail.starts_with("extends "))
    }

    fn jsx_tag_kind(&mut self, c: char) -> TokenKind {
        if c.is_whitespace() {
            self.eat_while(char::is_whitespace);
            return TokenKind::Whitespace;
        }
        if c == '/' && self.peek_at(1) == Some('*') {
            self.bump();
            self.bump();
            while self.peek().is_some() && !self.rest().starts_with("*/") {
                self.bump();
            }
            self.bump();
            self.bump();
            return TokenKind::Comment;
        }
        if is_id_start(c) {
            self.eat_while(|c| is_id_continue(c) || c == '-');
            return TokenKind::JsxIdentifier;
        }
        match c {
            '"' | '\'' => {
                // Attribute strings have no escapes and may span lines
                self.bump();
                self.eat_while(|n| n != c);
                self.bump();
                TokenKind::String
            }
            '{' => {
                self.bump();
                self.stack.push(Context::JsxExpression);
                TokenKind::Punctuator
            }
            '/' if self.peek_at(1) == Some('>') => {
                self.bump();
                self.bump();
                self.stack.pop();
                TokenKind::Punctuator
            }
            '>' => {
                self.bump();
                if let Some(Context::JsxTag { closing: false }) = self.stack.pop() {
                    self.stack.push(Context::JsxChildren);
                }
                TokenKind::Punctuator
            }
            _ => {
                self.bump();
                TokenKind::Punctuator
            }
        }
    }

    fn jsx_children_kind(&mut self, c: char) -> TokenKind {
        match c {
            '<' => {
                self.bump();
                let closing = self.rest().trim_start().starts_with('/');
                if closing {
                    // The closing tag ends this element's children
                    self.stack.pop();
                }
                self.stack.push(Context::JsxTag { closing });
                TokenKind::Punctuator
            }
            '{' => {
                self.bump();
                self.stack.push(Context::JsxExpression);
                TokenKind::Punctuator
            }
            _ => {
                let start = self.pos;
                self.eat_while(|c| c != '<' && c != '{');
                if self.src[start..self.pos].chars().all(char::is_whitespace) {
                    TokenKind::Whitespace
                } else {
                    TokenKind::JsxText
                }
            }
        }
    }

    fn punctuator(&mut self, c: char) {
        let rest = self.rest();
        let optional_chain_digit = rest.starts_with("?.")
            && rest[2..].chars().next().is_some_and(|c| c.is_ascii_digit());
        let op = PUNCTUATORS
            .iter()
            .find(|op| rest.starts_with(**op) && !(optional_chain_digit && **op == "?."));
        match op {
            Some(op) => {
                for _ in 0..op.len() {
                    self.bump();
                }
            }
            None => {
                match c {
                    '{' => self.stack.push(Context::Brace),
                    '}' if self.stack.last() == Some(&Context::Brace) => {
                        self.stack.pop();
                    }
                    _ => {}
                }
                self.bump();
            }
        }
    }
}

fn is_id_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_id_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || c == '\u{200c}' || c == '\u{200d}'
}

/// Promote contextual words (`from`, `as`, `type`, ...) to keywords when they
/// are used as keywords rather than as names.
fn classify_contextual(tokens: &mut [Token], source: &str, dialect: Dialect) {
    let significant: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.kind.is_trivia())
        .map(|(i, _)| i)
        .collect();

    for (n, &i) in significant.iter().enumerate() {
        if tokens[i].kind != TokenKind::Identifier {
            continue;
        }
        let word = tokens[i].text(source);
        let contextual = CONTEXTUAL.contains(&word)
            || (dialect.is_typed() && TYPED_CONTEXTUAL.contains(&word));
        if !contextual {
            continue;
        }
        let prev = n.checked_sub(1).map(|p| &tokens[significant[p]]);
        let next = significant.get(n + 1).map(|&j| &tokens[j]);
        if is_keyword_position(prev, next, source) {
            tokens[i].kind = TokenKind::Keyword;
        }
    }
}

/// A contextual word acts as a keyword when it is not a member name and is
/// followed by something that can only continue a declaration or clause.
fn is_keyword_position(prev: Option<&Token>, next: Option<&Token>, source: &str) -> bool {
    if prev.is_some_and(|p| matches!(p.text(source), "." | "?.")) {
        return false;
    }
    let Some(next) = next else {
        return false;
    };
    match next.kind {
        TokenKind::Identifier | TokenKind::Keyword | TokenKind::String => true,
        TokenKind::Punctuator => matches!(next.text(source), "{" | "*" | "["),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str, dialect: Dialect) -> Vec<(TokenKind, String)> {
        tokenize(source, dialect)
            .into_iter()
            .filter(|t| t.kind != TokenKind::Whitespace)
            .map(|t| (t.kind, t.text(source).to_string()))
            .collect()
    }

    fn identifiers(source: &str, dialect: Dialect) -> Vec<String> {
        kinds(source, dialect)
            .into_iter()
            .filter(|(k, _)| *k == TokenKind::Identifier)
            .map(|(_, t)| t)
            .collect()
    }

    #[test]
    fn test_lossless() {
        let sources = [
            "const foo = 1;",
            "let s = `a ${b + `c ${d}`} e`;\n// trailing",
            "const re = /[/]+/g.test(x) / 2;",
            "const t = \"unterminated\nnext()",
            "/* never closed",
            "x?.5:1; a ?. b; 0x1F + 1_000n + .5e-3",
            "const ñandú = 'ü'; // 日本",
            "const el = <a href=\"x\n y\">{/* c */}don't</a>;",
            "const broken = <div>never closed",
        ];
        for source in sources {
            let tokens = tokenize(source, Dialect::Tsx);
            let rebuilt: String = tokens.iter().map(|t| t.text(source)).collect();
            assert_eq!(rebuilt, source);
            for pair in tokens.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }
        }
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("const foo = 1;", Dialect::Tsx),
            vec![
                (TokenKind::Keyword, "const".to_string()),
                (TokenKind::Identifier, "foo".to_string()),
                (TokenKind::Punctuator, "=".to_string()),
                (TokenKind::Number, "1".to_string()),
                (TokenKind::Punctuator, ";".to_string()),
            ]
        );
    }

    #[test]
    fn test_contextual_keywords() {
        assert_eq!(
            identifiers("import x from 'y'; const from = map.get(as);", Dialect::Js),
            vec!["x", "from", "map", "get", "as"]
        );
        assert_eq!(
            identifiers("for (const a of list) {}", Dialect::Js),
            vec!["a", "list"]
        );
    }

    #[test]
    fn test_typed_contextual_keywords() {
        let source = "type Foo = keyof Bar; node.type = x as Baz;";
        assert_eq!(
            identifiers(source, Dialect::Ts),
            vec!["Foo", "Bar", "node", "type", "x", "Baz"]
        );
        // Untyped dialects leave `type` and `keyof` alone
        assert_eq!(
            identifiers(source, Dialect::Js),
            vec!["type", "Foo", "keyof", "Bar", "node", "type", "x", "Baz"]
        );
    }

    #[test]
    fn test_template_substitutions_are_lexed() {
        let source = "`a ${foo} b ${`c ${bar}`}`";
        let tokens = kinds(source, Dialect::Tsx);
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Template, "`a ${".to_string()),
                (TokenKind::Identifier, "foo".to_string()),
                (TokenKind::Template, "} b ${".to_string()),
                (TokenKind::Template, "`c ${".to_string()),
                (TokenKind::Identifier, "bar".to_string()),
                (TokenKind::Template, "}`".to_string()),
                (TokenKind::Template, "}`".to_string()),
            ]
        );
    }

    #[test]
    fn test_regex_versus_division() {
        let tokens = kinds("a = b / c / d; r = /ab+c/gi;", Dialect::Js);
        let regexes: Vec<_> = tokens
            .iter()
            .filter(|(k, _)| *k == TokenKind::Regex)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(regexes, vec!["/ab+c/gi"]);
    }

    #[test]
    fn test_jsx_element() {
        assert_eq!(
            kinds("const el = <div>hello</div>;", Dialect::Tsx),
            vec![
                (TokenKind::Keyword, "const".to_string()),
                (TokenKind::Identifier, "el".to_string()),
                (TokenKind::Punctuator, "=".to_string()),
                (TokenKind::Punctuator, "<".to_string()),
                (TokenKind::JsxIdentifier, "div".to_string()),
                (TokenKind::Punctuator, ">".to_string()),
                (TokenKind::JsxText, "hello".to_string()),
                (TokenKind::Punctuator, "<".to_string()),
                (TokenKind::Punctuator, "/".to_string()),
                (TokenKind::JsxIdentifier, "div".to_string()),
                (TokenKind::Punctuator, ">".to_string()),
                (TokenKind::Punctuator, ";".to_string()),
            ]
        );
    }

    #[test]
    fn test_jsx_text_is_not_code() {
        let tokens = kinds("<p>don't stop</p>", Dialect::Jsx);
        assert!(tokens.contains(&(TokenKind::JsxText, "don't stop".to_string())));
        assert!(tokens.iter().all(|(k, _)| *k != TokenKind::String));
    }

    #[test]
    fn test_jsx_nesting() {
        let source = r#"const a = <A b="x" c={d > 1 ? <B/> : null}>{e}<>text</></A>; f(g)"#;
        assert_eq!(identifiers(source, Dialect::Jsx), vec!["a", "d", "e", "f", "g"]);
        let tokens = kinds(source, Dialect::Jsx);
        assert!(tokens.contains(&(TokenKind::JsxIdentifier, "B".to_string())));
        assert!(tokens.contains(&(TokenKind::JsxText, "text".to_string())));
    }

    #[test]
    fn test_angle_brackets_without_jsx() {
        assert_eq!(identifiers("a = <T>b;", Dialect::Ts), vec!["a", "T", "b"]);
        assert_eq!(
            identifiers("const id = <T,>(x: T) => x;", Dialect::Tsx),
            vec!["id", "T", "x", "T", "x"]
        );
        assert_eq!(identifiers("if (a < b) c()", Dialect::Tsx), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_locations() {
        let source = "a\n  bc";
        let tokens = tokenize(source, Dialect::Js);
        let bc = tokens.iter().find(|t| t.text(source) == "bc").unwrap();
        assert_eq!(bc.loc_start, Loc { line: 2, column: 2 });
        assert_eq!(bc.loc_end, Loc { line: 2, column: 4 });
    }

    #[test]
    fn test_dialect_names() {
        assert_eq!(Dialect::from_name("babel"), Some(Dialect::Jsx));
        assert_eq!(Dialect::from_name("typescript"), Some(Dialect::Ts));
        assert_eq!(Dialect::from_name("cobol"), None);
        assert_eq!(Dialect::default().name(), "tsx");
    }
}
