//! Native half of the transform toolkit handed to codemods as `api.j`.
//!
//! The JavaScript half (collections, node paths, printing) lives in
//! `prelude.js`; it asks the host for tokens through [`tokens_json`].

use serde::Serialize;
use serde_json::json;

use crate::lexer::{Dialect, Loc, Token, TokenKind, tokenize};

/// Node type name exposed to scripts for a token kind.
pub fn node_type(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Whitespace => "Whitespace",
        TokenKind::Comment => "Comment",
        TokenKind::Identifier => "Identifier",
        TokenKind::Keyword => "Keyword",
        TokenKind::Number => "NumericLiteral",
        TokenKind::String => "StringLiteral",
        TokenKind::Template => "TemplateElement",
        TokenKind::Regex => "RegExpLiteral",
        TokenKind::Punctuator => "Punctuator",
        TokenKind::JsxIdentifier => "JSXIdentifier",
        TokenKind::JsxText => "JSXText",
    }
}

#[derive(Serialize)]
struct SourceLocation {
    start: Loc,
    end: Loc,
}

#[derive(Serialize)]
struct TokenRecord<'a> {
    #[serde(rename = "type")]
    node_type: &'static str,
    text: &'a str,
    loc: SourceLocation,
}

impl<'a> TokenRecord<'a> {
    fn new(token: &Token, source: &'a str) -> Self {
        Self {
            node_type: node_type(token.kind),
            text: token.text(source),
            loc: SourceLocation {
                start: token.loc_start,
                end: token.loc_end,
            },
        }
    }
}

/// Tokenize `source` with the named dialect and return `{"tokens": [...]}`, or
/// `{"error": "..."}` when the dialect is unknown.
pub fn tokens_json(source: &str, parser: &str) -> String {
    let Some(dialect) = Dialect::from_name(parser) else {
        return json!({
            "error": format!("Unknown parser '{parser}', expected one of js, jsx, ts, tsx, babel, flow")
        })
        .to_string();
    };
    let tokens = tokenize(source, dialect);
    let records: Vec<TokenRecord> = tokens.iter().map(|t| TokenRecord::new(t, source)).collect();
    json!({ "tokens": records }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_json_shape() {
        let value: serde_json::Value = serde_json::from_str(&tokens_json("foo(1)", "tsx")).unwrap();
        let tokens = value["tokens"].as_array().unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0]["type"], "Identifier");
        assert_eq!(tokens[0]["text"], "foo");
        assert_eq!(tokens[0]["loc"]["start"]["line"], 1);
        assert_eq!(tokens[0]["loc"]["end"]["column"], 3);
        assert_eq!(tokens[2]["type"], "NumericLiteral");
    }

    #[test]
    fn test_jsx_node_types() {
        let value: serde_json::Value =
            serde_json::from_str(&tokens_json("<p>don't stop</p>", "tsx")).unwrap();
        let types: Vec<(&str, &str)> = value["tokens"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| (t["type"].as_str().unwrap(), t["text"].as_str().unwrap()))
            .collect();
        assert_eq!(types[1], ("JSXIdentifier", "p"));
        assert_eq!(types[3], ("JSXText", "don't stop"));
        assert!(!types.iter().any(|(t, _)| *t == "Identifier"));
    }

    #[test]
    fn test_unknown_parser() {
        let value: serde_json::Value = serde_json::from_str(&tokens_json("x", "cobol")).unwrap();
        assert!(value["error"].as_str().unwrap().contains("cobol"));
    }
}
