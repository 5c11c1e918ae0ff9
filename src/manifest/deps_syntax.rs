//! Reader for the `DEPS` file syntax
//!
//! A `DEPS` file is a sequence of `name = expression` assignments whose
//! right-hand sides are Python literals: strings, numbers, booleans, `None`,
//! dicts, lists and tuples, plus `+` concatenation and the two helper calls
//! `Var('name')` and `Str('text')`. Nothing else is executed.
//!
//! The reader turns the whole file into a `serde_json` object so the same
//! `serde` extraction code serves both this syntax and YAML/JSON manifests.
//! `Var('name')` is rewritten to the placeholder `{name}`, which the manifest
//! layer substitutes once the variable context is known.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Colon,
    Comma,
    Plus,
    Assign,
}

#[derive(Debug, Clone)]
struct Spanned {
    tok: Tok,
    line: usize,
}

struct Lexer<'a> {
    source_name: &'a str,
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(source_name: &'a str, text: &str) -> Self {
        Self {
            source_name,
            chars: text.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::malformed(
            self.source_name,
            format!("line {}: {}", self.line, message.into()),
        )
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if let Some(c) = c {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
            }
        }
        c
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek_at(0) {
            let line = self.line;
            let tok = match c {
                c if c.is_whitespace() || c == '\\' => {
                    // Backslash line continuations carry no meaning here
                    self.bump();
                    continue;
                }
                '#' => {
                    while let Some(c) = self.peek_at(0) {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                    continue;
                }
                '{' => Tok::LBrace,
                '}' => Tok::RBrace,
                '[' => Tok::LBracket,
                ']' => Tok::RBracket,
                '(' => Tok::LParen,
                ')' => Tok::RParen,
                ':' => Tok::Colon,
                ',' => Tok::Comma,
                '+' => Tok::Plus,
                '=' => Tok::Assign,
                '\'' | '"' => {
                    let value = self.string(c)?;
                    tokens.push(Spanned {
                        tok: Tok::Str(value),
                        line,
                    });
                    continue;
                }
                c if c.is_ascii_digit() => {
                    let mut digits = String::new();
                    while let Some(d) = self.peek_at(0) {
                        if d.is_ascii_digit() {
                            digits.push(d);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    let value = digits
                        .parse::<i64>()
                        .map_err(|e| self.error(format!("invalid integer: {}", e)))?;
                    tokens.push(Spanned {
                        tok: Tok::Int(value),
                        line,
                    });
                    continue;
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let mut ident = String::new();
                    while let Some(d) = self.peek_at(0) {
                        if d.is_ascii_alphanumeric() || d == '_' {
                            ident.push(d);
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    tokens.push(Spanned {
                        tok: Tok::Ident(ident),
                        line,
                    });
                    continue;
                }
                other => return Err(self.error(format!("unexpected character '{}'", other))),
            };
            self.bump();
            tokens.push(Spanned { tok, line });
        }
        Ok(tokens)
    }

    fn string(&mut self, quote: char) -> Result<String> {
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        let opening = if triple { 3 } else { 1 };
        for _ in 0..opening {
            self.bump();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.error("unterminated string"));
            };
            match c {
                '\\' => {
                    let escaped = self
                        .bump()
                        .ok_or_else(|| self.error("unterminated string"))?;
                    match escaped {
                        'n' => value.push('\n'),
                        't' => value.push('\t'),
                        '\n' => {}
                        other => value.push(other),
                    }
                }
                '\n' if !triple => return Err(self.error("newline in string literal")),
                c if c == quote => {
                    if !triple {
                        return Ok(value);
                    }
                    if self.peek_at(0) == Some(quote) && self.peek_at(1) == Some(quote) {
                        self.bump();
                        self.bump();
                        return Ok(value);
                    }
                    value.push(c);
                }
                c => value.push(c),
            }
        }
    }
}

/// Deepest bracket nesting accepted before the document is rejected
const MAX_NESTING: usize = 64;

struct Reader<'a> {
    source_name: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::malformed(
            self.source_name,
            format!("line {}: {}", self.line(), message.into()),
        )
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|t| t.tok.clone());
        self.pos += 1;
        tok
    }

    /// Runs `read` one bracket level deeper.
    fn nested<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("nested deeper than {} levels", MAX_NESTING)));
        }
        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    fn expect(&mut self, expected: Tok) -> Result<()> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(self.error(format!("expected {:?}, found {:?}", expected, tok))),
            None => Err(self.error(format!("expected {:?}, found end of file", expected))),
        }
    }

    fn document(&mut self) -> Result<Map<String, Value>> {
        let mut doc = Map::new();
        while let Some(tok) = self.next() {
            let Tok::Ident(name) = tok else {
                return Err(self.error(format!("expected an assignment, found {:?}", tok)));
            };
            self.expect(Tok::Assign)?;
            let value = self.expression()?;
            if doc.insert(name.clone(), value).is_some() {
                return Err(self.error(format!("'{}' is assigned more than once", name)));
            }
        }
        Ok(doc)
    }

    fn expression(&mut self) -> Result<Value> {
        let mut value = self.term()?;
        while self.peek() == Some(&Tok::Plus) {
            self.next();
            let rhs = self.term()?;
            value = match (value, rhs) {
                (Value::String(mut a), Value::String(b)) => {
                    a.push_str(&b);
                    Value::String(a)
                }
                (Value::Array(mut a), Value::Array(b)) => {
                    a.extend(b);
                    Value::Array(a)
                }
                (a, b) => {
                    return Err(self.error(format!("cannot concatenate {} and {}", a, b)));
                }
            };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<Value> {
        match self.next() {
            Some(Tok::Str(first)) => {
                // Adjacent literals concatenate: 'a' 'b' == 'ab'
                let mut value = first;
                while let Some(Tok::Str(more)) = self.peek() {
                    value.push_str(more);
                    self.next();
                }
                Ok(Value::String(value))
            }
            Some(Tok::Int(n)) => Ok(Value::from(n)),
            Some(Tok::Ident(ident)) => match ident.as_str() {
                "True" => Ok(Value::Bool(true)),
                "False" => Ok(Value::Bool(false)),
                "None" => Ok(Value::Null),
                "Var" => {
                    let name = self.call_argument()?;
                    Ok(Value::String(format!("{{{}}}", name)))
                }
                "Str" => Ok(Value::String(self.call_argument()?)),
                other => Err(self.error(format!("unsupported name '{}'", other))),
            },
            Some(Tok::LBrace) => self.nested(Self::dict),
            Some(Tok::LBracket) => self
                .nested(|r| r.sequence(Tok::RBracket))
                .map(Value::Array),
            Some(Tok::LParen) => {
                let mut items = self.nested(|r| r.sequence(Tok::RParen))?;
                // A parenthesised single expression without a comma is not a tuple,
                // but that distinction is irrelevant once lowered to JSON arrays.
                if items.len() == 1 {
                    Ok(items.remove(0))
                } else {
                    Ok(Value::Array(items))
                }
            }
            Some(tok) => Err(self.error(format!("unexpected {:?}", tok))),
            None => Err(self.error("unexpected end of file")),
        }
    }

    fn call_argument(&mut self) -> Result<String> {
        self.expect(Tok::LParen)?;
        let value = match self.next() {
            Some(Tok::Str(s)) => s,
            Some(tok) => return Err(self.error(format!("expected a string, found {:?}", tok))),
            None => return Err(self.error("unexpected end of file")),
        };
        self.expect(Tok::RParen)?;
        Ok(value)
    }

    fn sequence(&mut self, close: Tok) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(&close) {
                self.next();
                return Ok(items);
            }
            items.push(self.expression()?);
            match self.next() {
                Some(Tok::Comma) => {}
                Some(tok) if tok == close => return Ok(items),
                Some(tok) => return Err(self.error(format!("expected ',' found {:?}", tok))),
                None => return Err(self.error("unclosed bracket")),
            }
        }
    }

    fn dict(&mut self) -> Result<Value> {
        let mut map = Map::new();
        loop {
            if self.peek() == Some(&Tok::RBrace) {
                self.next();
                return Ok(Value::Object(map));
            }
            let key = match self.expression()? {
                Value::String(s) => s,
                other => return Err(self.error(format!("dict keys must be strings, found {}", other))),
            };
            self.expect(Tok::Colon)?;
            let value = self.expression()?;
            if map.contains_key(&key) {
                return Err(self.error(format!("duplicate key '{}'", key)));
            }
            map.insert(key, value);
            match self.next() {
                Some(Tok::Comma) => {}
                Some(Tok::RBrace) => return Ok(Value::Object(map)),
                Some(tok) => return Err(self.error(format!("expected ',' found {:?}", tok))),
                None => return Err(self.error("unclosed dict")),
            }
        }
    }
}

/// Reads a `DEPS` document into a JSON object keyed by assignment name.
pub fn read(source_name: &str, text: &str) -> Result<Map<String, Value>> {
    let tokens = Lexer::new(source_name, text).tokenize()?;
    Reader {
        source_name,
        tokens,
        pos: 0,
        depth: 0,
    }
    .document()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_typical_deps() {
        let text = r#"
# Comment at the top
use_relative_paths = True

vars = {
  'chromium_git': 'https://chromium.googlesource.com',
  'checkout_nacl': False,
  "build_revision": "0123abcd",
}

deps = {
  'src/build':
    Var('chromium_git') + '/chromium/src/build.git' + '@' + Var('build_revision'),
  'src/third_party/foo': {
    'url': '{chromium_git}/foo.git@deadbeef',
    'condition': 'checkout_linux',
  },
  'src/disabled': None,
}
"#;
        let doc = read("DEPS", text).unwrap();
        assert_eq!(doc["use_relative_paths"], json!(true));
        assert_eq!(doc["vars"]["checkout_nacl"], json!(false));
        assert_eq!(
            doc["deps"]["src/build"],
            json!("{chromium_git}/chromium/src/build.git@{build_revision}")
        );
        assert_eq!(doc["deps"]["src/third_party/foo"]["condition"], json!("checkout_linux"));
        assert_eq!(doc["deps"]["src/disabled"], Value::Null);
    }

    #[test]
    fn test_lists_tuples_and_numbers() {
        let doc = read(
            "DEPS",
            "hooks = [{'name': 'x', 'action': ['python3', 'a.py']}]\nrecursedeps = ('src/a', 'src/b')\nsize = 42\n",
        )
        .unwrap();
        assert_eq!(doc["hooks"][0]["action"][1], json!("a.py"));
        assert_eq!(doc["recursedeps"], json!(["src/a", "src/b"]));
        assert_eq!(doc["size"], json!(42));
    }

    #[test]
    fn test_adjacent_and_triple_quoted_strings() {
        let doc = read("DEPS", "a = 'one' \"two\"\nb = '''multi\nline'''\nc = Str('s')\n").unwrap();
        assert_eq!(doc["a"], json!("onetwo"));
        assert_eq!(doc["b"], json!("multi\nline"));
        assert_eq!(doc["c"], json!("s"));
    }

    #[test]
    fn test_errors_report_line_numbers() {
        let err = read("src/DEPS", "vars = {\n  'a': 1,\n  'a': 2,\n}\n").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("src/DEPS"));
        assert!(message.contains("duplicate key 'a'"));
        assert!(message.contains("line 3"));
    }

    #[test]
    fn test_rejects_code() {
        assert!(read("DEPS", "deps = __import__('os')").is_err());
        assert!(read("DEPS", "deps = {'a': 'b'} ; x = 1").is_err());
        assert!(read("DEPS", "deps = {'a' 'b'}").is_err());
        assert!(read("DEPS", "deps = {").is_err());
        assert!(read("DEPS", "x = 'unterminated").is_err());
        assert!(read("DEPS", "x = 1\nx = 2").is_err());
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let deep = format!("x = {}1{}", "[".repeat(100_000), "]".repeat(100_000));
        let err = read("DEPS", &deep).unwrap_err();
        assert!(matches!(err, Error::MalformedManifest { .. }));
        assert!(err.to_string().contains("nested deeper"));

        let ok = format!("x = {}1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(read("DEPS", &ok).unwrap()["x"], json!(1));
    }

    #[test]
    fn test_empty_document() {
        assert!(read("DEPS", "# nothing here\n").unwrap().is_empty());
    }
}
