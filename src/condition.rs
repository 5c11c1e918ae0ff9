//! # Condition Evaluation
//!
//! Dependencies in a `DEPS` file may carry a `condition` such as
//! `checkout_linux and not checkout_arm64` or `host_os == "mac"`. The
//! resolver treats evaluation as a pure black box behind the
//! [`ConditionEvaluator`] trait; [`GclientConditions`] is the default
//! implementation and follows the upstream gclient rules:
//!
//! - Operators, loosest first: `or`, `and`, `not`, then a single comparison
//!   (`==`, `!=`, `in`). Chained comparisons are rejected.
//! - `True`, `False` and `None` are literals.
//! - A name bound to a boolean evaluates to it. A name bound to a string is
//!   itself evaluated as a condition, so `host_os` bound to `"linux"`
//!   evaluates the expression `linux`. An unbound name evaluates to its own
//!   spelling, which is what makes `host_os == linux` work.
//! - Operands of `and`, `or` and `not` must be booleans.
//! - The final value uses Python truthiness.

use std::collections::BTreeSet;

use crate::context::{VarValue, VariableContext};
use crate::error::{Error, Result};

/// Evaluates manifest conditions against a variable context.
pub trait ConditionEvaluator: Send + Sync {
    /// Evaluates `expr` and returns its truth value.
    fn evaluate(&self, expr: &str, context: &VariableContext) -> Result<bool>;

    /// Checks that `expr` is syntactically well formed, without a context.
    fn validate(&self, expr: &str) -> Result<()> {
        let _ = expr;
        Ok(())
    }
}

/// The gclient condition language.
#[derive(Debug, Default, Clone, Copy)]
pub struct GclientConditions;

impl ConditionEvaluator for GclientConditions {
    fn evaluate(&self, expr: &str, context: &VariableContext) -> Result<bool> {
        let ast = parse(expr)?;
        let value = eval(&ast, expr, context, &BTreeSet::new())?;
        Ok(value.truthy())
    }

    fn validate(&self, expr: &str) -> Result<()> {
        parse(expr).map(|_| ())
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    In,
}

/// Parsed condition expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Name(String),
    Str(String),
    Bool(bool),
    None,
    Tuple(Vec<Expr>),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Str(String),
    LParen,
    RParen,
    Comma,
    EqEq,
    NotEq,
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' | '!' => {
                chars.next();
                if chars.next() != Some('=') {
                    return Err(Error::invalid_condition(
                        expr,
                        format!("expected '=' after '{}'", c),
                    ));
                }
                tokens.push(if c == '=' { Token::EqEq } else { Token::NotEq });
            }
            '\'' | '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    match ch {
                        '\\' => match chars.next() {
                            Some(escaped) => value.push(escaped),
                            None => break,
                        },
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => value.push(ch),
                    }
                }
                if !closed {
                    return Err(Error::invalid_condition(expr, "unterminated string"));
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Name(name));
            }
            other => {
                return Err(Error::invalid_condition(
                    expr,
                    format!("unexpected character '{}'", other),
                ));
            }
        }
    }

    Ok(tokens)
}

const KEYWORDS: &[&str] = &["and", "or", "not", "in"];

/// Deepest `not`/parenthesis nesting a condition may use
const MAX_NESTING: usize = 128;

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == keyword)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::invalid_condition(self.source, message)
    }

    /// Runs `parse` one nesting level deeper.
    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> Result<Expr>) -> Result<Expr> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(format!("nested deeper than {} levels", MAX_NESTING)));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut operands = vec![self.parse_and()?];
        while self.peek_keyword("or") {
            self.next();
            operands.push(self.parse_and()?);
        }
        Ok(if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expr::Or(operands)
        })
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut operands = vec![self.parse_not()?];
        while self.peek_keyword("and") {
            self.next();
            operands.push(self.parse_not()?);
        }
        Ok(if operands.len() == 1 {
            operands.remove(0)
        } else {
            Expr::And(operands)
        })
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.peek_keyword("not") {
            self.next();
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_compare()
    }

    fn compare_op(&self) -> Option<CompareOp> {
        match self.peek() {
            Some(Token::EqEq) => Some(CompareOp::Eq),
            Some(Token::NotEq) => Some(CompareOp::NotEq),
            Some(Token::Name(n)) if n == "in" => Some(CompareOp::In),
            _ => None,
        }
    }

    fn parse_compare(&mut self) -> Result<Expr> {
        let left = self.parse_atom(false)?;
        let Some(op) = self.compare_op() else {
            return Ok(left);
        };
        self.next();
        let right = self.parse_atom(op == CompareOp::In)?;
        if self.compare_op().is_some() {
            return Err(self.error("exactly one comparison operator is allowed"));
        }
        Ok(Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_atom(&mut self, allow_tuple: bool) -> Result<Expr> {
        match self.next() {
            Some(Token::Name(name)) => match name.as_str() {
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                "None" => Ok(Expr::None),
                kw if KEYWORDS.contains(&kw) => {
                    Err(self.error(format!("unexpected keyword '{}'", kw)))
                }
                _ => Ok(Expr::Name(name)),
            },
            Some(Token::Str(value)) => Ok(Expr::Str(value)),
            Some(Token::LParen) => self.nested(|p| p.parse_parenthesized(allow_tuple)),
            Some(token) => Err(self.error(format!("unexpected token {:?}", token))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_parenthesized(&mut self, allow_tuple: bool) -> Result<Expr> {
        let mut items = Vec::new();
        let mut saw_comma = false;
        loop {
            if self.peek() == Some(&Token::RParen) {
                self.next();
                break;
            }
            items.push(self.parse_or()?);
            match self.next() {
                Some(Token::Comma) => saw_comma = true,
                Some(Token::RParen) => break,
                Some(token) => {
                    return Err(self.error(format!("expected ',' or ')', found {:?}", token)))
                }
                None => return Err(self.error("unclosed parenthesis")),
            }
        }

        if items.len() == 1 && !saw_comma {
            return Ok(items.remove(0));
        }
        if !allow_tuple {
            return Err(self.error("tuples are only allowed on the right of 'in'"));
        }
        Ok(Expr::Tuple(items))
    }
}

/// Parses a condition into an expression tree.
pub fn parse(expr: &str) -> Result<Expr> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err(Error::invalid_condition(expr, "empty condition"));
    }
    let mut parser = Parser {
        source: expr,
        tokens,
        pos: 0,
        depth: 0,
    };
    let ast = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(parser.error(format!("unexpected trailing token {:?}", token)));
    }
    Ok(ast)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Evaluated {
    Bool(bool),
    Str(String),
    None,
    Tuple(Vec<Evaluated>),
}

impl Evaluated {
    fn truthy(&self) -> bool {
        match self {
            Evaluated::Bool(b) => *b,
            Evaluated::Str(s) => !s.is_empty(),
            Evaluated::None => false,
            Evaluated::Tuple(items) => !items.is_empty(),
        }
    }
}

fn expect_bool(value: Evaluated, operator: &str, source: &str) -> Result<bool> {
    match value {
        Evaluated::Bool(b) => Ok(b),
        other => Err(Error::invalid_condition(
            source,
            format!("invalid \"{}\" operand {:?}", operator, other),
        )),
    }
}

fn eval(
    expr: &Expr,
    source: &str,
    context: &VariableContext,
    referenced: &BTreeSet<String>,
) -> Result<Evaluated> {
    match expr {
        Expr::Bool(b) => Ok(Evaluated::Bool(*b)),
        Expr::None => Ok(Evaluated::None),
        Expr::Str(s) => Ok(Evaluated::Str(s.clone())),
        Expr::Tuple(items) => items
            .iter()
            .map(|item| eval(item, source, context, referenced))
            .collect::<Result<Vec<_>>>()
            .map(Evaluated::Tuple),
        Expr::Name(name) => {
            if referenced.contains(name) {
                return Err(Error::invalid_condition(
                    source,
                    format!("cyclic reference to '{}'", name),
                ));
            }
            match context.get(name) {
                Some(VarValue::Bool(b)) => Ok(Evaluated::Bool(*b)),
                Some(VarValue::Str(inner)) => {
                    let mut nested = referenced.clone();
                    nested.insert(name.clone());
                    let ast = parse(inner)?;
                    eval(&ast, inner, context, &nested)
                }
                None => Ok(Evaluated::Str(name.clone())),
            }
        }
        Expr::Not(inner) => {
            let value = eval(inner, source, context, referenced)?;
            Ok(Evaluated::Bool(!expect_bool(value, "not", source)?))
        }
        Expr::And(operands) => {
            let mut result = true;
            for operand in operands {
                let value = eval(operand, source, context, referenced)?;
                result &= expect_bool(value, "and", source)?;
            }
            Ok(Evaluated::Bool(result))
        }
        Expr::Or(operands) => {
            let mut result = false;
            for operand in operands {
                let value = eval(operand, source, context, referenced)?;
                result |= expect_bool(value, "or", source)?;
            }
            Ok(Evaluated::Bool(result))
        }
        Expr::Compare { op, left, right } => {
            let left = eval(left, source, context, referenced)?;
            let right = eval(right, source, context, referenced)?;
            let result = match op {
                CompareOp::Eq => left == right,
                CompareOp::NotEq => left != right,
                CompareOp::In => match (&left, &right) {
                    (_, Evaluated::Tuple(items)) => items.contains(&left),
                    (Evaluated::Str(needle), Evaluated::Str(haystack)) => {
                        haystack.contains(needle.as_str())
                    }
                    _ => {
                        return Err(Error::invalid_condition(
                            source,
                            format!("cannot test {:?} in {:?}", left, right),
                        ))
                    }
                },
            };
            Ok(Evaluated::Bool(result))
        }
    }
}
