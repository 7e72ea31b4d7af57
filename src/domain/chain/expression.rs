//! Sandboxed expression language for custom step conditions
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := equality ( "&&" equality )*
//! equality:= compare ( ("==" | "!=") compare )*
//! compare := additive ( ("<" | "<=" | ">" | ">=") additive )*
//! additive:= term ( ("+" | "-") term )*
//! term    := unary ( ("*" | "/" | "%") unary )*
//! unary   := ("!" | "-") unary | primary
//! primary := number | string | true | false | null | "(" or ")" | variable
//! variable:= "$" ( name | "[" string "]" ) ( "." name | "[" (integer | string) "]" )*
//! ```
//!
//! Variables resolve against execution variables first, then step results keyed by
//! step id. Names are letters, digits and `_`, so `$a-$b` is a subtraction; ids with
//! other characters are written `$['charge-card']`. There are no calls, assignments
//! or host lookups.

use std::collections::HashMap;

use serde_json::{Number, Value};
use thiserror::Error;

/// Maximum accepted expression length in characters
pub const MAX_EXPRESSION_LENGTH: usize = 4096;

/// Maximum nesting depth of the parsed expression
pub const MAX_EXPRESSION_DEPTH: usize = 64;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Expression exceeds {0} characters")]
    TooLong(usize),

    #[error("Expression nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("Unknown variable '${0}'")]
    UnknownVariable(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Division by zero")]
    DivisionByZero,
}

impl ExpressionError {
    fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }
}

/// Values an expression can read
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub variables: &'a HashMap<String, Value>,
    pub results: &'a HashMap<String, Value>,
}

impl<'a> Scope<'a> {
    pub fn new(variables: &'a HashMap<String, Value>, results: &'a HashMap<String, Value>) -> Self {
        Self { variables, results }
    }

    fn lookup(&self, name: &str) -> Option<&'a Value> {
        self.variables.get(name).or_else(|| self.results.get(name))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Dollar,
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Not,
    Minus,
    Plus,
    Star,
    Slash,
    Percent,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let next = chars.get(i + 1).copied();
        let token = match c {
            '0'..='9' => {
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ExpressionError::syntax(start, format!("invalid number '{}'", text)))?;
                tokens.push((start, Token::Number(value)));
                continue;
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(ExpressionError::syntax(start, "unterminated string")),
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            let escaped = chars
                                .get(i + 1)
                                .ok_or_else(|| ExpressionError::syntax(i, "dangling escape"))?;
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                            i += 2;
                        }
                        Some(&ch) => {
                            value.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push((start, Token::Str(value)));
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push((start, Token::Ident(chars[start..i].iter().collect())));
                continue;
            }
            '$' => Token::Dollar,
            '.' => Token::Dot,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            '%' => Token::Percent,
            '!' if next == Some('=') => {
                i += 1;
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                }
                Token::Ne
            }
            '!' => Token::Not,
            '=' if next == Some('=') => {
                i += 1;
                if chars.get(i + 1) == Some(&'=') {
                    i += 1;
                }
                Token::Eq
            }
            '<' if next == Some('=') => {
                i += 1;
                Token::Le
            }
            '<' => Token::Lt,
            '>' if next == Some('=') => {
                i += 1;
                Token::Ge
            }
            '>' => Token::Gt,
            '&' if next == Some('&') => {
                i += 1;
                Token::And
            }
            '|' if next == Some('|') => {
                i += 1;
                Token::Or
            }
            other => {
                return Err(ExpressionError::syntax(
                    start,
                    format!("unexpected character '{}'", other),
                ));
            }
        };

        tokens.push((start, token));
        i += 1;
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum PathSegment {
    Field(String),
    Index(usize),
}

/// Parsed expression tree
#[derive(Debug, Clone, PartialEq)]
pub struct Expression(Node);

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(Value),
    Variable { name: String, path: Vec<PathSegment> },
    Not(Box<Node>),
    Negate(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ExpressionError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(ExpressionError::syntax(self.position(), format!("expected {}", what)))
        }
    }

    fn enter(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_EXPRESSION_DEPTH {
            return Err(ExpressionError::TooDeep(MAX_EXPRESSION_DEPTH));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn binary_level(
        &mut self,
        ops: &[(Token, BinaryOp)],
        next: fn(&mut Self) -> Result<Node, ExpressionError>,
    ) -> Result<Node, ExpressionError> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    let right = next(self)?;
                    left = Node::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn or(&mut self) -> Result<Node, ExpressionError> {
        self.binary_level(&[(Token::Or, BinaryOp::Or)], Self::and)
    }

    fn and(&mut self) -> Result<Node, ExpressionError> {
        self.binary_level(&[(Token::And, BinaryOp::And)], Self::equality)
    }

    fn equality(&mut self) -> Result<Node, ExpressionError> {
        self.binary_level(
            &[(Token::Eq, BinaryOp::Eq), (Token::Ne, BinaryOp::Ne)],
            Self::compare,
        )
    }

    fn compare(&mut self) -> Result<Node, ExpressionError> {
        self.binary_level(
            &[
                (Token::Le, BinaryOp::Le),
                (Token::Lt, BinaryOp::Lt),
                (Token::Ge, BinaryOp::Ge),
                (Token::Gt, BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Node, ExpressionError> {
        self.binary_level(
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
            Self::term,
        )
    }

    fn term(&mut self) -> Result<Node, ExpressionError> {
        self.binary_level(
            &[
                (Token::Star, BinaryOp::Mul),
                (Token::Slash, BinaryOp::Div),
                (Token::Percent, BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Node, ExpressionError> {
        self.enter()?;
        let node = if self.eat(&Token::Not) {
            Node::Not(Box::new(self.unary()?))
        } else if self.eat(&Token::Minus) {
            Node::Negate(Box::new(self.unary()?))
        } else {
            self.primary()?
        };
        self.leave();
        Ok(node)
    }

    fn primary(&mut self) -> Result<Node, ExpressionError> {
        let position = self.position();
        match self.next() {
            Some(Token::Number(n)) => Ok(Node::Literal(number(n)?)),
            Some(Token::Str(s)) => Ok(Node::Literal(Value::String(s))),
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(Node::Literal(Value::Bool(true))),
                "false" => Ok(Node::Literal(Value::Bool(false))),
                "null" => Ok(Node::Literal(Value::Null)),
                other => Err(ExpressionError::syntax(
                    position,
                    format!("unknown identifier '{}'; variables are written as ${}", other, other),
                )),
            },
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.or()?;
                self.expect(Token::RParen, "')'")?;
                self.leave();
                Ok(inner)
            }
            Some(Token::Dollar) => self.variable(),
            Some(other) => Err(ExpressionError::syntax(
                position,
                format!("unexpected token {:?}", other),
            )),
            None => Err(ExpressionError::syntax(position, "unexpected end of expression")),
        }
    }

    fn variable(&mut self) -> Result<Node, ExpressionError> {
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            Some(Token::LBracket) => {
                let position = self.position();
                let Some(Token::Str(name)) = self.next() else {
                    return Err(ExpressionError::syntax(position, "expected quoted variable name"));
                };
                self.expect(Token::RBracket, "']'")?;
                name
            }
            _ => {
                return Err(ExpressionError::syntax(
                    self.position(),
                    "expected variable name after '$'",
                ));
            }
        };

        let mut path = Vec::new();
        loop {
            if self.eat(&Token::Dot) {
                match self.next() {
                    Some(Token::Ident(field)) => path.push(PathSegment::Field(field)),
                    _ => return Err(ExpressionError::syntax(self.position(), "expected field name")),
                }
            } else if self.eat(&Token::LBracket) {
                let position = self.position();
                match self.next() {
                    Some(Token::Number(n)) if n >= 0.0 && n.fract() == 0.0 => {
                        path.push(PathSegment::Index(n as usize))
                    }
                    Some(Token::Str(field)) => path.push(PathSegment::Field(field)),
                    _ => {
                        return Err(ExpressionError::syntax(
                            position,
                            "expected integer index or quoted field",
                        ));
                    }
                }
                self.expect(Token::RBracket, "']'")?;
            } else {
                break;
            }
        }

        Ok(Node::Variable { name, path })
    }
}

fn number(n: f64) -> Result<Value, ExpressionError> {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return Ok(Value::Number(Number::from(n as i64)));
    }
    Number::from_f64(n)
        .map(Value::Number)
        .ok_or_else(|| ExpressionError::Type(format!("{} is not a finite number", n)))
}

impl Expression {
    /// Parse an expression without evaluating it
    pub fn parse(input: &str) -> Result<Self, ExpressionError> {
        if input.chars().count() > MAX_EXPRESSION_LENGTH {
            return Err(ExpressionError::TooLong(MAX_EXPRESSION_LENGTH));
        }

        let tokens = tokenize(input)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
            end: input.len(),
        };

        let root = parser.or()?;
        if parser.pos < parser.tokens.len() {
            return Err(ExpressionError::syntax(parser.position(), "unexpected trailing input"));
        }

        Ok(Self(root))
    }

    pub fn evaluate(&self, scope: &Scope<'_>) -> Result<Value, ExpressionError> {
        eval(&self.0, scope)
    }
}

/// Parse and evaluate `input`, converting the result with truthiness rules
pub fn evaluate_bool(input: &str, scope: &Scope<'_>) -> Result<bool, ExpressionError> {
    let value = Expression::parse(input)?.evaluate(scope)?;
    Ok(truthy(&value))
}

/// JavaScript-style truthiness
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn eval(node: &Node, scope: &Scope<'_>) -> Result<Value, ExpressionError> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Variable { name, path } => {
            let mut current = scope
                .lookup(name)
                .ok_or_else(|| ExpressionError::UnknownVariable(name.clone()))?;
            for segment in path {
                let next = match (segment, current) {
                    (PathSegment::Field(field), Value::Object(map)) => map.get(field),
                    (PathSegment::Index(index), Value::Array(items)) => items.get(*index),
                    _ => None,
                };
                match next {
                    Some(value) => current = value,
                    None => return Ok(Value::Null),
                }
            }
            Ok(current.clone())
        }
        Node::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, scope)?))),
        Node::Negate(inner) => {
            let value = eval(inner, scope)?;
            number(-as_number(&value, "-")?)
        }
        Node::Binary(BinaryOp::And, left, right) => {
            let left = eval(left, scope)?;
            if !truthy(&left) {
                return Ok(left);
            }
            eval(right, scope)
        }
        Node::Binary(BinaryOp::Or, left, right) => {
            let left = eval(left, scope)?;
            if truthy(&left) {
                return Ok(left);
            }
            eval(right, scope)
        }
        Node::Binary(op, left, right) => {
            let left = eval(left, scope)?;
            let right = eval(right, scope)?;
            binary(*op, &left, &right)
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ExpressionError> {
    match op {
        BinaryOp::Add => match (left, right) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(format!("{}{}", display(left), display(right))))
            }
            _ => number(as_number(left, "+")? + as_number(right, "+")?),
        },
        BinaryOp::Sub => number(as_number(left, "-")? - as_number(right, "-")?),
        BinaryOp::Mul => number(as_number(left, "*")? * as_number(right, "*")?),
        BinaryOp::Div => {
            let divisor = as_number(right, "/")?;
            if divisor == 0.0 {
                return Err(ExpressionError::DivisionByZero);
            }
            number(as_number(left, "/")? / divisor)
        }
        BinaryOp::Rem => {
            let divisor = as_number(right, "%")?;
            if divisor == 0.0 {
                return Err(ExpressionError::DivisionByZero);
            }
            number(as_number(left, "%")? % divisor)
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => a
                    .as_f64()
                    .zip(b.as_f64())
                    .and_then(|(a, b)| a.partial_cmp(&b)),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            }
            .ok_or_else(|| {
                ExpressionError::Type(format!("cannot compare {} with {}", kind(left), kind(right)))
            })?;

            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        BinaryOp::Eq => Ok(Value::Bool(equals(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!equals(left, right))),
        BinaryOp::And | BinaryOp::Or => unreachable!("short-circuit operators are evaluated in eval"),
    }
}

fn equals(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn as_number(value: &Value, op: &str) -> Result<f64, ExpressionError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ExpressionError::Type(format!("'{}' needs a finite number", op))),
        other => Err(ExpressionError::Type(format!(
            "'{}' needs numbers, got {}",
            op,
            kind(other)
        ))),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
