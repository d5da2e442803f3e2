// Expression grammar shared by variable substitution and arithmetic
//
//   expr   := term (('+' | '-') term)*
//   term   := factor (('*' | '/') factor)*
//   factor := ('+' | '-') factor | NUMBER | PATH | '(' expr ')'
//
// PATH is a dotted variable path such as `this.ref.count`.

use std::collections::HashMap;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Path(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Path(String),
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

/// Evaluation failure; the detail is for logs only
#[derive(Debug, Clone, PartialEq)]
pub struct ExprError(pub String);

impl std::fmt::Display for ExprError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| ExprError(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Path(chars[start..i].iter().collect()));
            }
            other => return Err(ExprError(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExprError("empty expression".to_string()));
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError(format!("unexpected token {:?}", parser.tokens[parser.pos])));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn factor(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Plus) => self.factor(),
            Some(Token::Minus) => Ok(Expr::Negate(Box::new(self.factor()?))),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Path(path)) => Ok(Expr::Path(path)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ExprError("missing closing parenthesis".to_string())),
                }
            }
            Some(token) => Err(ExprError(format!("unexpected token {:?}", token))),
            None => Err(ExprError("unexpected end of expression".to_string())),
        }
    }
}

impl Expr {
    /// Variable paths referenced by this expression, in order of appearance
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Path(path) => {
                if !out.contains(&path.as_str()) {
                    out.push(path);
                }
            }
            Expr::Negate(inner) => inner.collect_paths(out),
            Expr::Binary(_, left, right) => {
                left.collect_paths(out);
                right.collect_paths(out);
            }
        }
    }

    /// Evaluate arithmetic with path values supplied by the caller
    pub fn evaluate(&self, variables: &HashMap<String, Value>) -> Result<f64, ExprError> {
        let result = match self {
            Expr::Number(n) => *n,
            Expr::Path(path) => {
                let value = variables.get(path).unwrap_or(&Value::Null);
                operand(path, value)?
            }
            Expr::Negate(inner) => -inner.evaluate(variables)?,
            Expr::Binary(op, left, right) => {
                let l = left.evaluate(variables)?;
                let r = right.evaluate(variables)?;
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                }
            }
        };

        if result.is_finite() {
            Ok(result)
        } else {
            Err(ExprError("non-finite result".to_string()))
        }
    }
}

fn operand(path: &str, value: &Value) -> Result<f64, ExprError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| ExprError(format!("{} is not numeric", path))),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .ok_or_else(|| ExprError(format!("{} is not numeric", path))),
        Value::Null => Err(ExprError(format!("{} is undefined", path))),
        Value::Array(_) | Value::Object(_) => Err(ExprError(format!("{} is not numeric", path))),
    }
}
