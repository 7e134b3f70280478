//! Expression language shared by state conditions, `State(...)` triggers and event actions.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or         := and ( "||" and )*
//! and        := comparison ( "&&" comparison )*
//! comparison := additive ( ("==" | "!=" | "<" | "<=" | ">" | ">=") additive )*
//! additive   := unary ( ("+" | "-") unary )*
//! unary      := ("!" | "-") unary | primary
//! primary    := number | "true" | "false" | variable | "(" or ")"
//! variable   := "$" ident | "State.$" ident | ident
//! ```
//!
//! Comparisons and logical operators evaluate to `1.0` / `0.0`; any non-zero value is truthy.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Variable name without the `$` / `State.$` prefix.
    Var(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprError {
    pub position: usize,
    pub message: String,
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at column {}", self.message, self.position + 1)
    }
}

impl std::error::Error for ExprError {}

fn truth(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

impl Expr {
    pub fn eval(&self, vars: &dyn Fn(&str) -> f64) -> f64 {
        match self {
            Expr::Number(value) => *value,
            Expr::Var(name) => vars(name),
            Expr::Neg(inner) => -inner.eval(vars),
            Expr::Not(inner) => truth(inner.eval(vars) == 0.0),
            Expr::Binary { op, lhs, rhs } => match op {
                BinaryOp::And => truth(lhs.eval(vars) != 0.0 && rhs.eval(vars) != 0.0),
                BinaryOp::Or => truth(lhs.eval(vars) != 0.0 || rhs.eval(vars) != 0.0),
                _ => {
                    let (a, b) = (lhs.eval(vars), rhs.eval(vars));
                    match op {
                        BinaryOp::Add => a + b,
                        BinaryOp::Sub => a - b,
                        BinaryOp::Eq => truth(a == b),
                        BinaryOp::Ne => truth(a != b),
                        BinaryOp::Lt => truth(a < b),
                        BinaryOp::Le => truth(a <= b),
                        BinaryOp::Gt => truth(a > b),
                        BinaryOp::Ge => truth(a >= b),
                        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
                    }
                }
            },
        }
    }

    pub fn is_true(&self, vars: &dyn Fn(&str) -> f64) -> bool {
        self.eval(vars) != 0.0
    }

    /// Every variable name referenced, in first-use order.
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Var(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Neg(inner) | Expr::Not(inner) => inner.collect_vars(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_vars(out);
                rhs.collect_vars(out);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Var(String),
    Op(&'static str),
    LParen,
    RParen,
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let start = i;
        let err = |message: &str| ExprError { position: start, message: message.to_string() };
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text.parse::<f64>().map_err(|_| err("invalid number"))?;
            tokens.push((start, Token::Number(value)));
            continue;
        }
        if c == '$' {
            i += 1;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            if i == start + 1 {
                return Err(err("expected a variable name after '$'"));
            }
            tokens.push((start, Token::Var(chars[start + 1..i].iter().collect())));
            continue;
        }
        if is_ident_char(c) {
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            if ident == "State" && chars.get(i) == Some(&'.') {
                i += 1;
                if chars.get(i) == Some(&'$') {
                    i += 1;
                }
                let name_start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                if i == name_start {
                    return Err(err("expected a variable name after 'State.'"));
                }
                tokens.push((start, Token::Var(chars[name_start..i].iter().collect())));
            } else {
                tokens.push((start, Token::Ident(ident)));
            }
            continue;
        }
        let next = chars.get(i + 1).copied();
        let (op, width) = match (c, next) {
            ('=', Some('=')) => ("==", 2),
            ('!', Some('=')) => ("!=", 2),
            ('<', Some('=')) => ("<=", 2),
            ('>', Some('=')) => (">=", 2),
            ('&', Some('&')) => ("&&", 2),
            ('|', Some('|')) => ("||", 2),
            ('<', _) => ("<", 1),
            ('>', _) => (">", 1),
            ('+', _) => ("+", 1),
            ('-', _) => ("-", 1),
            ('!', _) => ("!", 1),
            ('(', _) => {
                tokens.push((start, Token::LParen));
                i += 1;
                continue;
            }
            (')', _) => {
                tokens.push((start, Token::RParen));
                i += 1;
                continue;
            }
            _ => return Err(err(&format!("unexpected character '{c}'"))),
        };
        tokens.push((start, Token::Op(op)));
        i += width;
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, token)| token)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(pos, _)| *pos)
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError { position: self.position(), message: message.into() }
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.and()?;
        while self.eat_op(&["||"]).is_some() {
            let rhs = self.and()?;
            lhs = Expr::Binary { op: BinaryOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.comparison()?;
        while self.eat_op(&["&&"]).is_some() {
            let rhs = self.comparison()?;
            lhs = Expr::Binary { op: BinaryOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.additive()?;
        while let Some(op) = self.eat_op(&["==", "!=", "<", "<=", ">", ">="]) {
            let op = match op {
                "==" => BinaryOp::Eq,
                "!=" => BinaryOp::Ne,
                "<" => BinaryOp::Lt,
                "<=" => BinaryOp::Le,
                ">" => BinaryOp::Gt,
                _ => BinaryOp::Ge,
            };
            let rhs = self.additive()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let op = if op == "+" { BinaryOp::Add } else { BinaryOp::Sub };
            let rhs = self.unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        match self.eat_op(&["!", "-"]) {
            Some("!") => Ok(Expr::Not(Box::new(self.unary()?))),
            Some(_) => Ok(Expr::Neg(Box::new(self.unary()?))),
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let token = self.peek().cloned().ok_or_else(|| self.error("unexpected end of expression"))?;
        let expr = match token {
            Token::Number(value) => Expr::Number(value),
            Token::Var(name) => Expr::Var(name),
            Token::Ident(ident) => match ident.as_str() {
                "true" => Expr::Number(1.0),
                "false" => Expr::Number(0.0),
                _ => Expr::Var(ident),
            },
            Token::LParen => {
                self.pos += 1;
                let inner = self.or()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(self.error("expected ')'"));
                }
                inner
            }
            Token::RParen => return Err(self.error("unexpected ')'")),
            Token::Op(op) => return Err(self.error(format!("unexpected operator '{op}'"))),
        };
        self.pos += 1;
        Ok(expr)
    }
}

pub fn parse_expr(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(ExprError { position: 0, message: "empty expression".to_string() });
    }
    let mut parser = Parser { tokens, pos: 0, end: src.chars().count() };
    let expr = parser.or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

/// Strips `State.` and `$` from a variable reference such as `State.$score`.
pub fn variable_name(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let name = trimmed.strip_prefix("State.").unwrap_or(trimmed);
    let name = name.strip_prefix('$').unwrap_or(name);
    (!name.is_empty() && name.chars().all(is_ident_char)).then_some(name)
}
