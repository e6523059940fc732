/*
 * expr/parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Lexer and recursive-descent parser for condition expressions.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! equation   := expression (("==" | "!=") expression)?
//! expression := term (("+" | "-") term)*
//! term       := factor (("*" | "/") factor)*
//! factor     := primary ("**" factor)?
//! primary    := number
//!             | "(" expression ")"
//!             | ("-" | "+") primary
//!             | function "(" expression ("," expression)? ")"
//!             | constant
//!             | variable
//! ```

use super::{BinaryFn, BinaryOp, Equation, Expr, ExprError, ExprResult, UnaryFn};

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    LParen,
    RParen,
    Comma,
    EqEq,
    NotEq,
    End,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(n) => format!("number `{}`", n),
        TokenKind::Ident(name) => format!("`{}`", name),
        TokenKind::Plus => "`+`".to_string(),
        TokenKind::Minus => "`-`".to_string(),
        TokenKind::Star => "`*`".to_string(),
        TokenKind::StarStar => "`**`".to_string(),
        TokenKind::Slash => "`/`".to_string(),
        TokenKind::LParen => "`(`".to_string(),
        TokenKind::RParen => "`)`".to_string(),
        TokenKind::Comma => "`,`".to_string(),
        TokenKind::EqEq => "`==`".to_string(),
        TokenKind::NotEq => "`!=`".to_string(),
        TokenKind::End => "end of expression".to_string(),
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn tokenize(input: &str) -> ExprResult<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos] as char;
        let start = pos;

        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        let kind = match c {
            '+' => {
                pos += 1;
                TokenKind::Plus
            }
            '-' => {
                pos += 1;
                TokenKind::Minus
            }
            '*' if bytes.get(pos + 1) == Some(&b'*') => {
                pos += 2;
                TokenKind::StarStar
            }
            '*' => {
                pos += 1;
                TokenKind::Star
            }
            '/' => {
                pos += 1;
                TokenKind::Slash
            }
            '(' => {
                pos += 1;
                TokenKind::LParen
            }
            ')' => {
                pos += 1;
                TokenKind::RParen
            }
            ',' => {
                pos += 1;
                TokenKind::Comma
            }
            '=' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                TokenKind::EqEq
            }
            '!' if bytes.get(pos + 1) == Some(&b'=') => {
                pos += 2;
                TokenKind::NotEq
            }
            c if c.is_ascii_digit() || c == '.' => {
                pos = scan_number(bytes, pos);
                let text = &input[start..pos];
                let value = text.parse::<f64>().map_err(|_| ExprError::Parse {
                    message: format!("invalid number `{}`", text),
                    position: start,
                })?;
                TokenKind::Number(value)
            }
            c if is_ident_start(c) => {
                pos = scan_ident(bytes, pos, start)?;
                TokenKind::Ident(input[start..pos].to_string())
            }
            _ => {
                let found = input[start..].chars().next().unwrap_or(c);
                return Err(ExprError::Parse {
                    message: format!("unexpected character `{}`", found),
                    position: start,
                });
            }
        };

        tokens.push(Token {
            kind,
            position: start,
        });
    }

    tokens.push(Token {
        kind: TokenKind::End,
        position: input.len(),
    });
    Ok(tokens)
}

/// Scan `digits [. digits] [(e|E) [+|-] digits]`, returning the end offset.
pub(super) fn scan_number(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    if pos < bytes.len() && bytes[pos] == b'.' {
        pos += 1;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
    }
    if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
        let mut exp = pos + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            while exp < bytes.len() && bytes[exp].is_ascii_digit() {
                exp += 1;
            }
            pos = exp;
        }
    }
    pos
}

/// Scan a variable name, including `[n]` index suffixes.
fn scan_ident(bytes: &[u8], mut pos: usize, start: usize) -> ExprResult<usize> {
    loop {
        while pos < bytes.len() && is_ident_continue(bytes[pos] as char) {
            pos += 1;
        }
        if pos < bytes.len() && bytes[pos] == b'[' {
            let digits = pos + 1;
            let mut end = digits;
            while end < bytes.len() && bytes[end].is_ascii_digit() {
                end += 1;
            }
            if end == digits || end >= bytes.len() || bytes[end] != b']' {
                return Err(ExprError::Parse {
                    message: "malformed index in variable name".to_string(),
                    position: start,
                });
            }
            pos = end + 1;
        } else {
            return Ok(pos);
        }
    }
}

fn constant(name: &str) -> Option<f64> {
    Some(match name {
        "digits" => f64::MANTISSA_DIGITS as f64,
        "digits10" => f64::DIGITS as f64,
        "e" => std::f64::consts::E,
        "epsilon" => f64::EPSILON,
        "pi" => std::f64::consts::PI,
        _ => return None,
    })
}

/// Maximum nesting of parentheses, unary signs and `**` chains.
const MAX_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Run `parse` one nesting level deeper, failing past [`MAX_DEPTH`].
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ExprResult<T>) -> ExprResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::Parse {
                message: format!("expression nested more than {} levels deep", MAX_DEPTH),
                position: self.peek().position,
            });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> ExprError {
        let token = self.peek();
        ExprError::Parse {
            message: format!("expected {}, found {}", expected, describe(&token.kind)),
            position: token.position,
        }
    }

    fn expect(&mut self, kind: &TokenKind, expected: &str) -> ExprResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn equation(&mut self) -> ExprResult<Equation> {
        let lhs = self.expression()?;
        let equation = if self.eat(&TokenKind::EqEq) {
            Equation::Equal(lhs, self.expression()?)
        } else if self.eat(&TokenKind::NotEq) {
            Equation::NotEqual(lhs, self.expression()?)
        } else {
            Equation::Value(lhs)
        };
        if self.peek().kind != TokenKind::End {
            return Err(self.unexpected("an operator"));
        }
        Ok(equation)
    }

    fn expression(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> ExprResult<Expr> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.factor()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn factor(&mut self) -> ExprResult<Expr> {
        self.nested(Self::power)
    }

    fn power(&mut self) -> ExprResult<Expr> {
        let base = self.primary()?;
        if self.eat(&TokenKind::StarStar) {
            // right-associative: 2**3**2 == 2**(3**2)
            let exponent = self.factor()?;
            return Ok(Expr::Binary(
                BinaryOp::Pow,
                Box::new(base),
                Box::new(exponent),
            ));
        }
        Ok(base)
    }

    fn primary(&mut self) -> ExprResult<Expr> {
        self.nested(Self::operand)
    }

    fn operand(&mut self) -> ExprResult<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            TokenKind::Minus => Ok(Expr::Neg(Box::new(self.primary()?))),
            TokenKind::Plus => self.primary(),
            TokenKind::Ident(name) => {
                if self.peek().kind == TokenKind::LParen {
                    self.call(&name, token.position)
                } else if let Some(value) = constant(&name.to_ascii_lowercase()) {
                    Ok(Expr::Number(value))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            other => Err(ExprError::Parse {
                message: format!("expected a value, found {}", describe(&other)),
                position: token.position,
            }),
        }
    }

    fn call(&mut self, name: &str, position: usize) -> ExprResult<Expr> {
        let lower = name.to_ascii_lowercase();
        self.advance(); // (

        if let Some(function) = UnaryFn::from_name(&lower) {
            let arg = self.expression()?;
            self.expect(&TokenKind::RParen, "`)`")?;
            return Ok(Expr::Unary(function, Box::new(arg)));
        }

        if let Some(function) = BinaryFn::from_name(&lower) {
            let lhs = self.expression()?;
            self.expect(&TokenKind::Comma, "`,`")?;
            let rhs = self.expression()?;
            self.expect(&TokenKind::RParen, "`)`")?;
            return Ok(Expr::Binary2(function, Box::new(lhs), Box::new(rhs)));
        }

        Err(ExprError::Parse {
            message: format!("unknown function `{}`", name),
            position,
        })
    }
}

/// Parse expression text into an [`Equation`].
pub(super) fn parse(input: &str) -> ExprResult<Equation> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    parser.equation()
}
