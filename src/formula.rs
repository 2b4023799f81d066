//! Inverse-CDF formulas for custom service time distributions.
//!
//! A formula is ordinary arithmetic over a handful of names:
//!
//! - `x` or `u`: one Uniform(0, 1) draw, shared by every occurrence within a sample
//! - `mu`: the configured processing rate
//! - `pi`, `e`
//!
//! with `+ - * / ^`, unary minus, parentheses and the functions `ln`, `log`
//! (natural), `exp`, `sqrt` and `abs`. `^` binds tighter than unary minus and
//! is right associative, so `-x^2` is `-(x^2)` and `2^3^2` is `2^9`.
//!
//! ```text
//! -ln(1 - x)/mu
//! -(1/mu)*ln(u)
//! ```

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("unexpected character '{ch}' at offset {at}")]
    UnexpectedChar { ch: char, at: usize },
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("unexpected token '{token}' at offset {at}")]
    UnexpectedToken { token: String, at: usize },
    #[error("unknown name '{name}' at offset {at}")]
    UnknownName { name: String, at: usize },
    #[error("unknown function '{name}' at offset {at}")]
    UnknownFunction { name: String, at: usize },
    #[error("malformed number '{text}' at offset {at}")]
    BadNumber { text: String, at: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Func {
    Ln,
    Exp,
    Sqrt,
    Abs,
}

impl Func {
    fn lookup(name: &str) -> Option<Func> {
        match name {
            "ln" | "log" => Some(Func::Ln),
            "exp" => Some(Func::Exp),
            "sqrt" => Some(Func::Sqrt),
            "abs" => Some(Func::Abs),
            _ => None,
        }
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Func::Ln => v.ln(),
            Func::Exp => v.exp(),
            Func::Sqrt => v.sqrt(),
            Func::Abs => v.abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Uniform,
    Mu,
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
}

impl Expr {
    fn eval(&self, u: f64, mu: f64) -> f64 {
        match self {
            Expr::Num(v) => *v,
            Expr::Uniform => u,
            Expr::Mu => mu,
            Expr::Neg(inner) => -inner.eval(u, mu),
            Expr::Call(func, arg) => func.apply(arg.eval(u, mu)),
            Expr::Bin(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(u, mu), rhs.eval(u, mu));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(v) => write!(f, "{v}"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Caret => write!(f, "^"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, FormulaError> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<CharIndices<'_>> = src.char_indices().peekable();

    while let Some(&(at, ch)) = chars.peek() {
        let single = match ch {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '^' => Some(Token::Caret),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            _ => None,
        };
        if let Some(tok) = single {
            chars.next();
            tokens.push((tok, at));
            continue;
        }

        if ch.is_ascii_digit() || ch == '.' {
            let mut end = at;
            let mut prev = ' ';
            while let Some(&(i, c)) = chars.peek() {
                // allow exponents such as 1e-3
                let exp_sign = (c == '-' || c == '+') && (prev == 'e' || prev == 'E');
                if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exp_sign {
                    end = i + c.len_utf8();
                    prev = c;
                    chars.next();
                } else {
                    break;
                }
            }
            let text = &src[at..end];
            let value = text.parse::<f64>().map_err(|_| FormulaError::BadNumber {
                text: text.to_string(),
                at,
            })?;
            tokens.push((Token::Num(value), at));
        } else if ch.is_alphabetic() || ch == '_' {
            let mut end = at;
            while let Some(&(i, c)) = chars.peek() {
                if c.is_alphanumeric() || c == '_' {
                    end = i + c.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push((Token::Ident(src[at..end].to_string()), at));
        } else {
            return Err(FormulaError::UnexpectedChar { ch, at });
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, want: Token) -> Result<(), FormulaError> {
        match self.next() {
            Some((tok, _)) if tok == want => Ok(()),
            Some((tok, at)) => Err(FormulaError::UnexpectedToken {
                token: tok.to_string(),
                at,
            }),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // term := unary (('*' | '/') unary)*
    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // unary := '-' unary | power
    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if let Some(Token::Minus) = self.peek() {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.power()
    }

    // power := atom ('^' unary)?
    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.atom()?;
        if let Some(Token::Caret) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Bin(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, FormulaError> {
        let (tok, at) = self.next().ok_or(FormulaError::UnexpectedEnd)?;
        match tok {
            Token::Num(v) => Ok(Expr::Num(v)),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if let Some(Token::LParen) = self.peek() {
                    let func = Func::lookup(&name)
                        .ok_or(FormulaError::UnknownFunction { name, at })?;
                    self.pos += 1;
                    let arg = self.expr()?;
                    self.expect(Token::RParen)?;
                    return Ok(Expr::Call(func, Box::new(arg)));
                }
                match name.as_str() {
                    "x" | "u" => Ok(Expr::Uniform),
                    "mu" | "μ" => Ok(Expr::Mu),
                    "pi" => Ok(Expr::Num(std::f64::consts::PI)),
                    "e" => Ok(Expr::Num(std::f64::consts::E)),
                    _ => Err(FormulaError::UnknownName { name, at }),
                }
            }
            other => Err(FormulaError::UnexpectedToken {
                token: other.to_string(),
                at,
            }),
        }
    }
}

/// A parsed formula, ready to be evaluated once per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Formula, FormulaError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expr()?;
        if let Some((tok, at)) = parser.next() {
            return Err(FormulaError::UnexpectedToken {
                token: tok.to_string(),
                at,
            });
        }
        Ok(Formula {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates with `u` bound to `x`/`u` and `mu` to the processing rate.
    pub fn eval(&self, u: f64, mu: f64) -> f64 {
        self.expr.eval(u, mu)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
