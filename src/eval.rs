//! Formula evaluation capability for formula-curve chart lines.
//!
//! The chart engine never calls into a concrete expression library directly;
//! it goes through the [`Evaluator`] trait so the implementation can be
//! swapped or mocked in tests. [`BasicEvaluator`] is the built-in
//! implementation: a small recursive-descent parser over `+ - * / ^`,
//! parentheses, a handful of math functions and named variables resolved
//! from a numeric scope.

use std::collections::HashMap;

use thiserror::Error;

/// Errors produced while evaluating a formula.
///
/// These are never fatal to a chart: the engine logs them and substitutes a
/// flat zero series.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("empty formula")]
    Empty,
    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("unknown identifier `{0}`")]
    UnknownIdentifier(String),
    #[error("malformed number at offset {0}")]
    MalformedNumber(usize),
}

/// Injected expression-evaluation capability.
///
/// `scope` maps variable names to values; the chart engine always provides
/// the free variable `x` plus the line's parameter set.
pub trait Evaluator {
    fn evaluate(&self, formula: &str, scope: &HashMap<String, f64>) -> Result<f64, EvalError>;
}

/// Built-in arithmetic evaluator.
///
/// Grammar (usual precedence, `^` binds tightest and is right-associative):
///
/// ```text
/// expr    := term (('+' | '-') term)*
/// term    := power (('*' | '/') power)*
/// power   := unary ('^' power)?
/// unary   := '-' unary | primary
/// primary := number | ident | ident '(' expr ')' | '(' expr ')'
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicEvaluator;

impl Evaluator for BasicEvaluator {
    fn evaluate(&self, formula: &str, scope: &HashMap<String, f64>) -> Result<f64, EvalError> {
        let mut parser = Parser {
            src: formula,
            pos: 0,
            scope,
        };
        parser.skip_ws();
        if parser.at_end() {
            return Err(EvalError::Empty);
        }
        let value = parser.expr()?;
        parser.skip_ws();
        match parser.peek() {
            None => Ok(value),
            Some(c) => Err(EvalError::UnexpectedChar(c)),
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    scope: &'a HashMap<String, f64>,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn eat(&mut self, want: char) -> bool {
        if self.peek() == Some(want) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<f64, EvalError> {
        let mut value = self.term()?;
        loop {
            self.skip_ws();
            if self.eat('+') {
                value += self.term()?;
            } else if self.eat('-') {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> Result<f64, EvalError> {
        let mut value = self.power()?;
        loop {
            self.skip_ws();
            if self.eat('*') {
                value *= self.power()?;
            } else if self.eat('/') {
                value /= self.power()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn power(&mut self) -> Result<f64, EvalError> {
        let base = self.unary()?;
        self.skip_ws();
        if self.eat('^') {
            // right-associative: 2^3^2 == 2^(3^2)
            let exponent = self.power()?;
            Ok(base.powf(exponent))
        } else {
            Ok(base)
        }
    }

    fn unary(&mut self) -> Result<f64, EvalError> {
        self.skip_ws();
        if self.eat('-') {
            Ok(-self.unary()?)
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<f64, EvalError> {
        self.skip_ws();
        match self.peek() {
            None => Err(EvalError::UnexpectedEnd),
            Some('(') => {
                self.bump();
                let value = self.expr()?;
                self.skip_ws();
                if self.eat(')') {
                    Ok(value)
                } else if self.at_end() {
                    Err(EvalError::UnexpectedEnd)
                } else {
                    Err(EvalError::UnexpectedChar(self.peek().unwrap()))
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.identifier(),
            Some(c) => Err(EvalError::UnexpectedChar(c)),
        }
    }

    fn number(&mut self) -> Result<f64, EvalError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.bump();
        }
        // scientific notation: 1.5e-3
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mark = self.pos;
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            if matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
            } else {
                // `e` belonged to something else (e.g. an identifier); back out
                self.pos = mark;
            }
        }
        self.src[start..self.pos]
            .parse::<f64>()
            .map_err(|_| EvalError::MalformedNumber(start))
    }

    fn identifier(&mut self) -> Result<f64, EvalError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        let name = &self.src[start..self.pos];
        self.skip_ws();
        if self.peek() == Some('(') {
            self.bump();
            let arg = self.expr()?;
            self.skip_ws();
            if !self.eat(')') {
                return if self.at_end() {
                    Err(EvalError::UnexpectedEnd)
                } else {
                    Err(EvalError::UnexpectedChar(self.peek().unwrap()))
                };
            }
            return match name {
                "sin" => Ok(arg.sin()),
                "cos" => Ok(arg.cos()),
                "tan" => Ok(arg.tan()),
                "sqrt" => Ok(arg.sqrt()),
                "abs" => Ok(arg.abs()),
                "exp" => Ok(arg.exp()),
                "ln" => Ok(arg.ln()),
                "log10" => Ok(arg.log10()),
                _ => Err(EvalError::UnknownIdentifier(name.to_string())),
            };
        }
        match name {
            "pi" => Ok(std::f64::consts::PI),
            "e" => Ok(std::f64::consts::E),
            _ => self
                .scope
                .get(name)
                .copied()
                .ok_or_else(|| EvalError::UnknownIdentifier(name.to_string())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────────────────────────
