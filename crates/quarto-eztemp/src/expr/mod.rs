/*
 * expr/mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Numeric/boolean expression engine used by `if` conditions.
//!
//! Expressions are evaluated in double precision against a
//! [`VariableTable`], a flat name → number view of a [`Context`]. IEEE
//! semantics apply throughout: division by zero and math-function domain
//! errors yield `inf`/`NaN` rather than failing.
//!
//! ```ignore
//! use quarto_eztemp::{Context, expr};
//!
//! assert_eq!(expr::evaluate_number("2+3*4", &Context::new())?, 14.0);
//! assert!(expr::evaluate_bool("2**3**2 == 512", &Context::new())?);
//! ```

mod flatten;
mod parser;

pub use flatten::{UNPARSABLE_STRING, VariableTable};

use crate::context::{Context, Value};
use thiserror::Error;

/// Errors raised by the expression engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    /// Malformed expression text, or an unknown function name.
    #[error("{message} at position {position}")]
    Parse { message: String, position: usize },

    /// A variable name absent from the variable table.
    #[error("unknown variable `{name}`")]
    UnknownVariable { name: String },
}

/// Result type for expression operations.
pub type ExprResult<T> = Result<T, ExprError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Single-argument math functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryFn {
    Abs,
    Acos,
    Asin,
    Atan,
    Ceil,
    Cos,
    Cosh,
    Exp,
    Floor,
    Log,
    Log10,
    Sin,
    Sinh,
    Sqrt,
    Tan,
    Tanh,
}

impl UnaryFn {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => UnaryFn::Abs,
            "acos" => UnaryFn::Acos,
            "asin" => UnaryFn::Asin,
            "atan" => UnaryFn::Atan,
            "ceil" => UnaryFn::Ceil,
            "cos" => UnaryFn::Cos,
            "cosh" => UnaryFn::Cosh,
            "exp" => UnaryFn::Exp,
            "floor" => UnaryFn::Floor,
            "log" => UnaryFn::Log,
            "log10" => UnaryFn::Log10,
            "sin" => UnaryFn::Sin,
            "sinh" => UnaryFn::Sinh,
            "sqrt" => UnaryFn::Sqrt,
            "tan" => UnaryFn::Tan,
            "tanh" => UnaryFn::Tanh,
            _ => return None,
        })
    }

    fn apply(self, x: f64) -> f64 {
        match self {
            UnaryFn::Abs => x.abs(),
            UnaryFn::Acos => x.acos(),
            UnaryFn::Asin => x.asin(),
            UnaryFn::Atan => x.atan(),
            UnaryFn::Ceil => x.ceil(),
            UnaryFn::Cos => x.cos(),
            UnaryFn::Cosh => x.cosh(),
            UnaryFn::Exp => x.exp(),
            UnaryFn::Floor => x.floor(),
            UnaryFn::Log => x.ln(),
            UnaryFn::Log10 => x.log10(),
            UnaryFn::Sin => x.sin(),
            UnaryFn::Sinh => x.sinh(),
            UnaryFn::Sqrt => x.sqrt(),
            UnaryFn::Tan => x.tan(),
            UnaryFn::Tanh => x.tanh(),
        }
    }
}

/// Two-argument math functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryFn {
    Atan2,
    Max,
    Min,
    Pow,
}

impl BinaryFn {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "atan2" => BinaryFn::Atan2,
            "max" => BinaryFn::Max,
            "min" => BinaryFn::Min,
            "pow" => BinaryFn::Pow,
            _ => return None,
        })
    }

    fn apply(self, x: f64, y: f64) -> f64 {
        match self {
            BinaryFn::Atan2 => x.atan2(y),
            BinaryFn::Max => x.max(y),
            BinaryFn::Min => x.min(y),
            BinaryFn::Pow => x.powf(y),
        }
    }
}

/// Arithmetic expression tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Number(f64),
    Variable(String),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Unary(UnaryFn, Box<Expr>),
    Binary2(BinaryFn, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn eval(&self, vars: &VariableTable) -> ExprResult<f64> {
        Ok(match self {
            Expr::Number(n) => *n,
            Expr::Variable(name) => {
                vars.get(name)
                    .ok_or_else(|| ExprError::UnknownVariable { name: name.clone() })?
            }
            Expr::Neg(inner) => -inner.eval(vars)?,
            Expr::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(vars)?, rhs.eval(vars)?);
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Pow => a.powf(b),
                }
            }
            Expr::Unary(function, arg) => function.apply(arg.eval(vars)?),
            Expr::Binary2(function, lhs, rhs) => function.apply(lhs.eval(vars)?, rhs.eval(vars)?),
        })
    }
}

/// Top level of an expression: equality only applies here.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Equation {
    Value(Expr),
    Equal(Expr, Expr),
    NotEqual(Expr, Expr),
}

/// A parsed expression, reusable across evaluations.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Equation,
}

impl Expression {
    /// Parse expression text.
    pub fn parse(source: &str) -> ExprResult<Self> {
        Ok(Expression {
            source: source.to_string(),
            root: parser::parse(source)?,
        })
    }

    /// The expression text as given to [`Expression::parse`].
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate to a value: `Float` for arithmetic, `Boolean` for `==`/`!=`.
    pub fn evaluate(&self, vars: &VariableTable) -> ExprResult<Value> {
        Ok(match &self.root {
            Equation::Value(expr) => Value::Float(expr.eval(vars)?),
            Equation::Equal(lhs, rhs) => Value::Boolean(lhs.eval(vars)? == rhs.eval(vars)?),
            Equation::NotEqual(lhs, rhs) => Value::Boolean(lhs.eval(vars)? != rhs.eval(vars)?),
        })
    }

    /// Evaluate to a number; comparisons yield `1.0` or `0.0`.
    pub fn evaluate_number(&self, vars: &VariableTable) -> ExprResult<f64> {
        Ok(match self.evaluate(vars)? {
            Value::Boolean(b) => f64::from(u8::from(b)),
            Value::Float(f) => f,
            _ => 0.0,
        })
    }

    /// Evaluate for truthiness: any nonzero result is true.
    pub fn evaluate_bool(&self, vars: &VariableTable) -> ExprResult<bool> {
        Ok(self.evaluate_number(vars)? != 0.0)
    }
}

/// Parse and evaluate `source` against `context`.
pub fn evaluate(source: &str, context: &Context) -> ExprResult<Value> {
    Expression::parse(source)?.evaluate(&VariableTable::from_context(context))
}

/// Parse and evaluate `source` against `context` as a number.
pub fn evaluate_number(source: &str, context: &Context) -> ExprResult<f64> {
    Expression::parse(source)?.evaluate_number(&VariableTable::from_context(context))
}

/// Parse and evaluate `source` against `context` for truthiness.
pub fn evaluate_bool(source: &str, context: &Context) -> ExprResult<bool> {
    Expression::parse(source)?.evaluate_bool(&VariableTable::from_context(context))
}
