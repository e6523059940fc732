/*
 * expr/flatten.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Flattening of contexts into name → number tables.

use super::parser::scan_number;
use crate::context::{Context, Value};
use std::collections::HashMap;

/// Number substituted for strings that do not start with a number.
pub const UNPARSABLE_STRING: f64 = f64::MIN;

/// Read the longest numeric prefix of `s`, after leading whitespace and an
/// optional sign. `inf` and `nan` are accepted in any case.
fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'-') => (-1.0, &s[1..]),
        Some(b'+') => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    let word = rest.get(..3).map(str::to_ascii_lowercase);
    match word.as_deref() {
        Some("inf") => return Some(sign * f64::INFINITY),
        Some("nan") => return Some(f64::NAN),
        _ => {}
    }
    let end = scan_number(rest.as_bytes(), 0);
    rest[..end].parse::<f64>().ok().map(|n| sign * n)
}

/// Flat variable table an expression is evaluated against.
///
/// Object members contribute `prefix.key`, array elements `prefix[i]`.
/// Scalars convert to numbers (`true` → 1, `false` → 0, strings by their
/// leading number so `"12px"` is 12, other strings [`UNPARSABLE_STRING`]).
/// Null leaves have no numeric value; they are skipped with a warning so the
/// rest of the table still builds.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    values: HashMap<String, f64>,
}

impl VariableTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten the effective bindings of a context.
    pub fn from_context(context: &Context) -> Self {
        let mut table = Self::new();
        for (name, value) in context.bindings() {
            table.flatten(name.to_string(), value);
        }
        table
    }

    /// Bind a single name.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    /// Look up a flattened name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Number of flattened names.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn flatten(&mut self, name: String, value: &Value) {
        match value {
            Value::Null => {
                tracing::warn!(variable = %name, "skipping null value in expression variables");
            }
            Value::String(s) => {
                let number = leading_number(s).unwrap_or(UNPARSABLE_STRING);
                self.values.insert(name, number);
            }
            Value::Integer(i) => {
                self.values.insert(name, *i as f64);
            }
            Value::Float(f) => {
                self.values.insert(name, *f);
            }
            Value::Boolean(b) => {
                self.values.insert(name, if *b { 1.0 } else { 0.0 });
            }
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.flatten(format!("{}[{}]", name, index), item);
                }
            }
            Value::Object(map) => {
                for (key, item) in map {
                    self.flatten(format!("{}.{}", name, key), item);
                }
            }
        }
    }
}
