/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template value and context types.
//!
//! [`Value`] is the data flowing through contexts, conditions and output.
//! [`Context`] holds the variable bindings for one render call. Scopes
//! entered during rendering (loop bodies) are child contexts that borrow
//! their parent, so the caller's context is never mutated.

use crate::ast::VarPath;
use crate::error::{TemplateError, TemplateResult};
use std::collections::BTreeMap;

/// A value that can be used in template evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// A null value.
    #[default]
    Null,

    /// A string value.
    String(String),

    /// A signed integer.
    Integer(i64),

    /// A double-precision float.
    Float(f64),

    /// A boolean value.
    Boolean(bool),

    /// An ordered list of values.
    Array(Vec<Value>),

    /// A map of string keys to values.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Name of this value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Render a scalar value as output text.
    ///
    /// Returns `None` for arrays and objects, which have no text form.
    pub fn stringify(&self) -> Option<String> {
        match self {
            Value::Null => Some("null".to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Parse JSON text into a value.
    pub fn from_json_str(text: &str) -> TemplateResult<Value> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        Ok(Value::from(json))
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

/// Variable bindings for one render call.
///
/// A context may have a parent; lookups fall through to it when a name is
/// not bound locally. Child contexts are created by the renderer for loop
/// bodies and are discarded when the body finishes.
#[derive(Debug, Clone, Default)]
pub struct Context<'p> {
    /// Variable bindings at this level.
    variables: BTreeMap<String, Value>,

    /// Enclosing scope, if any.
    parent: Option<&'p Context<'p>>,

    /// Whether this scope is a loop body (its `loop` binding is a Loop Context).
    loop_scope: bool,
}

impl Context<'static> {
    /// Create a new empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from an object value.
    pub fn from_value(value: Value) -> TemplateResult<Self> {
        match value {
            Value::Object(variables) => Ok(Context {
                variables,
                parent: None,
                loop_scope: false,
            }),
            other => Err(TemplateError::InvalidContext {
                found: other.type_name(),
            }),
        }
    }

    /// Build a context from JSON text whose top level is an object.
    pub fn from_json(text: &str) -> TemplateResult<Self> {
        Self::from_value(Value::from_json_str(text)?)
    }
}

impl From<BTreeMap<String, Value>> for Context<'static> {
    fn from(variables: BTreeMap<String, Value>) -> Self {
        Context {
            variables,
            parent: None,
            loop_scope: false,
        }
    }
}

impl<'p> Context<'p> {
    /// Insert a variable into this scope.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Get a variable, checking parent scopes.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables
            .get(key)
            .or_else(|| self.parent.and_then(|p| p.get(key)))
    }

    /// Create a child scope that overlays this one.
    pub fn child(&self) -> Context<'_> {
        Context {
            variables: BTreeMap::new(),
            parent: Some(self),
            loop_scope: false,
        }
    }

    /// Create a child scope for one loop iteration.
    pub(crate) fn loop_child(&self) -> Context<'_> {
        Context {
            variables: BTreeMap::new(),
            parent: Some(self),
            loop_scope: true,
        }
    }

    /// The Loop Context of the innermost enclosing loop body, if any.
    pub(crate) fn enclosing_loop(&self) -> Option<&Value> {
        if self.loop_scope {
            if let Some(value) = self.variables.get("loop") {
                return Some(value);
            }
        }
        self.parent.and_then(|p| p.enclosing_loop())
    }

    /// The effective top-level bindings, innermost binding of each name winning.
    pub fn bindings(&self) -> BTreeMap<&str, &Value> {
        let mut merged = match self.parent {
            Some(parent) => parent.bindings(),
            None => BTreeMap::new(),
        };
        for (key, value) in &self.variables {
            merged.insert(key.as_str(), value);
        }
        merged
    }

    /// Resolve a dotted/indexed path against this context.
    pub fn resolve(&self, path: &VarPath) -> TemplateResult<&Value> {
        let missing = || TemplateError::MissingKey {
            path: path.raw.clone(),
        };

        let mut segments = path.segments.iter();
        let first = segments.next().ok_or_else(missing)?;
        let mut current = self.get(&first.key).ok_or_else(missing)?;
        current = index_into(current, &first.indices, path)?;

        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(&segment.key).ok_or_else(missing)?,
                other => {
                    return Err(TemplateError::TypeMismatch {
                        path: path.raw.clone(),
                        expected: "object",
                        found: other.type_name(),
                    });
                }
            };
            current = index_into(current, &segment.indices, path)?;
        }

        Ok(current)
    }
}

/// Apply `[n]` suffixes of one path segment.
fn index_into<'v>(mut value: &'v Value, indices: &[usize], path: &VarPath) -> TemplateResult<&'v Value> {
    for &index in indices {
        value = match value {
            Value::Array(items) => items.get(index).ok_or_else(|| TemplateError::MissingKey {
                path: path.raw.clone(),
            })?,
            other => {
                return Err(TemplateError::TypeMismatch {
                    path: path.raw.clone(),
                    expected: "array",
                    found: other.type_name(),
                });
            }
        };
    }
    Ok(value)
}
