/*
 * functions.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Functions callable from interpolations: `{{ toupper(name) }}`.
//!
//! Functions live in a [`FunctionRegistry`]. There is one process-wide
//! registry, pre-populated with the built-ins; register custom functions
//! with [`register_function`] during startup. Each render takes a snapshot
//! of the process-wide registry when it starts, so registering later never
//! affects (or blocks) renders already in flight.

use crate::context::Value;
use crate::error::{TemplateError, TemplateResult};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A function callable from templates.
pub type RenderFunction = Arc<dyn Fn(&[Value]) -> String + Send + Sync>;

/// A mapping from function name to callback.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, RenderFunction>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in functions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("date", |_| builtin_date())
            .register("toupper", |args| first_text(args).to_uppercase())
            .register("tolower", |args| first_text(args).to_lowercase());
        registry
    }

    /// Register (or replace) a function.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        function: impl Fn(&[Value]) -> String + Send + Sync + 'static,
    ) -> &mut Self {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    /// Whether a function is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Call the function registered under `name`.
    pub fn invoke(&self, name: &str, args: &[Value]) -> TemplateResult<String> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| TemplateError::UnknownFunction {
                name: name.to_string(),
            })?;
        Ok(function(args))
    }
}

static GLOBAL_REGISTRY: Lazy<RwLock<FunctionRegistry>> =
    Lazy::new(|| RwLock::new(FunctionRegistry::with_builtins()));

/// Register a function in the process-wide registry.
pub fn register_function(
    name: impl Into<String>,
    function: impl Fn(&[Value]) -> String + Send + Sync + 'static,
) {
    GLOBAL_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(name, function);
}

/// A snapshot of the process-wide registry.
pub fn global_registry() -> FunctionRegistry {
    GLOBAL_REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn first_text(args: &[Value]) -> String {
    args.first()
        .and_then(Value::stringify)
        .unwrap_or_default()
}

/// Current UTC time, e.g. `2015-Dec-20 10:31:07`.
fn builtin_date() -> String {
    chrono::Utc::now().format("%Y-%b-%d %H:%M:%S").to_string()
}
