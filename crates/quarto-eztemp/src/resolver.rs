/*
 * resolver.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Base template loading for `{% extends %}`.
//!
//! This module provides the [`TemplateLoader`] trait and implementations for
//! loading template source from various places (filesystem, memory, etc.).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File suffix appended to extended template names.
pub const TEMPLATE_SUFFIX: &str = "ez";

/// Trait for loading base templates.
///
/// Implementations are responsible for finding and loading template source
/// given the name used in `{% extends "name" %}` and the path of the
/// template being compiled.
pub trait TemplateLoader {
    /// Load a template by name.
    ///
    /// # Arguments
    /// * `name` - The extended name (e.g., "base", "layouts/page")
    /// * `base_path` - The path of the template that references it
    ///
    /// # Returns
    /// The template source text, or `None` if not found.
    fn load(&self, name: &str, base_path: &Path) -> Option<String>;
}

/// Loader that reads templates from the filesystem.
///
/// `name` is resolved against the directory of the referencing template,
/// with [`TEMPLATE_SUFFIX`] appended unless the name already has an
/// extension.
#[derive(Debug, Clone, Default)]
pub struct FileSystemLoader;

impl TemplateLoader for FileSystemLoader {
    fn load(&self, name: &str, base_path: &Path) -> Option<String> {
        let path = resolve_template_path(name, base_path);
        match std::fs::read_to_string(&path) {
            Ok(source) => Some(source),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "failed to read template");
                None
            }
        }
    }
}

/// Loader that finds nothing.
///
/// Use this loader to compile templates that must not use `extends`.
#[derive(Debug, Clone, Default)]
pub struct NullLoader;

impl TemplateLoader for NullLoader {
    fn load(&self, _name: &str, _base_path: &Path) -> Option<String> {
        None
    }
}

/// Loader that serves templates from an in-memory map.
///
/// Useful for testing and for templates bundled into the application.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    /// Create a new empty memory loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template under the name used in `extends`.
    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) -> &mut Self {
        self.templates.insert(name.into(), source.into());
        self
    }

    /// Create a loader with the given templates.
    pub fn with_templates(
        templates: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        let mut loader = Self::new();
        for (name, source) in templates {
            loader.add(name, source);
        }
        loader
    }
}

impl TemplateLoader for MemoryLoader {
    fn load(&self, name: &str, _base_path: &Path) -> Option<String> {
        self.templates.get(name).cloned()
    }
}

/// Resolve the path of an extended template.
///
/// ```ignore
/// // Base: /templates/page.ez, name: "base"        → /templates/base.ez
/// // Base: /templates/page.ez, name: "base.html"   → /templates/base.html
/// // Base: /templates/page.ez, name: "inc/layout"  → /templates/inc/layout.ez
/// ```
pub fn resolve_template_path(name: &str, base_path: &Path) -> PathBuf {
    let base_dir = base_path.parent().unwrap_or(Path::new(""));
    let joined = base_dir.join(name);
    if Path::new(name).extension().is_some() {
        joined
    } else {
        joined.with_extension(TEMPLATE_SUFFIX)
    }
}
