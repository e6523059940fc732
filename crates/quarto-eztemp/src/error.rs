/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template compilation and rendering.

use thiserror::Error;

/// Errors that can occur during template operations.
///
/// Compilation errors (`ParseError`, `UnknownTag`, `UnmatchedSection`,
/// `TemplateNotFound`, `RecursiveExtends`) abort compilation. Everything else
/// aborts the render call that raised it; no partial output is returned.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Error parsing the template or one of its conditions.
    #[error("Parse error: {message}")]
    ParseError { message: String },

    /// A section tag whose keyword is not in the tag table.
    #[error("Unknown tag `{tag}` at line {line}")]
    UnknownTag { tag: String, line: usize },

    /// A continuation or close tag with no matching open tag, or an open tag
    /// that is never closed.
    #[error("Unmatched section `{tag}` at line {line}: {message}")]
    UnmatchedSection {
        tag: String,
        line: usize,
        message: String,
    },

    /// A condition referenced a name absent from the flattened variable table.
    #[error("Unknown variable `{name}` in condition `{condition}`")]
    UnknownVariable { name: String, condition: String },

    /// A path segment was not found while resolving an interpolation or loop.
    #[error("Missing key: {path}")]
    MissingKey { path: String },

    /// A value had the wrong shape for the operation applied to it.
    #[error("Type mismatch at `{path}`: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A call interpolation named a function that is not registered.
    #[error("Unknown function: {name}")]
    UnknownFunction { name: String },

    /// The base template named by `extends` could not be loaded.
    #[error("Template not found: {name}")]
    TemplateNotFound { name: String },

    /// The `extends` chain is too deep (most likely cyclic).
    #[error("Recursive template inheritance detected (depth > {max_depth}): {name}")]
    RecursiveExtends { name: String, max_depth: usize },

    /// The value supplied as a render context is not an object.
    #[error("Invalid context: expected an object, found {found}")]
    InvalidContext { found: &'static str },

    /// Malformed JSON context text.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (e.g., reading a template file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// One-based line number of a byte offset, for error messages.
pub(crate) fn line_of(source: &str, offset: usize) -> usize {
    let end = offset.min(source.len());
    source.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}
