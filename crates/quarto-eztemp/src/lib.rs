/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! A small text templating language with an embedded expression engine.
//!
//! Templates mix literal text with two kinds of tags:
//!
//! - Interpolation: `{{ name }}`, `{{ guy.name }}`, `{{ items[2] }}`
//! - Function calls: `{{ toupper(name) }}`, `{{ date() }}`
//! - Conditionals: `{% if x == 1 %}...{% elif not y %}...{% else %}...{% endif %}`
//! - Loops: `{% for x in items %}...{% elsefor %}...{% endfor %}`, with a
//!   `loop` object (`loop.index`, `loop.last`, `loop.parent.index`, ...)
//! - Inheritance: `{% extends "base" %}` and `{% block name %}...{% endblock %}`
//!
//! `if` conditions are arithmetic/boolean expressions evaluated by the
//! [`expr`] module over a flattened, numeric view of the context.
//!
//! # Architecture
//!
//! [`Template::compile`] tokenizes the source, builds an immutable node tree
//! and resolves `extends` (loading base templates through a
//! [`TemplateLoader`]). [`Template::render`] walks that tree against a
//! [`Context`]; rendering does no I/O and never mutates the context, so a
//! compiled template can be rendered concurrently from many threads.
//!
//! # Example
//!
//! ```ignore
//! use quarto_eztemp::{Context, Template};
//!
//! let template = Template::compile("Hello, {{ name }}!")?;
//!
//! let mut ctx = Context::new();
//! ctx.insert("name", "World");
//!
//! let output = template.render(&ctx)?;
//! assert_eq!(output, "Hello, World!");
//! ```

pub mod ast;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod functions;
mod inheritance;
pub mod parser;
pub mod resolver;

// Re-export main types at crate root
pub use ast::{Interpolation, Node, Section, SectionKind, VarPath};
pub use context::{Context, Value};
pub use error::{TemplateError, TemplateResult};
pub use evaluator::{render, render_file, render_json, render_str};
pub use expr::{ExprError, Expression};
pub use functions::{FunctionRegistry, RenderFunction, global_registry, register_function};
pub use parser::{MAX_EXTENDS_DEPTH, Template};
pub use resolver::{FileSystemLoader, MemoryLoader, NullLoader, TemplateLoader};
