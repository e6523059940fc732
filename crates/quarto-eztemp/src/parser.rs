/*
 * parser.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template compiler.
//!
//! Compilation runs in three steps:
//!
//! 1. [`tokenize`] splits the source into text, `{{ }}` and `{% %}` tokens,
//!    trimming indentation in front of section tags that start their line.
//! 2. [`TreeBuilder`] turns the token stream into a tree, matching open,
//!    continuation and close tags with an explicit stack of open sections.
//! 3. `extends` is resolved (see [`crate::inheritance`]) and block markers
//!    are removed, leaving a tree the renderer can walk directly.

use crate::ast::{Condition, Directive, Interpolation, Node, Section, SectionKind, VarPath};
use crate::error::{TemplateError, TemplateResult, line_of};
use crate::expr::Expression;
use crate::inheritance;
use crate::resolver::{FileSystemLoader, TemplateLoader};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// Maximum depth of an `extends` chain.
pub const MAX_EXTENDS_DEPTH: usize = 50;

/// A compiled template ready for rendering.
///
/// The tree is immutable once compiled and may be rendered any number of
/// times, from any number of threads, against different contexts.
#[derive(Debug, Clone)]
pub struct Template {
    /// The compiled tree (always a [`Node::Root`]).
    pub(crate) root: Node,

    /// Path the template was compiled from, if any.
    pub(crate) path: Option<PathBuf>,
}

impl Template {
    /// Compile a template from source text.
    ///
    /// `extends` names are resolved relative to the current directory.
    pub fn compile(source: &str) -> TemplateResult<Self> {
        Self::compile_with_loader(source, Path::new(""), &FileSystemLoader)
    }

    /// Compile source text as if it were read from `base_path`.
    ///
    /// `extends` names are resolved against the directory of `base_path`.
    pub fn compile_with_path(source: &str, base_path: &Path) -> TemplateResult<Self> {
        Self::compile_with_loader(source, base_path, &FileSystemLoader)
    }

    /// Compile a template file, resolving `extends` from the filesystem.
    pub fn compile_file(path: &Path) -> TemplateResult<Self> {
        let source = std::fs::read_to_string(path)?;
        let filename = path.to_string_lossy();
        Self::compile_with_loader(&source, path, &FileSystemLoader).map_err(|e| match e {
            // Enhance error message with filename
            TemplateError::ParseError { message } => TemplateError::ParseError {
                message: format!("{}: {}", filename, message),
            },
            _ => e,
        })
    }

    /// Compile a template with a custom base template loader.
    ///
    /// # Arguments
    /// * `source` - The template source text
    /// * `template_path` - Path used for resolving `extends` names
    /// * `loader` - The loader used for base templates
    pub fn compile_with_loader(
        source: &str,
        template_path: &Path,
        loader: &impl TemplateLoader,
    ) -> TemplateResult<Self> {
        let nodes = compile_nodes(source, template_path, loader, 0)?;
        let nodes = inheritance::strip_blocks(nodes);
        tracing::debug!(
            path = %template_path.display(),
            nodes = nodes.len(),
            "compiled template"
        );

        Ok(Template {
            root: Node::Root(nodes),
            path: if template_path.as_os_str().is_empty() {
                None
            } else {
                Some(template_path.to_path_buf())
            },
        })
    }

    /// The root of the compiled tree.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// The top-level nodes of the compiled tree.
    pub fn nodes(&self) -> &[Node] {
        self.root.children()
    }

    /// The path this template was compiled from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Compile source into top-level nodes with block markers still in place,
/// splicing into the base template if the source extends one.
pub(crate) fn compile_nodes(
    source: &str,
    template_path: &Path,
    loader: &impl TemplateLoader,
    depth: usize,
) -> TemplateResult<Vec<Node>> {
    let nodes = build_tree(source)?;
    match inheritance::extends_target(&nodes) {
        Some(name) => inheritance::extend(&nodes, name, template_path, loader, depth),
        None => Ok(nodes),
    }
}

/// A lexical token of template source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token<'s> {
    Text(&'s str),
    Interpolation { body: &'s str, offset: usize },
    Section { body: &'s str, offset: usize },
}

/// Whether only spaces and tabs separate `offset` from the start of its line.
fn starts_line(source: &str, offset: usize) -> bool {
    let line_start = source[..offset].rfind('\n').map_or(0, |pos| pos + 1);
    source[line_start..offset]
        .bytes()
        .all(|b| b == b' ' || b == b'\t')
}

/// Split template source into tokens.
///
/// An opening delimiter with no closing delimiter after it is plain text.
pub(crate) fn tokenize(source: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while let Some(found) = source[pos..].find('{') {
        let start = pos + found;
        let rest = &source[start..];
        let (is_section, close) = if rest.starts_with("{{") {
            (false, "}}")
        } else if rest.starts_with("{%") {
            (true, "%}")
        } else {
            pos = start + 1;
            continue;
        };

        let body_start = start + 2;
        let Some(len) = source[body_start..].find(close) else {
            pos = start + 1;
            continue;
        };

        let mut text = &source[text_start..start];
        if is_section && starts_line(source, start) {
            text = text.trim_end_matches([' ', '\t']);
        }
        if !text.is_empty() {
            tokens.push(Token::Text(text));
        }

        let body = &source[body_start..body_start + len];
        tokens.push(if is_section {
            Token::Section {
                body,
                offset: start,
            }
        } else {
            Token::Interpolation {
                body,
                offset: start,
            }
        });

        pos = body_start + len + close.len();
        text_start = pos;
    }

    if text_start < source.len() {
        tokens.push(Token::Text(&source[text_start..]));
    }
    tokens
}

static CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\((.*)\)$").unwrap());

/// Parse the body of an interpolation tag.
pub(crate) fn parse_interpolation(body: &str) -> Result<Interpolation, String> {
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();

    if let Some(caps) = CALL_RE.captures(&compact) {
        let args = caps[2]
            .split(',')
            .filter(|arg| !arg.is_empty())
            .map(VarPath::parse)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Interpolation::Call {
            name: caps[1].to_string(),
            args,
        });
    }

    Ok(Interpolation::Path(VarPath::parse(&compact)?))
}

/// Builds the node tree from a token stream.
///
/// `stack` holds the sections whose bodies are still open; the top of the
/// stack is the parent of any node pushed next. Popping a section hands it
/// to the section (or root) below it.
struct TreeBuilder<'s> {
    source: &'s str,
    root: Vec<Node>,
    stack: Vec<Section>,
    seen_section: bool,
}

impl<'s> TreeBuilder<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            root: Vec::new(),
            stack: Vec::new(),
            seen_section: false,
        }
    }

    fn push_node(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => self.root.push(node),
        }
    }

    /// Close the innermost open section, moving it into its parent.
    fn pop_into_parent(&mut self) {
        if let Some(section) = self.stack.pop() {
            self.push_node(Node::Section(section));
        }
    }

    fn line(&self, offset: usize) -> usize {
        line_of(self.source, offset)
    }

    fn parse_error(&self, offset: usize, message: impl std::fmt::Display) -> TemplateError {
        TemplateError::ParseError {
            message: format!("line {}: {}", self.line(offset), message),
        }
    }

    fn unmatched(&self, section: &Section, message: impl Into<String>) -> TemplateError {
        TemplateError::UnmatchedSection {
            tag: section.kind.keyword().to_string(),
            line: self.line(section.offset),
            message: message.into(),
        }
    }

    fn interpolation(&mut self, body: &str, offset: usize) -> TemplateResult<()> {
        let interpolation =
            parse_interpolation(body).map_err(|message| self.parse_error(offset, message))?;
        self.push_node(Node::Interpolation(interpolation));
        Ok(())
    }

    fn section(&mut self, body: &str, offset: usize) -> TemplateResult<()> {
        let params: Vec<String> = body.split_whitespace().map(str::to_string).collect();
        let Some(keyword) = params.first() else {
            return Err(self.parse_error(offset, "empty section tag"));
        };
        let kind = SectionKind::from_keyword(keyword).ok_or_else(|| TemplateError::UnknownTag {
            tag: keyword.clone(),
            line: self.line(offset),
        })?;

        let directive = self.directive(kind, &params, offset)?;
        let section = Section {
            kind,
            params,
            children: Vec::new(),
            directive,
            offset,
        };

        let open_kind = self.stack.last().map(|s| s.kind);
        match kind {
            SectionKind::ForOpen | SectionKind::IfOpen | SectionKind::BlockOpen => {
                self.stack.push(section);
            }
            SectionKind::ElseIf | SectionKind::Else => {
                if !matches!(open_kind, Some(SectionKind::IfOpen | SectionKind::ElseIf)) {
                    return Err(self.unmatched(&section, "no open `if` to continue"));
                }
                self.pop_into_parent();
                self.stack.push(section);
            }
            SectionKind::ForElse => {
                if open_kind != Some(SectionKind::ForOpen) {
                    return Err(self.unmatched(&section, "no open `for` to continue"));
                }
                self.pop_into_parent();
                self.stack.push(section);
            }
            SectionKind::IfClose => {
                if !matches!(
                    open_kind,
                    Some(SectionKind::IfOpen | SectionKind::ElseIf | SectionKind::Else)
                ) {
                    return Err(self.unmatched(&section, "no open `if` to close"));
                }
                self.pop_into_parent();
                self.push_node(Node::Section(section));
            }
            SectionKind::ForClose => {
                if !matches!(open_kind, Some(SectionKind::ForOpen | SectionKind::ForElse)) {
                    return Err(self.unmatched(&section, "no open `for` to close"));
                }
                self.pop_into_parent();
                self.push_node(Node::Section(section));
            }
            SectionKind::BlockClose => {
                let open_name = match self.stack.last() {
                    Some(Section {
                        kind: SectionKind::BlockOpen,
                        directive: Directive::Name(name),
                        ..
                    }) => name.clone(),
                    _ => return Err(self.unmatched(&section, "no open `block` to close")),
                };
                if let Directive::Name(close_name) = &section.directive {
                    if *close_name != open_name {
                        return Err(self.unmatched(
                            &section,
                            format!("`endblock {}` closes block `{}`", close_name, open_name),
                        ));
                    }
                }
                self.pop_into_parent();
                self.push_node(Node::Section(section));
            }
            SectionKind::Extends => {
                if self.seen_section || !self.stack.is_empty() {
                    return Err(self.parse_error(offset, "`extends` must be the first tag"));
                }
                self.push_node(Node::Section(section));
            }
        }

        self.seen_section = true;
        Ok(())
    }

    /// Validate a section's parameters and parse what it needs at render time.
    fn directive(
        &self,
        kind: SectionKind,
        params: &[String],
        offset: usize,
    ) -> TemplateResult<Directive> {
        let keyword = kind.keyword();
        let args = &params[1..];

        match kind {
            SectionKind::ForOpen => match args {
                [variable, in_kw, collection] if in_kw == "in" => {
                    let collection = VarPath::parse(collection)
                        .map_err(|message| self.parse_error(offset, message))?;
                    Ok(Directive::Loop {
                        variable: variable.clone(),
                        collection,
                    })
                }
                _ => Err(self.parse_error(offset, "expected `for <name> in <path>`")),
            },
            SectionKind::IfOpen | SectionKind::ElseIf => {
                let (negated, rest) = match args.split_first() {
                    Some((first, rest)) if first == "not" => (true, rest),
                    _ => (false, args),
                };
                if rest.is_empty() {
                    return Err(self.parse_error(offset, format!("`{}` needs a condition", keyword)));
                }
                let text = rest.join(" ");
                let expression = Expression::parse(&text).map_err(|e| {
                    self.parse_error(offset, format!("in condition `{}`: {}", text, e))
                })?;
                Ok(Directive::Condition(Condition {
                    negated,
                    expression,
                }))
            }
            SectionKind::BlockOpen | SectionKind::Extends => match args {
                [name] => Ok(Directive::Name(unquote(name).to_string())),
                _ => Err(self.parse_error(offset, format!("expected `{} <name>`", keyword))),
            },
            SectionKind::BlockClose => match args {
                [] => Ok(Directive::None),
                [name] => Ok(Directive::Name(name.clone())),
                _ => Err(self.parse_error(offset, "expected `endblock [name]`")),
            },
            SectionKind::Else
            | SectionKind::IfClose
            | SectionKind::ForElse
            | SectionKind::ForClose => {
                if args.is_empty() {
                    Ok(Directive::None)
                } else {
                    Err(self.parse_error(offset, format!("`{}` takes no parameters", keyword)))
                }
            }
        }
    }

    fn finish(self) -> TemplateResult<Vec<Node>> {
        if let Some(open) = self.stack.last() {
            return Err(self.unmatched(open, "never closed"));
        }
        Ok(self.root)
    }
}

/// Strip one pair of matching single or double quotes.
fn unquote(name: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = name
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    name
}

/// Tokenize and build the tree for one source text.
pub(crate) fn build_tree(source: &str) -> TemplateResult<Vec<Node>> {
    let mut builder = TreeBuilder::new(source);
    for token in tokenize(source) {
        match token {
            Token::Text(text) => builder.push_node(Node::Text(text.to_string())),
            Token::Interpolation { body, offset } => builder.interpolation(body, offset)?,
            Token::Section { body, offset } => builder.section(body, offset)?,
        }
    }
    builder.finish()
}
