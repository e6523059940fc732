/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Compiled template tree.
//!
//! A compiled template is a [`Node::Root`] whose children are text,
//! interpolations and sections. Open sections (`for`, `if`, `block`) own
//! their body. Continuations (`elif`, `else`, `elsefor`) and close tags are
//! *siblings* of the section they continue, so a conditional compiles to
//!
//! ```text
//! Section(IfOpen)[body] Section(ElseIf)[body] Section(Else)[body] Section(IfClose)
//! ```
//!
//! all within the same parent's children.

use crate::expr::Expression;

/// A node in the compiled tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// The tree root; renders its children only.
    Root(Vec<Node>),

    /// Literal text, rendered verbatim.
    Text(String),

    /// `{{ path }}` or `{{ name(arg, ...) }}`
    Interpolation(Interpolation),

    /// A control tag: `{% ... %}`
    Section(Section),
}

impl Node {
    /// Children of a root or section node; empty for leaves.
    pub fn children(&self) -> &[Node] {
        match self {
            Node::Root(children) => children,
            Node::Section(section) => &section.children,
            Node::Text(_) | Node::Interpolation(_) => &[],
        }
    }
}

/// Body of an interpolation tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Interpolation {
    /// A variable path: `{{ guy.name }}`
    Path(VarPath),

    /// A function call: `{{ toupper(name) }}`
    Call { name: String, args: Vec<VarPath> },
}

/// Section kinds, keyed by the first word of the tag body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    ForOpen,
    ForElse,
    ForClose,
    IfOpen,
    ElseIf,
    Else,
    IfClose,
    BlockOpen,
    BlockClose,
    Extends,
}

impl SectionKind {
    /// Look up a tag keyword.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Some(match keyword {
            "if" => SectionKind::IfOpen,
            "elif" => SectionKind::ElseIf,
            "else" => SectionKind::Else,
            "endif" => SectionKind::IfClose,
            "for" => SectionKind::ForOpen,
            "elsefor" => SectionKind::ForElse,
            "endfor" => SectionKind::ForClose,
            "block" => SectionKind::BlockOpen,
            "endblock" => SectionKind::BlockClose,
            "extends" => SectionKind::Extends,
            _ => return None,
        })
    }

    /// The keyword that introduces this kind.
    pub fn keyword(self) -> &'static str {
        match self {
            SectionKind::IfOpen => "if",
            SectionKind::ElseIf => "elif",
            SectionKind::Else => "else",
            SectionKind::IfClose => "endif",
            SectionKind::ForOpen => "for",
            SectionKind::ForElse => "elsefor",
            SectionKind::ForClose => "endfor",
            SectionKind::BlockOpen => "block",
            SectionKind::BlockClose => "endblock",
            SectionKind::Extends => "extends",
        }
    }

    /// Whether subsequent nodes become children of this section.
    pub fn has_body(self) -> bool {
        matches!(
            self,
            SectionKind::ForOpen
                | SectionKind::ForElse
                | SectionKind::IfOpen
                | SectionKind::ElseIf
                | SectionKind::Else
                | SectionKind::BlockOpen
        )
    }
}

/// A control section.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// What kind of tag this is.
    pub kind: SectionKind,
    /// Whitespace-separated words of the tag body, keyword included.
    pub params: Vec<String>,
    /// The section body (empty for close tags and `extends`).
    pub children: Vec<Node>,
    /// Parameters validated and parsed at compile time.
    pub directive: Directive,
    /// Byte offset of the tag in its source.
    pub offset: usize,
}

/// Compile-time interpretation of a section's parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// No parameters (`else`, `endif`, `elsefor`, `endfor`, `endblock`).
    None,
    /// `for <variable> in <collection>`
    Loop { variable: String, collection: VarPath },
    /// `if [not] <expression>` and `elif [not] <expression>`
    Condition(Condition),
    /// `block <name>` and `extends <name>`
    Name(String),
}

/// A parsed `if`/`elif` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Whether the condition started with `not`.
    pub negated: bool,
    /// The expression, pre-parsed by the expression engine.
    pub expression: Expression,
}

/// A dotted variable path with optional `[n]` index suffixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarPath {
    /// The path as written (whitespace removed), used in error messages.
    pub raw: String,
    /// Path components (e.g. `guys[1].name` → `guys`+`[1]`, `name`).
    pub segments: Vec<PathSegment>,
}

/// One dot-separated component of a [`VarPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub key: String,
    pub indices: Vec<usize>,
}

impl VarPath {
    /// Parse a path such as `a.b`, `items[2]` or `rows[0][1].name`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        if raw.is_empty() {
            return Err("empty variable path".to_string());
        }

        let mut segments = Vec::new();
        for part in raw.split('.') {
            let (key, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if key.is_empty() || key.contains([']', '(', ')', ',']) {
                return Err(format!("invalid path segment `{}` in `{}`", part, raw));
            }

            let mut indices = Vec::new();
            while !rest.is_empty() {
                let close = rest
                    .find(']')
                    .filter(|_| rest.starts_with('['))
                    .ok_or_else(|| format!("malformed index in `{}`", raw))?;
                let index = rest[1..close]
                    .parse::<usize>()
                    .map_err(|_| format!("invalid index `{}` in `{}`", &rest[1..close], raw))?;
                indices.push(index);
                rest = &rest[close + 1..];
            }

            segments.push(PathSegment {
                key: key.to_string(),
                indices,
            });
        }

        Ok(VarPath {
            raw: raw.to_string(),
            segments,
        })
    }
}
