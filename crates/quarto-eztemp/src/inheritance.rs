/*
 * inheritance.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template inheritance: `{% extends %}` and `{% block %}`.
//!
//! A template whose first section is `{% extends "name" %}` compiles to the
//! *base* template's tree, with each base block whose name the child also
//! defines replaced by the child's block body. Child content outside blocks
//! is dropped. Block markers survive until the outermost compilation
//! finishes so that multi-level chains can override blocks at every level;
//! [`strip_blocks`] then removes them.

use crate::ast::{Directive, Node, SectionKind};
use crate::error::{TemplateError, TemplateResult};
use crate::parser::{MAX_EXTENDS_DEPTH, compile_nodes};
use crate::resolver::{TemplateLoader, resolve_template_path};
use std::collections::HashMap;
use std::path::Path;

/// The name in a top-level `{% extends %}`, if present.
pub(crate) fn extends_target(nodes: &[Node]) -> Option<&str> {
    nodes.iter().find_map(|node| match node {
        Node::Section(section) if section.kind == SectionKind::Extends => {
            match &section.directive {
                Directive::Name(name) => Some(name.as_str()),
                _ => None,
            }
        }
        _ => None,
    })
}

/// Compile the base template `name` and splice the child's blocks into it.
pub(crate) fn extend(
    child: &[Node],
    name: &str,
    template_path: &Path,
    loader: &impl TemplateLoader,
    depth: usize,
) -> TemplateResult<Vec<Node>> {
    if depth >= MAX_EXTENDS_DEPTH {
        return Err(TemplateError::RecursiveExtends {
            name: name.to_string(),
            max_depth: MAX_EXTENDS_DEPTH,
        });
    }

    let source = loader
        .load(name, template_path)
        .ok_or_else(|| TemplateError::TemplateNotFound {
            name: name.to_string(),
        })?;
    let base_path = resolve_template_path(name, template_path);
    tracing::debug!(name, base = %base_path.display(), depth, "resolved base template");

    let mut base = compile_nodes(&source, &base_path, loader, depth + 1)?;

    let mut overrides = HashMap::new();
    collect_blocks(child, &mut overrides);
    splice_blocks(&mut base, &overrides);
    Ok(base)
}

/// Gather block bodies by name, at any depth; the first definition wins.
fn collect_blocks<'a>(nodes: &'a [Node], blocks: &mut HashMap<&'a str, &'a [Node]>) {
    for node in nodes {
        if let Node::Section(section) = node {
            if let (SectionKind::BlockOpen, Directive::Name(name)) =
                (section.kind, &section.directive)
            {
                blocks.entry(name.as_str()).or_insert(&section.children);
            }
            collect_blocks(&section.children, blocks);
        }
    }
}

/// Replace the bodies of overridden blocks, in document order.
fn splice_blocks(nodes: &mut [Node], overrides: &HashMap<&str, &[Node]>) {
    for node in nodes {
        let Node::Section(section) = node else {
            continue;
        };
        if section.kind == SectionKind::BlockOpen {
            if let Directive::Name(name) = &section.directive {
                if let Some(body) = overrides.get(name.as_str()) {
                    section.children = body.to_vec();
                    continue;
                }
            }
        }
        splice_blocks(&mut section.children, overrides);
    }
}

/// Remove block markers, keeping block bodies in place.
pub(crate) fn strip_blocks(nodes: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Section(mut section) => match section.kind {
                SectionKind::BlockOpen => out.extend(strip_blocks(section.children)),
                // consumed during compilation
                SectionKind::BlockClose | SectionKind::Extends => {}
                _ => {
                    section.children = strip_blocks(std::mem::take(&mut section.children));
                    out.push(Node::Section(section));
                }
            },
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::parser::Template;
    use crate::resolver::MemoryLoader;

    fn compile(source: &str, loader: &MemoryLoader) -> TemplateResult<Template> {
        Template::compile_with_loader(source, Path::new("/t/page.ez"), loader)
    }

    fn render(source: &str, loader: &MemoryLoader) -> String {
        compile(source, loader)
            .expect("template should compile")
            .render(&Context::new())
            .expect("template should render")
    }

    fn contains_block_markers(nodes: &[Node]) -> bool {
        nodes.iter().any(|node| match node {
            Node::Section(section) => {
                matches!(
                    section.kind,
                    SectionKind::BlockOpen | SectionKind::BlockClose | SectionKind::Extends
                ) || contains_block_markers(&section.children)
            }
            _ => false,
        })
    }

    #[test]
    fn test_block_override() {
        let loader = MemoryLoader::with_templates([(
            "base",
            "<html>{% block body %}X{% endblock %}</html>",
        )]);
        let output = render(
            "{% extends \"base\" %} {% block body %}Y{% endblock %}",
            &loader,
        );
        assert_eq!(output, "<html>Y</html>");
    }

    #[test]
    fn test_default_block_content_kept() {
        let loader = MemoryLoader::with_templates([(
            "base",
            "[{% block head %}H{% endblock %}|{% block body %}B{% endblock %}]",
        )]);
        let output = render(
            "{% extends 'base' %}{% block body %}child{% endblock %}",
            &loader,
        );
        assert_eq!(output, "[H|child]");
    }

    #[test]
    fn test_child_content_outside_blocks_discarded() {
        let loader =
            MemoryLoader::with_templates([("base", "a{% block b %}{% endblock %}c")]);
        let output = render(
            "{% extends \"base\" %}ignored{% block b %}B{% endblock %}also ignored\
             {% block unknown %}dropped{% endblock %}",
            &loader,
        );
        assert_eq!(output, "aBc");
    }

    #[test]
    fn test_multi_level_inheritance() {
        let loader = MemoryLoader::with_templates([
            (
                "root",
                "<{% block title %}root title{% endblock %}/{% block body %}root body{% endblock %}>",
            ),
            (
                "middle",
                "{% extends \"root\" %}{% block title %}middle title{% endblock %}\
                 {% block body %}middle body{% endblock %}",
            ),
        ]);
        let output = render(
            "{% extends \"middle\" %}{% block body %}leaf body{% endblock %}",
            &loader,
        );
        assert_eq!(output, "<middle title/leaf body>");
    }

    #[test]
    fn test_nested_blocks_in_base() {
        let loader = MemoryLoader::with_templates([(
            "base",
            "{% block outer %}({% block inner %}i{% endblock %}){% endblock %}",
        )]);
        let output = render(
            "{% extends \"base\" %}{% block inner %}I{% endblock %}",
            &loader,
        );
        assert_eq!(output, "(I)");
    }

    #[test]
    fn test_blocks_inside_control_flow() {
        let loader = MemoryLoader::with_templates([(
            "base",
            "{% if 1 %}{% block body %}default{% endblock %}{% endif %}",
        )]);
        let output = render(
            "{% extends \"base\" %}{% block body %}override{% endblock %}",
            &loader,
        );
        assert_eq!(output, "override");
    }

    #[test]
    fn test_compiled_tree_has_no_block_markers() {
        let loader = MemoryLoader::with_templates([(
            "base",
            "{% for x in xs %}{% block item %}{{ x }}{% endblock %}{% endfor %}",
        )]);
        let template = compile(
            "{% extends \"base\" %}{% block item %}<{{ x }}>{% endblock %}",
            &loader,
        )
        .unwrap();
        assert!(!contains_block_markers(template.nodes()));

        let standalone = compile("a{% block b %}c{% endblock %}d", &loader).unwrap();
        assert!(!contains_block_markers(standalone.nodes()));
        assert_eq!(standalone.render(&Context::new()).unwrap(), "acd");
    }

    #[test]
    fn test_missing_base_template() {
        let loader = MemoryLoader::new();
        match compile("{% extends \"nope\" %}", &loader) {
            Err(TemplateError::TemplateNotFound { name }) => assert_eq!(name, "nope"),
            other => panic!("expected TemplateNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_recursive_extends() {
        let loader = MemoryLoader::with_templates([("self", "{% extends \"self\" %}")]);
        match compile("{% extends \"self\" %}", &loader) {
            Err(TemplateError::RecursiveExtends { name, max_depth }) => {
                assert_eq!(name, "self");
                assert_eq!(max_depth, MAX_EXTENDS_DEPTH);
            }
            other => panic!("expected RecursiveExtends, got {:?}", other),
        }
    }

    #[test]
    fn test_base_compile_errors_propagate() {
        let loader = MemoryLoader::with_templates([("base", "{% if x %}")]);
        assert!(matches!(
            compile("{% extends \"base\" %}", &loader),
            Err(TemplateError::UnmatchedSection { .. })
        ));
    }
}
