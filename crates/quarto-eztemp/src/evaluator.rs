/*
 * evaluator.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template rendering.
//!
//! This module walks a compiled tree against a [`Context`] in a single
//! depth-first pass, appending each node's output to one string. Any error
//! aborts the render; partial output is never returned.

use crate::ast::{Condition, Directive, Interpolation, Node, Section, SectionKind, VarPath};
use crate::context::{Context, Value};
use crate::error::{TemplateError, TemplateResult};
use crate::expr::{ExprError, VariableTable};
use crate::functions::{FunctionRegistry, global_registry};
use crate::parser::Template;
use std::collections::BTreeMap;
use std::path::Path;

impl Template {
    /// Render this template with the given context.
    ///
    /// Functions are looked up in a snapshot of the process-wide registry
    /// taken when the call starts.
    ///
    /// # Returns
    /// The rendered output string, or an error if evaluation fails.
    pub fn render(&self, context: &Context) -> TemplateResult<String> {
        self.render_with(context, &global_registry())
    }

    /// Render this template, looking functions up in `functions`.
    pub fn render_with(
        &self,
        context: &Context,
        functions: &FunctionRegistry,
    ) -> TemplateResult<String> {
        let mut out = String::new();
        render_nodes(self.nodes(), context, functions, &mut out)?;
        Ok(out)
    }
}

/// Render a compiled template.
pub fn render(template: &Template, context: &Context) -> TemplateResult<String> {
    template.render(context)
}

/// Compile and render template text in one call.
pub fn render_str(source: &str, context: &Context) -> TemplateResult<String> {
    Template::compile(source)?.render(context)
}

/// Compile template text and render it against a JSON object.
pub fn render_json(source: &str, json: &str) -> TemplateResult<String> {
    let template = Template::compile(source)?;
    template.render(&Context::from_json(json)?)
}

/// Compile a template file and render it against a JSON object.
///
/// `extends` names in the file resolve relative to its directory.
pub fn render_file(path: impl AsRef<Path>, json: &str) -> TemplateResult<String> {
    let template = Template::compile_file(path.as_ref())?;
    template.render(&Context::from_json(json)?)
}

fn render_nodes(
    nodes: &[Node],
    context: &Context,
    functions: &FunctionRegistry,
    out: &mut String,
) -> TemplateResult<()> {
    for (i, node) in nodes.iter().enumerate() {
        match node {
            Node::Root(children) => render_nodes(children, context, functions, out)?,
            Node::Text(text) => out.push_str(text),
            Node::Interpolation(interpolation) => {
                render_interpolation(interpolation, context, functions, out)?;
            }
            Node::Section(section) => {
                let following = &nodes[i + 1..];
                match (section.kind, &section.directive) {
                    (
                        SectionKind::ForOpen,
                        Directive::Loop {
                            variable,
                            collection,
                        },
                    ) => {
                        let else_body = match following.first() {
                            Some(Node::Section(next)) if next.kind == SectionKind::ForElse => {
                                Some(next.children.as_slice())
                            }
                            _ => None,
                        };
                        render_loop(
                            section, variable, collection, else_body, context, functions, out,
                        )?;
                    }
                    (SectionKind::IfOpen, _) => {
                        render_conditional(section, following, context, functions, out)?;
                    }
                    // Continuations are rendered by the section they continue;
                    // close tags have no output.
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

fn render_interpolation(
    interpolation: &Interpolation,
    context: &Context,
    functions: &FunctionRegistry,
    out: &mut String,
) -> TemplateResult<()> {
    match interpolation {
        Interpolation::Path(path) => {
            let value = context.resolve(path)?;
            out.push_str(&value_text(value, path)?);
        }
        Interpolation::Call { name, args } => {
            let args = args
                .iter()
                .map(|arg| context.resolve(arg).cloned())
                .collect::<TemplateResult<Vec<_>>>()?;
            out.push_str(&functions.invoke(name, &args)?);
        }
    }
    Ok(())
}

fn value_text(value: &Value, path: &VarPath) -> TemplateResult<String> {
    value.stringify().ok_or_else(|| TemplateError::TypeMismatch {
        path: path.raw.clone(),
        expected: "scalar",
        found: value.type_name(),
    })
}

fn render_loop(
    section: &Section,
    variable: &str,
    collection: &VarPath,
    else_body: Option<&[Node]>,
    context: &Context,
    functions: &FunctionRegistry,
    out: &mut String,
) -> TemplateResult<()> {
    let items = match context.resolve(collection)? {
        Value::Array(items) => items,
        other => {
            return Err(TemplateError::TypeMismatch {
                path: collection.raw.clone(),
                expected: "array",
                found: other.type_name(),
            });
        }
    };
    tracing::trace!(collection = %collection.raw, length = items.len(), "rendering loop");

    if items.is_empty() {
        if let Some(body) = else_body {
            render_nodes(body, context, functions, out)?;
        }
        return Ok(());
    }

    let parent = context
        .enclosing_loop()
        .cloned()
        .unwrap_or_else(|| Value::Object(BTreeMap::new()));

    for (index0, item) in items.iter().enumerate() {
        let mut scope = context.loop_child();
        scope.insert(variable, item.clone());
        scope.insert("loop", loop_context(index0, items.len(), &parent));
        render_nodes(&section.children, &scope, functions, out)?;
    }
    Ok(())
}

/// The `loop` object for iteration `index0` of `length`.
fn loop_context(index0: usize, length: usize, parent: &Value) -> Value {
    let int = |n: usize| Value::Integer(i64::try_from(n).unwrap_or(i64::MAX));
    let mut fields = BTreeMap::new();
    fields.insert("index".to_string(), int(index0 + 1));
    fields.insert("index0".to_string(), int(index0));
    fields.insert("first".to_string(), Value::Boolean(index0 == 0));
    fields.insert("last".to_string(), Value::Boolean(index0 + 1 == length));
    fields.insert("revindex".to_string(), int(length - index0));
    fields.insert("revindex0".to_string(), int(length - 1 - index0));
    fields.insert("length".to_string(), int(length));
    fields.insert("parent".to_string(), parent.clone());
    Value::Object(fields)
}

/// Render the first branch of an `if`/`elif`/`else` chain that holds.
///
/// `following` are the siblings after the `if`; the chain is the run of
/// `elif`/`else` sections at their start.
fn render_conditional(
    section: &Section,
    following: &[Node],
    context: &Context,
    functions: &FunctionRegistry,
    out: &mut String,
) -> TemplateResult<()> {
    let continuations = following.iter().map_while(|node| match node {
        Node::Section(next) if matches!(next.kind, SectionKind::ElseIf | SectionKind::Else) => {
            Some(next)
        }
        _ => None,
    });

    let mut vars: Option<VariableTable> = None;
    for branch in std::iter::once(section).chain(continuations) {
        let taken = match &branch.directive {
            Directive::Condition(condition) => {
                let vars = vars.get_or_insert_with(|| VariableTable::from_context(context));
                condition_holds(condition, vars)?
            }
            _ => true,
        };
        if taken {
            return render_nodes(&branch.children, context, functions, out);
        }
    }
    Ok(())
}

fn condition_holds(condition: &Condition, vars: &VariableTable) -> TemplateResult<bool> {
    let source = condition.expression.source();
    let value = condition
        .expression
        .evaluate_bool(vars)
        .map_err(|err| match err {
            ExprError::UnknownVariable { name } => TemplateError::UnknownVariable {
                name,
                condition: source.to_string(),
            },
            ExprError::Parse { .. } => TemplateError::ParseError {
                message: format!("in condition `{}`: {}", source, err),
            },
        })?;
    Ok(value != condition.negated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx(json: &str) -> Context<'static> {
        Context::from_json(json).expect("context should parse")
    }

    fn render_ok(source: &str, json: &str) -> String {
        render_json(source, json).expect("template should render")
    }

    #[test]
    fn test_literal_text_preserved() {
        let source = "line one\n  line two {{ x }}\n\ttabs {  } { x }\n";
        assert_eq!(
            render_ok(source, r#"{"x": "X"}"#),
            "line one\n  line two X\n\ttabs {  } { x }\n"
        );
    }

    #[test]
    fn test_nested_object_interpolation() {
        assert_eq!(render_ok("{{ a.b }}", r#"{"a": {"b": 2}}"#), "2");
    }

    #[test]
    fn test_scalar_rendering() {
        let json = r#"{"s": "str", "i": -4, "f": 2.5, "b": true, "n": null}"#;
        assert_eq!(
            render_ok("{{s}}|{{i}}|{{f}}|{{b}}|{{n}}", json),
            "str|-4|2.5|true|null"
        );
    }

    #[test]
    fn test_indexed_interpolation() {
        let json = r#"{"items": ["x", "y", "z"], "guys": [{"name": "riri"}, {"name": "fifi"}]}"#;
        assert_eq!(render_ok("{{ items[2] }}", json), "z");
        assert_eq!(render_ok("{{ guys[1].name }}", json), "fifi");
    }

    #[test]
    fn test_missing_key_names_full_path() {
        match render_json("before {{ missing.path }} after", "{}") {
            Err(TemplateError::MissingKey { path }) => assert_eq!(path, "missing.path"),
            other => panic!("expected MissingKey, got {:?}", other),
        }
    }

    #[test]
    fn test_rendering_array_is_type_mismatch() {
        match render_json("{{ items }}", r#"{"items": [1, 2]}"#) {
            Err(TemplateError::TypeMismatch { path, found, .. }) => {
                assert_eq!(path, "items");
                assert_eq!(found, "array");
            }
            other => panic!("expected TypeMismatch, got {:?}", other),
        }
        assert!(matches!(
            render_json("{{ a }}", r#"{"a": {"b": 1}}"#),
            Err(TemplateError::TypeMismatch { found: "object", .. })
        ));
    }

    #[test]
    fn test_for_loop() {
        assert_eq!(
            render_ok(
                "{% for x in xs %}[{{ x }}]{% endfor %}",
                r#"{"xs": ["a", "b", "c"]}"#
            ),
            "[a][b][c]"
        );
    }

    #[test]
    fn test_loop_context_fields() {
        let source = "{% for x in xs %}{{ loop.index }},{{ loop.index0 }},{{ loop.first }},\
                      {{ loop.last }},{{ loop.revindex }},{{ loop.revindex0 }},{{ loop.length }};\
                      {% endfor %}";
        assert_eq!(
            render_ok(source, r#"{"xs": ["a", "b", "c"]}"#),
            "1,0,true,false,3,2,3;2,1,false,false,2,1,3;3,2,false,true,1,0,3;"
        );
    }

    #[test]
    fn test_loop_context_invariants() {
        let template = Template::compile(
            "{% for x in xs %}{% if loop.index0 == loop.index - 1 %}\
             {% if loop.revindex0 == loop.length - 1 - loop.index0 %}ok{% endif %}\
             {% endif %}{% endfor %}",
        )
        .unwrap();
        for length in [1_usize, 2, 5] {
            let items: Vec<Value> = (0..length).map(|n| Value::Integer(n as i64)).collect();
            let mut context = Context::new();
            context.insert("xs", items);
            assert_eq!(template.render(&context).unwrap(), "ok".repeat(length));
        }
    }

    #[test]
    fn test_single_element_loop_is_first_and_last() {
        assert_eq!(
            render_ok(
                "{% for x in xs %}{{ loop.first }}/{{ loop.last }}{% endfor %}",
                r#"{"xs": [0]}"#
            ),
            "true/true"
        );
    }

    #[test]
    fn test_nested_loop_parent() {
        let source = "{% for a in outer %}{% for b in inner %}\
                      {{ loop.parent.index }}.{{ loop.index }} \
                      {% endfor %}{% endfor %}";
        assert_eq!(
            render_ok(source, r#"{"outer": [1, 2], "inner": ["x", "y"]}"#),
            "1.1 1.2 2.1 2.2 "
        );
    }

    #[test]
    fn test_loop_parent_chain() {
        let source = "{% for a in xs %}{% for b in xs %}{% for c in xs %}\
                      {{ loop.parent.parent.index }}{% endfor %}{% endfor %}{% endfor %}";
        assert_eq!(render_ok(source, r#"{"xs": [1, 2]}"#), "11112222");
    }

    #[test]
    fn test_outermost_loop_parent_is_empty_object() {
        match render_json(
            "{% for x in xs %}{{ loop.parent.index }}{% endfor %}",
            r#"{"xs": [1]}"#,
        ) {
            Err(TemplateError::MissingKey { path }) => assert_eq!(path, "loop.parent.index"),
            other => panic!("expected MissingKey, got {:?}", other),
        }
    }

    #[test]
    fn test_loop_binding_does_not_leak() {
        assert!(matches!(
            render_json(
                "{% for x in xs %}{% endfor %}{{ x }}",
                r#"{"xs": [1]}"#
            ),
            Err(TemplateError::MissingKey { .. })
        ));
        assert_eq!(
            render_ok(
                "{% for x in xs %}{{ x }}{% endfor %}{{ x }}",
                r#"{"xs": [1, 2], "x": "outer"}"#
            ),
            "12outer"
        );
    }

    #[test]
    fn test_loop_over_object_fields() {
        let json = r#"{"guys": [{"name": "riri", "age": 7}, {"name": "fifi", "age": 8}]}"#;
        assert_eq!(
            render_ok(
                "{% for guy in guys %}{{ guy.name }}={{ guy.age }} {% endfor %}",
                json
            ),
            "riri=7 fifi=8 "
        );
    }

    #[test]
    fn test_elsefor_renders_only_for_empty() {
        let source = "{% for x in xs %}[{{ x }}]{% elsefor %}empty{% endfor %}";
        assert_eq!(render_ok(source, r#"{"xs": []}"#), "empty");
        assert_eq!(render_ok(source, r#"{"xs": [1, 2]}"#), "[1][2]");
        assert_eq!(
            render_ok("{% for x in xs %}[{{ x }}]{% endfor %}", r#"{"xs": []}"#),
            ""
        );
    }

    #[test]
    fn test_loop_errors() {
        assert!(matches!(
            render_json("{% for x in xs %}{% endfor %}", r#"{"xs": "abc"}"#),
            Err(TemplateError::TypeMismatch {
                expected: "array",
                found: "string",
                ..
            })
        ));
        assert!(matches!(
            render_json("{% for x in nope %}{% endfor %}", "{}"),
            Err(TemplateError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_if_not() {
        let source = "{% if not x %}falsy{% else %}truthy{% endif %}";
        assert_eq!(render_ok(source, r#"{"x": 1}"#), "truthy");
        assert_eq!(render_ok(source, r#"{"x": 0}"#), "falsy");
        assert_eq!(render_ok(source, r#"{"x": true}"#), "truthy");
        assert_eq!(render_ok(source, r#"{"x": false}"#), "falsy");
    }

    #[test]
    fn test_if_without_else_renders_nothing() {
        assert_eq!(render_ok("a{% if x %}b{% endif %}c", r#"{"x": 0}"#), "ac");
    }

    #[test]
    fn test_elif_chain() {
        let source = "{% if n == 1 %}one{% elif n == 2 %}two{% elif not n - 3 %}three\
                      {% else %}many{% endif %}";
        assert_eq!(render_ok(source, r#"{"n": 1}"#), "one");
        assert_eq!(render_ok(source, r#"{"n": 2}"#), "two");
        assert_eq!(render_ok(source, r#"{"n": 3}"#), "three");
        assert_eq!(render_ok(source, r#"{"n": 9}"#), "many");
    }

    #[test]
    fn test_condition_expressions() {
        let json = r#"{"a": {"b": 2}, "items": [1, 5], "s": " 4 "}"#;
        assert_eq!(
            render_ok("{% if a.b * 3 == items[1] + 1 %}yes{% endif %}", json),
            "yes"
        );
        assert_eq!(render_ok("{% if s - 4 %}no{% else %}yes{% endif %}", json), "yes");
        assert_eq!(render_ok("{% if max(a.b, 1) != 2 %}no{% endif %}", json), "");
    }

    #[test]
    fn test_condition_sees_loop_bindings() {
        let source = "{% for x in xs %}{% if loop.last %}{{ x }}{% elif x == 2 %}two,\
                      {% endif %}{% endfor %}";
        assert_eq!(render_ok(source, r#"{"xs": [1, 2, 3]}"#), "two,3");
    }

    #[test]
    fn test_unknown_variable_in_condition() {
        match render_json("{% if nope + 1 %}x{% endif %}", "{}") {
            Err(TemplateError::UnknownVariable { name, condition }) => {
                assert_eq!(name, "nope");
                assert_eq!(condition, "nope + 1");
            }
            other => panic!("expected UnknownVariable, got {:?}", other),
        }
    }

    #[test]
    fn test_null_member_in_condition_is_unknown() {
        let json = r#"{"b": {"c": null, "d": 2}}"#;
        match render_json("{% if b.c %}x{% endif %}", json) {
            Err(TemplateError::UnknownVariable { name, condition }) => {
                assert_eq!(name, "b.c");
                assert_eq!(condition, "b.c");
            }
            other => panic!("expected UnknownVariable, got {:?}", other),
        }
        // siblings of the null leaf stay usable
        assert_eq!(render_ok("{% if b.d == 2 %}yes{% endif %}", json), "yes");
    }

    #[test]
    fn test_condition_on_unit_suffixed_string() {
        let json = r#"{"width": "12px", "label": "wide"}"#;
        assert_eq!(
            render_ok("{% if width == 12 %}yes{% else %}no{% endif %}", json),
            "yes"
        );
        assert_eq!(
            render_ok("{% if label == 0 %}yes{% else %}no{% endif %}", json),
            "no"
        );
    }

    #[test]
    fn test_crate_doc_conditional_renders() {
        let source = "{% if x == 1 %}one{% elif not y %}no y{% else %}other{% endif %}";
        assert_eq!(render_ok(source, r#"{"x": 1, "y": 0}"#), "one");
        assert_eq!(render_ok(source, r#"{"x": 2, "y": 0}"#), "no y");
        assert_eq!(render_ok(source, r#"{"x": 2, "y": 1}"#), "other");
    }

    #[test]
    fn test_untaken_branches_not_evaluated() {
        assert_eq!(
            render_ok(
                "{% if 1 %}ok{% elif nope %}{{ missing }}{% endif %}",
                "{}"
            ),
            "ok"
        );
    }

    #[test]
    fn test_builtin_function_call() {
        assert_eq!(
            render_ok("{{ toupper(name) }}", r#"{"name": "riri"}"#),
            "RIRI"
        );
    }

    #[test]
    fn test_unknown_function() {
        match render_json("{{ nope(x) }}", r#"{"x": 1}"#) {
            Err(TemplateError::UnknownFunction { name }) => assert_eq!(name, "nope"),
            other => panic!("expected UnknownFunction, got {:?}", other),
        }
    }

    #[test]
    fn test_render_with_custom_registry() {
        let mut functions = FunctionRegistry::new();
        functions.register("greet", |args| {
            let names: Vec<String> = args.iter().filter_map(Value::stringify).collect();
            format!("hello {}", names.join(" and "))
        });
        let template = Template::compile("{{ greet(a, b.c) }}").unwrap();
        let context = ctx(r#"{"a": "riri", "b": {"c": "fifi"}}"#);
        assert_eq!(
            template.render_with(&context, &functions).unwrap(),
            "hello riri and fifi"
        );
        assert!(matches!(
            Template::compile("{{ toupper(a) }}")
                .unwrap()
                .render_with(&context, &functions),
            Err(TemplateError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_call_argument_missing() {
        assert!(matches!(
            render_json("{{ toupper(nope) }}", "{}"),
            Err(TemplateError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_section_indentation_trimmed() {
        let source = "<ul>\n  {% for x in xs %}\n  <li>{{ x }}</li>\n  {% endfor %}\n</ul>";
        assert_eq!(
            render_ok(source, r#"{"xs": ["a", "b"]}"#),
            "<ul>\n\n  <li>a</li>\n\n  <li>b</li>\n\n</ul>"
        );
    }

    #[test]
    fn test_render_does_not_mutate_context() {
        let template = Template::compile("{% for x in xs %}{{ x }}{% endfor %}").unwrap();
        let context = ctx(r#"{"xs": [1, 2]}"#);
        let before = context.bindings().len();
        assert_eq!(template.render(&context).unwrap(), "12");
        assert_eq!(template.render(&context).unwrap(), "12");
        assert_eq!(context.bindings().len(), before);
        assert!(context.get("x").is_none());
        assert!(context.get("loop").is_none());
    }

    #[test]
    fn test_concurrent_renders_share_tree() {
        let template = Template::compile("{% for x in xs %}{{ x }}{% endfor %}").unwrap();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4_i64)
                .map(|n| {
                    let template = &template;
                    scope.spawn(move || {
                        let mut context = Context::new();
                        context.insert("xs", vec![Value::from(n), Value::from(n)]);
                        template.render(&context).unwrap()
                    })
                })
                .collect();
            for (n, handle) in handles.into_iter().enumerate() {
                assert_eq!(handle.join().unwrap(), format!("{n}{n}"));
            }
        });
    }

    #[test]
    fn test_render_free_functions() {
        let template = Template::compile("{{ x }}").unwrap();
        assert_eq!(render(&template, &ctx(r#"{"x": 1}"#)).unwrap(), "1");
        assert_eq!(render_str("{{ x }}!", &ctx(r#"{"x": "y"}"#)).unwrap(), "y!");
        assert!(matches!(
            render_json("{{ x }}", "[1]"),
            Err(TemplateError::InvalidContext { found: "array" })
        ));
        assert!(matches!(
            render_file("/nonexistent/template.ez", "{}"),
            Err(TemplateError::Io(_))
        ));
    }
}
