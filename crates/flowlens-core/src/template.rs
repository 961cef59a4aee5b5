//! `{{placeholder}}` expansion in node task text.
//!
//! Placeholders name either the run's initial input (`{{input}}`) or another
//! node's output (`{{node_<id>}}` or bare `{{<id>}}`). Unknown placeholders
//! are left in place; [`validate`] reports them up front.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::graph::NodeDescriptor;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("placeholder pattern is a valid regex")
});

const INPUT: &str = "input";
const NODE_PREFIX: &str = "node_";

/// Values available to [`resolve`], borrowed for one call.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub input: Option<&'a str>,
    /// Node id -> current accumulated output.
    pub nodes: &'a HashMap<String, String>,
}

/// A placeholder that does not refer to `input` or a known node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateIssue {
    /// Identifier inside the braces.
    pub placeholder: String,
    /// Byte range of the whole `{{...}}` in the template.
    pub span: Range<usize>,
}

impl std::fmt::Display for TemplateIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "unknown placeholder '{{{{{}}}}}' at {}..{}",
            self.placeholder, self.span.start, self.span.end
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PreviewContext<'a> {
    pub input: Option<&'a str>,
    pub nodes: &'a [NodeDescriptor],
    /// Node whose task is being edited; references to it stay verbatim.
    pub current_node: Option<&'a str>,
}

/// Resolves a placeholder identifier to a node id accepted by `is_known`.
///
/// `node_<id>` is tried as `<id>` first, then as a bare id.
fn referenced_node<'i>(ident: &'i str, is_known: impl Fn(&str) -> bool) -> Option<&'i str> {
    if let Some(id) = ident.strip_prefix(NODE_PREFIX)
        && is_known(id)
    {
        return Some(id);
    }
    is_known(ident).then_some(ident)
}

/// Identifiers of every placeholder in `template`, in order.
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Substitutes `input` and node outputs into `template`.
pub fn resolve(template: &str, ctx: &TemplateContext<'_>) -> String {
    substitute(template, |ident| {
        if ident == INPUT {
            return ctx.input.map(str::to_string);
        }
        referenced_node(ident, |id| ctx.nodes.contains_key(id))
            .and_then(|id| ctx.nodes.get(id))
            .cloned()
    })
}

/// Lists placeholders that are neither `input` nor a reference to `known_ids`.
pub fn validate(template: &str, known_ids: &HashSet<&str>) -> Vec<TemplateIssue> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let ident = caps.get(1)?.as_str();
            if ident == INPUT || referenced_node(ident, |id| known_ids.contains(id)).is_some() {
                return None;
            }
            Some(TemplateIssue {
                placeholder: ident.to_string(),
                span: whole.range(),
            })
        })
        .collect()
}

/// Fills placeholders with example values for display while editing.
pub fn preview(template: &str, ctx: &PreviewContext<'_>) -> String {
    substitute(template, |ident| {
        if ident == INPUT {
            return ctx.input.map(str::to_string);
        }
        let id = referenced_node(ident, |id| ctx.nodes.iter().any(|node| node.id == id))?;
        if ctx.current_node == Some(id) {
            return None;
        }
        ctx.nodes
            .iter()
            .find(|node| node.id == id)
            .map(NodeDescriptor::example_output)
    })
}

/// Replaces each placeholder with `lookup(ident)`, keeping it when `None`.
fn substitute(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    fn outputs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(id, out)| ((*id).to_string(), (*out).to_string()))
            .collect()
    }

    #[test]
    fn test_resolve_input_and_node_reference() {
        let nodes = outputs(&[("42", "Y")]);
        let ctx = TemplateContext {
            input: Some("X"),
            nodes: &nodes,
        };
        assert_eq!(resolve("{{input}} then {{node_42}}", &ctx), "X then Y");
        assert_eq!(resolve("{{ input }} and {{42}}", &ctx), "X and Y");
    }

    #[test]
    fn test_resolve_leaves_missing_references() {
        let nodes = HashMap::new();
        let ctx = TemplateContext {
            input: Some("X"),
            nodes: &nodes,
        };
        assert_eq!(
            resolve("{{input}} then {{node_42}}", &ctx),
            "X then {{node_42}}"
        );

        let no_input = TemplateContext {
            input: None,
            nodes: &nodes,
        };
        assert_eq!(resolve("{{input}}", &no_input), "{{input}}");
    }

    #[test]
    fn test_node_prefix_falls_back_to_bare_id() {
        let nodes = outputs(&[("node_raw", "literal id")]);
        let ctx = TemplateContext {
            input: None,
            nodes: &nodes,
        };
        assert_eq!(resolve("{{node_raw}}", &ctx), "literal id");
    }

    #[test]
    fn test_template_without_placeholders_is_unchanged() {
        let nodes = outputs(&[("a", "1")]);
        let ctx = TemplateContext {
            input: Some("X"),
            nodes: &nodes,
        };
        let text = "no {placeholders} here {{ }} {{a b}}";
        assert_eq!(resolve(text, &ctx), text);
        assert_eq!(resolve(&resolve(text, &ctx), &ctx), text);
    }

    #[test]
    fn test_validate_flags_unknown_ids_only() {
        let known: HashSet<&str> = ["42", "summary"].into_iter().collect();
        assert!(validate("{{input}} then {{node_42}} and {{summary}}", &known).is_empty());

        let issues = validate("{{input}} then {{node_7}}", &HashSet::from(["42"]));
        assert_eq!(
            issues,
            vec![TemplateIssue {
                placeholder: "node_7".to_string(),
                span: 15..25,
            }]
        );
    }

    #[test]
    fn test_placeholders_in_order() {
        assert_eq!(
            placeholders("{{b}} {{ a.b-c }} {{input}}"),
            vec!["b", "a.b-c", "input"]
        );
    }

    #[test]
    fn test_preview_uses_kind_examples_and_skips_current_node() {
        let nodes = vec![
            NodeDescriptor::new("research", NodeKind::Agent),
            NodeDescriptor::new("fetch", NodeKind::Tool),
            NodeDescriptor::new("writer", NodeKind::Agent),
        ];
        let ctx = PreviewContext {
            input: None,
            nodes: &nodes,
            current_node: Some("writer"),
        };

        let rendered = preview(
            "{{input}} | {{node_fetch}} | {{writer}} | {{ghost}}",
            &ctx,
        );
        assert_eq!(
            rendered,
            format!(
                "{{{{input}}}} | {} | {{{{writer}}}} | {{{{ghost}}}}",
                nodes[1].example_output()
            )
        );

        let with_input = PreviewContext {
            input: Some("sample"),
            ..ctx
        };
        assert_eq!(preview("{{input}}", &with_input), "sample");
    }
}
