//! Section template resolution.
//!
//! A proposal's navigation and "what still needs generating" state both come
//! from one ordered outline: the caller's (possibly nested) section template
//! flattened by pre-order traversal, reconciled against whatever section
//! keys the generator actually produced. Templates are immutable
//! descriptors — every resolution builds a fresh outline, so a shared
//! default template can never leak state between requests.

use indexmap::IndexMap;
use regex::Regex;
use std::sync::LazyLock;

use crate::model::SectionNode;

/// One entry of the resolved outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    pub key: String,
    pub label: String,
    pub depth: usize,
}

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s]").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Derive a stable section key from a label: lowercase, strip non-word
/// characters, whitespace → underscores. `"Work Package 1"` →
/// `"work_package_1"`. Stability matters — the key is used for lookups
/// against generated content.
pub fn derive_key(label: &str) -> String {
    let lowered = label.to_lowercase();
    let stripped = NON_WORD.replace_all(&lowered, "");
    WHITESPACE.replace_all(stripped.trim(), "_").into_owned()
}

/// Derive a display label from a bare key: underscores → spaces, title case.
/// `"impact_pathways"` → `"Impact Pathways"`.
pub fn label_from_key(key: &str) -> String {
    key.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The outline used when the caller supplies no template.
pub fn default_template() -> Vec<SectionNode> {
    vec![
        SectionNode::leaf("Executive Summary"),
        SectionNode::leaf("Objectives"),
        SectionNode::leaf("State of the Art"),
        SectionNode::leaf("Methodology"),
        SectionNode::leaf("Work Plan"),
        SectionNode::with_children(
            "Impact",
            vec![
                SectionNode::leaf("Dissemination and Exploitation"),
                SectionNode::leaf("Communication"),
            ],
        ),
        SectionNode::leaf("Risk Management"),
        SectionNode::leaf("Budget Justification"),
    ]
}

/// Resolve a template forest and generated content into one ordered outline.
///
/// Template-derived entries come first, in pre-order traversal order (roots
/// at depth 0, children at parent depth + 1). Content keys the template
/// does not know are appended at depth 0 with a label derived from the key,
/// in the content map's insertion order. Neither input is mutated.
pub fn resolve_outline(
    template: Option<&[SectionNode]>,
    sections: &IndexMap<String, String>,
) -> Vec<OutlineEntry> {
    let mut entries = Vec::new();
    match template {
        Some(nodes) => flatten_into(nodes, 0, &mut entries),
        None => flatten_into(&default_template(), 0, &mut entries),
    }

    // Orphaned content keys are not fatal: they become extra top-level
    // entries rather than getting lost.
    for key in sections.keys() {
        if !entries.iter().any(|e| e.key == *key) {
            entries.push(OutlineEntry {
                key: key.clone(),
                label: label_from_key(key),
                depth: 0,
            });
        }
    }

    entries
}

fn flatten_into(nodes: &[SectionNode], depth: usize, out: &mut Vec<OutlineEntry>) {
    for node in nodes {
        let key = match &node.key {
            Some(key) if !key.is_empty() => key.clone(),
            _ => derive_key(&node.label),
        };
        out.push(OutlineEntry {
            key,
            label: node.label.clone(),
            depth,
        });
        flatten_into(&node.subsections, depth + 1, out);
    }
}

/// Partition the resolved outline by whether each entry has generated
/// content — the presentation layer's "has content" vs "missing, offer to
/// generate" split.
pub fn missing_sections<'a>(
    outline: &'a [OutlineEntry],
    sections: &IndexMap<String, String>,
) -> Vec<&'a OutlineEntry> {
    outline
        .iter()
        .filter(|entry| !sections.contains_key(&entry.key))
        .collect()
}
