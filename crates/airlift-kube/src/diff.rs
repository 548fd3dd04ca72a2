//! Unified diffs over rendered resource documents
//!
//! Used by `takeoff --diff-only`, `turbulence`, and `blackbox` revision
//! comparison. Documents are YAML renderings of canonical-name object maps,
//! so diffs stay stable across runs.

use console::Style;
use serde::Serialize;
use serde_json::Value;
use similar::TextDiff;

use crate::error::Result;

/// A named text document being diffed.
#[derive(Debug, Clone)]
pub struct NamedDocument {
    pub name: String,
    pub content: String,
}

/// Render a serializable value as a named YAML document.
pub fn yaml_document(name: impl Into<String>, value: &impl Serialize) -> Result<NamedDocument> {
    Ok(NamedDocument {
        name: name.into(),
        content: serde_yaml::to_string(value)?,
    })
}

/// Unified diff between two documents. Empty output means no difference.
pub fn unified(expected: &NamedDocument, actual: &NamedDocument, context: usize) -> String {
    TextDiff::from_lines(expected.content.as_str(), actual.content.as_str())
        .unified_diff()
        .context_radius(context)
        .header(&expected.name, &actual.name)
        .to_string()
}

/// Like [`unified`], with removals in green and additions in red: a line
/// "added" by live state is drift away from the declared state.
pub fn unified_colorized(
    expected: &NamedDocument,
    actual: &NamedDocument,
    context: usize,
) -> String {
    colorize(&unified(expected, actual, context))
}

fn colorize(diff: &str) -> String {
    let green = Style::new().green();
    let red = Style::new().red();

    let mut colorized = diff
        .lines()
        .map(|line| match line.as_bytes().first() {
            Some(b'-') => green.apply_to(line).to_string(),
            Some(b'+') => red.apply_to(line).to_string(),
            _ => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n");
    if diff.ends_with('\n') {
        colorized.push('\n');
    }
    colorized
}

/// Restrict `actual` to the field paths present in `expected`.
///
/// Server-added fields (status, defaults, generated metadata) disappear so
/// only divergences of declared state remain. Maps recurse by key, arrays
/// index-wise; scalars are kept verbatim even when they differ.
pub fn prune_undeclared(actual: &Value, expected: &Value) -> Value {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => Value::Object(
            actual
                .iter()
                .filter_map(|(key, value)| {
                    expected
                        .get(key)
                        .map(|declared| (key.clone(), prune_undeclared(value, declared)))
                })
                .collect(),
        ),
        (Value::Array(actual), Value::Array(expected)) => Value::Array(
            actual
                .iter()
                .zip(expected.iter())
                .map(|(value, declared)| prune_undeclared(value, declared))
                .collect(),
        ),
        (actual, _) => actual.clone(),
    }
}
