//! Detection patterns for catalog features.
//!
//! Curated features carry a hand-written pattern. Everything else gets one
//! derived from its identifier shape: `:name()` and `:name` are selectors,
//! `@name` an at-rule, bare CSS names are properties, `<name>` an element,
//! `[name]` an attribute, and script identifiers are interfaces or dotted
//! members.

use crate::catalog::{FeatureKind, FeatureRecord};
use regex::{Regex, RegexBuilder};

/// Build the detection regex source for an identifier of the given kind.
pub fn derive_pattern(id: &str, kind: FeatureKind) -> Option<String> {
    let id = id.trim();
    if id.is_empty() {
        return None;
    }
    let pattern = match kind {
        FeatureKind::Css => {
            if let Some(name) = id.strip_prefix(':') {
                match name.strip_suffix("()") {
                    Some(func) => format!(r":{}\s*\(", regex::escape(func.trim_start_matches(':'))),
                    None => format!(r"::?{}\b", regex::escape(name.trim_start_matches(':'))),
                }
            } else if let Some(rule) = id.strip_prefix('@') {
                format!(r"@{}\b", regex::escape(rule))
            } else if let Some(func) = id.strip_suffix("()") {
                format!(r"(?:^|[^\w-]){}\s*\(", regex::escape(func))
            } else {
                format!(r"(?:^|[\s;{{]){}\s*:", regex::escape(id))
            }
        }
        FeatureKind::Html => {
            if let Some(tag) = id.strip_prefix('<').and_then(|t| t.strip_suffix('>')) {
                format!(r"<{}[\s>/]", regex::escape(tag))
            } else if let Some(attr) = id.strip_prefix('[').and_then(|a| a.strip_suffix(']')) {
                format!(
                    r"<[a-z][a-z0-9-]*\b[^>]*\s{}(?:\s*=|[\s/>])",
                    regex::escape(attr)
                )
            } else {
                return None;
            }
        }
        FeatureKind::Script => {
            if id.contains('.') {
                format!(r"\b{}\b", regex::escape(id))
            } else {
                let name = regex::escape(id);
                format!(
                    r"(?:\bnew\s+{name}\b|\b{name}\s*\.|\bwindow\.{name}\b|\binstanceof\s+{name}\b)"
                )
            }
        }
    };
    Some(pattern)
}

/// Compile the record's pattern with the matching rules of its kind: CSS
/// and HTML are case-insensitive, script is case-sensitive.
pub fn compile(record: &FeatureRecord) -> Option<Regex> {
    let source = match &record.pattern {
        Some(p) => p.clone(),
        None => derive_pattern(&record.id, record.kind)?,
    };
    match RegexBuilder::new(&source)
        .case_insensitive(record.kind != FeatureKind::Script)
        .build()
    {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::debug!(feature = %record.id, "unusable detection pattern: {e}");
            None
        }
    }
}
