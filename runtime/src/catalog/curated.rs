//! Hand-curated features layered on top of the upstream support feed.
//!
//! Some features people ask about do not map one-to-one onto a single BCD
//! entry (`container-queries`, `subgrid`, `synchronous XHR`), and generic
//! identifier matching is too blunt for others. Each entry here names the BCD
//! path its support facts come from, a detection regex, and the editorial
//! facts the feed does not carry: alternatives and an explicit deprecation
//! flag.

use super::FeatureKind;

/// One curated feature definition.
#[derive(Debug, Clone, Copy)]
pub struct CuratedFeature {
    pub id: &'static str,
    pub label: &'static str,
    pub kind: FeatureKind,
    /// Dotted BCD path of the node holding `__compat`.
    pub bcd_path: &'static str,
    /// Case sensitivity is applied per kind by the detector.
    pub pattern: &'static str,
    pub alternatives: &'static [&'static str],
    pub deprecated: bool,
}

const fn css(
    id: &'static str,
    label: &'static str,
    bcd_path: &'static str,
    pattern: &'static str,
    alternatives: &'static [&'static str],
) -> CuratedFeature {
    CuratedFeature {
        id,
        label,
        kind: FeatureKind::Css,
        bcd_path,
        pattern,
        alternatives,
        deprecated: false,
    }
}

const fn script(
    id: &'static str,
    label: &'static str,
    bcd_path: &'static str,
    pattern: &'static str,
    deprecated: bool,
) -> CuratedFeature {
    CuratedFeature {
        id,
        label,
        kind: FeatureKind::Script,
        bcd_path,
        pattern,
        alternatives: &[],
        deprecated,
    }
}

const fn html(
    id: &'static str,
    label: &'static str,
    bcd_path: &'static str,
    pattern: &'static str,
    deprecated: bool,
) -> CuratedFeature {
    CuratedFeature {
        id,
        label,
        kind: FeatureKind::Html,
        bcd_path,
        pattern,
        alternatives: &[],
        deprecated,
    }
}

pub const CURATED_FEATURES: &[CuratedFeature] = &[
    // CSS
    css(
        "backdrop-filter",
        "Backdrop filter",
        "css.properties.backdrop-filter",
        r"backdrop-filter\s*:",
        &["filter + position:fixed", "semi-transparent overlays"],
    ),
    css(
        "scroll-snap",
        "Scroll snap",
        "css.properties.scroll-snap-type",
        r"scroll-snap-(?:type|align|stop)\s*:",
        &["smooth-scroll libraries", "custom scroll handlers"],
    ),
    css(
        ":has()",
        ":has() relational pseudo-class",
        "css.selectors.has",
        r":has\s*\(",
        &[":not() combinations", "JavaScript selectors"],
    ),
    css(
        "container-queries",
        "Container queries",
        "css.at-rules.container",
        r"@container\b",
        &["media queries", "ResizeObserver API"],
    ),
    css(
        "subgrid",
        "Subgrid",
        "css.properties.grid-template-columns.subgrid",
        r"grid-template-(?:columns|rows)\s*:[^;{}]*\bsubgrid\b",
        &["nested grids", "flexbox layouts"],
    ),
    css(
        "view-transitions",
        "View transitions (CSS)",
        "css.properties.view-transition-name",
        r"view-transition-name\s*:",
        &["CSS transitions", "FLIP technique"],
    ),
    css("@layer", "Cascade layers", "css.at-rules.layer", r"@layer\b", &[]),
    css(
        "color-mix()",
        "color-mix()",
        "css.types.color.color-mix",
        r"color-mix\s*\(",
        &["precomputed colors", "preprocessor mixins"],
    ),
    css(":is()", ":is() pseudo-class", "css.selectors.is", r":is\s*\(", &[]),
    css(":where()", ":where() pseudo-class", "css.selectors.where", r":where\s*\(", &[]),
    css(
        "aspect-ratio",
        "aspect-ratio",
        "css.properties.aspect-ratio",
        r"(?:^|[\s;{])aspect-ratio\s*:",
        &["padding-top ratio hack"],
    ),
    // Script
    script(
        "MutationObserver",
        "MutationObserver",
        "api.MutationObserver",
        r"\bnew\s+MutationObserver\b",
        false,
    ),
    script(
        "IntersectionObserver",
        "IntersectionObserver",
        "api.IntersectionObserver",
        r"\bnew\s+IntersectionObserver\b",
        false,
    ),
    script(
        "ResizeObserver",
        "ResizeObserver",
        "api.ResizeObserver",
        r"\bnew\s+ResizeObserver\b",
        false,
    ),
    script(
        "PerformanceObserver",
        "PerformanceObserver",
        "api.PerformanceObserver",
        r"\bnew\s+PerformanceObserver\b",
        false,
    ),
    script(
        "document.startViewTransition",
        "View transitions (script)",
        "api.Document.startViewTransition",
        r"\bdocument\.startViewTransition\b",
        false,
    ),
    script(
        "navigator.share",
        "Web Share API",
        "api.Navigator.share",
        r"\bnavigator\.share\s*\(",
        false,
    ),
    script(
        "navigator.clipboard",
        "Async Clipboard API",
        "api.Navigator.clipboard",
        r"\bnavigator\.clipboard\b",
        false,
    ),
    script(
        "WebGL2",
        "WebGL 2",
        "api.WebGL2RenderingContext",
        r#"getContext\s*\(\s*['"]webgl2['"]"#,
        false,
    ),
    script(
        "Web Animations API",
        "Element.animate()",
        "api.Element.animate",
        r"\.animate\s*\(\s*\[",
        false,
    ),
    script(
        "document.write",
        "document.write()",
        "api.Document.write",
        r"\bdocument\.write(?:ln)?\s*\(",
        true,
    ),
    script(
        "synchronous XHR",
        "Synchronous XMLHttpRequest",
        "api.XMLHttpRequest.open",
        r"\.open\s*\([^()]*,\s*false\s*\)",
        true,
    ),
    // HTML
    html("<dialog>", "<dialog> element", "html.elements.dialog", r"<dialog[\s>]", false),
    html("<details>", "<details> element", "html.elements.details", r"<details[\s>]", false),
    html(
        "[popover]",
        "popover attribute",
        "html.global_attributes.popover",
        r"<[a-z][a-z0-9-]*\b[^>]*\spopover(?:\s*=|[\s/>])",
        false,
    ),
    html(
        "AppCache",
        "Application cache manifest",
        "html.elements.html.manifest",
        r"<html\b[^>]*\smanifest\s*=",
        true,
    ),
];

/// Find a curated definition by identifier.
pub fn find(id: &str) -> Option<&'static CuratedFeature> {
    CURATED_FEATURES.iter().find(|f| f.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_curated_ids_unique() {
        let mut seen = HashSet::new();
        for feature in CURATED_FEATURES {
            assert!(seen.insert(feature.id), "duplicate curated id {}", feature.id);
        }
    }

    #[test]
    fn test_curated_patterns_compile() {
        for feature in CURATED_FEATURES {
            assert!(
                regex::Regex::new(feature.pattern).is_ok(),
                "pattern for {} does not compile",
                feature.id
            );
        }
    }

    #[test]
    fn test_deprecated_flags() {
        assert!(find("document.write").unwrap().deprecated);
        assert!(find("AppCache").unwrap().deprecated);
        assert!(!find(":has()").unwrap().deprecated);
        assert!(find("nonexistent").is_none());
    }
}
