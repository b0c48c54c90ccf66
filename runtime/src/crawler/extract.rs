//! Content extraction from rendered HTML.
//!
//! Parsing is synchronous and owns nothing across an await: the crawl loop
//! gets back plain strings, then fetches linked assets itself.

use super::{BlockSource, ContentBlock};
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use url::Url;

/// A CSS or script block that is either already in hand or still has to be
/// fetched from a URL.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Slot {
    Ready(ContentBlock),
    Linked(String),
}

/// Everything pulled out of one page's markup, in document order.
#[derive(Debug, Default)]
pub(crate) struct Extracted {
    pub css: Vec<Slot>,
    pub scripts: Vec<Slot>,
    /// Absolute HTTP(S) link targets, not yet filtered by origin.
    pub links: BTreeSet<String>,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// Script `type` values that do not hold executable script.
fn is_data_script(kind: Option<&str>) -> bool {
    kind.map(|t| {
        let t = t.to_ascii_lowercase();
        t.contains("json") || t.contains("template") || t.contains("x-shader")
    })
    .unwrap_or(false)
}

/// The document's first `<base href>`, resolved against the page URL.
fn document_base(document: &Html, page_url: &Url) -> Url {
    selector("base[href]")
        .and_then(|sel| {
            let href = document.select(&sel).next()?.value().attr("href")?;
            let base = page_url.join(href.trim()).ok()?;
            matches!(base.scheme(), "http" | "https").then_some(base)
        })
        .unwrap_or_else(|| page_url.clone())
}

/// Extract style blocks, style attributes, linked stylesheets, scripts and
/// anchors from `html`. URLs resolve against the document's `<base href>`
/// when it has one, otherwise against `page_url`.
pub(crate) fn extract(html: &str, page_url: &Url) -> Extracted {
    let document = Html::parse_document(html);
    let base = &document_base(&document, page_url);
    let mut out = Extracted::default();

    // <style> and stylesheet links interleave in document order
    if let Some(sel) = selector(r#"style, link[rel~="stylesheet"][href]"#) {
        for element in document.select(&sel) {
            let el = element.value();
            if el.name() == "style" {
                let text: String = element.text().collect();
                if !text.trim().is_empty() {
                    out.css.push(Slot::Ready(ContentBlock {
                        source: BlockSource::Inline,
                        text,
                    }));
                }
            } else if let Some(url) = el.attr("href").and_then(|h| resolve(base, h)) {
                out.css.push(Slot::Linked(url));
            }
        }
    }

    if let Some(sel) = selector("[style]") {
        for element in document.select(&sel) {
            if let Some(style) = element.value().attr("style") {
                if !style.trim().is_empty() {
                    out.css.push(Slot::Ready(ContentBlock {
                        source: BlockSource::Attribute,
                        text: style.to_string(),
                    }));
                }
            }
        }
    }

    if let Some(sel) = selector("script") {
        for element in document.select(&sel) {
            let el = element.value();
            if is_data_script(el.attr("type")) {
                continue;
            }
            if let Some(src) = el.attr("src") {
                if let Some(url) = resolve(base, src) {
                    out.scripts.push(Slot::Linked(url));
                }
                continue;
            }
            let text: String = element.text().collect();
            if !text.trim().is_empty() {
                out.scripts.push(Slot::Ready(ContentBlock {
                    source: BlockSource::Inline,
                    text,
                }));
            }
        }
    }

    if let Some(sel) = selector("a[href]") {
        for element in document.select(&sel) {
            if let Some(url) = element.value().attr("href").and_then(|h| resolve(base, h)) {
                out.links.insert(url);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://site.test/docs/").unwrap()
    }

    #[test]
    fn test_css_in_document_order() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/main.css">
            <style>.a { backdrop-filter: blur(4px) }</style>
            <link rel="preload stylesheet" href="theme.css">
            <link rel="icon" href="/favicon.ico">
            </head><body><div style="aspect-ratio: 1/1">x</div></body></html>"#;
        let out = extract(html, &base());
        assert_eq!(out.css.len(), 4);
        assert_eq!(out.css[0], Slot::Linked("https://site.test/main.css".into()));
        assert!(matches!(&out.css[1], Slot::Ready(b) if b.source == BlockSource::Inline));
        assert_eq!(out.css[2], Slot::Linked("https://site.test/docs/theme.css".into()));
        assert!(matches!(&out.css[3],
            Slot::Ready(b) if b.source == BlockSource::Attribute && b.text.contains("aspect-ratio")));
    }

    #[test]
    fn test_base_href_rebases_links_and_assets() {
        let html = r#"<html><head>
            <base href="/assets/v2/">
            <link rel="stylesheet" href="theme.css">
            <script src="app.js"></script>
            </head><body><a href="guide">Guide</a><a href="/top">Top</a></body></html>"#;
        let out = extract(html, &base());
        assert_eq!(out.css, vec![Slot::Linked("https://site.test/assets/v2/theme.css".into())]);
        assert_eq!(out.scripts, vec![Slot::Linked("https://site.test/assets/v2/app.js".into())]);
        assert!(out.links.contains("https://site.test/assets/v2/guide"));
        assert!(out.links.contains("https://site.test/top"));

        let unusable = r#"<base href="javascript:void(0)"><a href="page">p</a>"#;
        let out = extract(unusable, &base());
        assert!(out.links.contains("https://site.test/docs/page"));
    }

    #[test]
    fn test_scripts_skip_data_blocks() {
        let html = r#"<script src="/app.js"></script>
            <script>new ResizeObserver(() => {})</script>
            <script type="application/ld+json">{"@type":"Thing"}</script>
            <script type="module">import x from "./x.js"</script>"#;
        let out = extract(html, &base());
        assert_eq!(out.scripts.len(), 3);
        assert_eq!(out.scripts[0], Slot::Linked("https://site.test/app.js".into()));
        assert!(matches!(&out.scripts[1], Slot::Ready(b) if b.text.contains("ResizeObserver")));
    }

    #[test]
    fn test_links_resolved_and_filtered() {
        let html = r##"<a href="guide">g</a><a href="/about#team">a</a>
            <a href="#top">t</a><a href="javascript:void(0)">j</a>
            <a href="mailto:x@y.z">m</a><a href="https://other.test/">o</a>"##;
        let out = extract(html, &base());
        let links: Vec<&str> = out.links.iter().map(String::as_str).collect();
        assert_eq!(
            links,
            vec![
                "https://other.test/",
                "https://site.test/about#team",
                "https://site.test/docs/guide",
            ]
        );
    }

    #[test]
    fn test_garbage_html_yields_empty() {
        let out = extract("<<<not html>>>", &base());
        assert!(out.css.is_empty());
        assert!(out.scripts.is_empty());
        assert!(out.links.is_empty());
    }
}
