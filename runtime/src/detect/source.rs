//! Source-tree adapter: turns a directory of front-end sources into
//! page-shaped content so static scans share the detector with live crawls.
//!
//! Each file becomes one [`CrawlResult`] whose `url` is the path relative to
//! the scanned root. Stylesheets fill `css`, scripts fill `scripts`, and
//! markup-bearing files (HTML, single-file components, JSX) fill `html` plus
//! whatever `<style>`/`<script>` blocks they embed.

use crate::crawler::extract::{extract, Slot};
use crate::crawler::{BlockSource, ContentBlock, CrawlResult};
use crate::error::{EngineError, EngineResult};
use std::path::{Path, PathBuf};
use url::Url;

/// Files larger than this are skipped (generated bundles, vendored dumps).
const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &["node_modules", "target", "dist", "build", "coverage", "vendor"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Stylesheet,
    Script,
    /// Script that may also contain markup.
    Jsx,
    Markup,
}

fn classify(path: &Path) -> Option<SourceKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "css" | "scss" | "sass" | "less" => Some(SourceKind::Stylesheet),
        "js" | "mjs" | "cjs" | "ts" => Some(SourceKind::Script),
        "jsx" | "tsx" => Some(SourceKind::Jsx),
        "html" | "htm" | "vue" | "svelte" => Some(SourceKind::Markup),
        _ => None,
    }
}

/// Recursively gather recognised files. Unreadable directories and entries
/// are logged and skipped.
fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), "directory skipped: {e}");
            return;
        }
    };
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "entry skipped: {e}");
                continue;
            }
        };
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Ok(file_type) = entry.file_type() else {
            tracing::warn!(path = %path.display(), "entry skipped: unknown file type");
            continue;
        };
        if file_type.is_dir() {
            if name.starts_with('.') || SKIP_DIRS.contains(&name.as_ref()) {
                continue;
            }
            collect_files(&path, out);
        } else if file_type.is_file() && classify(&path).is_some() {
            out.push(path);
        }
    }
}

/// Embedded blocks of a markup file; linked assets are not followed.
fn embedded(slots: Vec<Slot>, path: &str) -> Vec<ContentBlock> {
    slots
        .into_iter()
        .filter_map(|slot| match slot {
            Slot::Ready(block) => Some(ContentBlock {
                source: match block.source {
                    BlockSource::Inline => BlockSource::File {
                        path: path.to_string(),
                    },
                    other => other,
                },
                text: block.text,
            }),
            Slot::Linked(_) => None,
        })
        .collect()
}

/// Build page-shaped content for one file.
pub fn load_file(root: &Path, path: &Path) -> EngineResult<Option<CrawlResult>> {
    let Some(kind) = classify(path) else {
        return Ok(None);
    };
    let meta = std::fs::metadata(path)?;
    if meta.len() > MAX_FILE_SIZE {
        tracing::debug!(path = %path.display(), "skipping oversized source file");
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    let Ok(text) = String::from_utf8(bytes) else {
        tracing::debug!(path = %path.display(), "skipping non-UTF-8 source file");
        return Ok(None);
    };

    let rel = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");
    let file_block = || ContentBlock {
        source: BlockSource::File { path: rel.clone() },
        text: text.clone(),
    };

    let mut page = CrawlResult {
        origin: root.display().to_string(),
        url: rel.clone(),
        ..CrawlResult::default()
    };
    match kind {
        SourceKind::Stylesheet => page.css.push(file_block()),
        SourceKind::Script => page.scripts.push(file_block()),
        SourceKind::Jsx => {
            page.scripts.push(file_block());
            page.html = text.clone();
        }
        SourceKind::Markup => {
            let base = Url::parse("file:///").map_err(|e| EngineError::InvalidInput(e.to_string()))?;
            let extracted = extract(&text, &base);
            page.css = embedded(extracted.css, &rel);
            page.scripts = embedded(extracted.scripts, &rel);
            page.html = text;
        }
    }
    Ok(Some(page))
}

/// Walk `root` and load every recognised source file, in path order.
///
/// `root` may also be a single file.
pub fn load_source_tree(root: &Path) -> EngineResult<Vec<CrawlResult>> {
    if !root.exists() {
        return Err(EngineError::not_found(format!("source path {}", root.display())));
    }
    if root.is_file() {
        let parent = root.parent().unwrap_or(root);
        return Ok(load_file(parent, root)?.into_iter().collect());
    }

    let mut files = Vec::new();
    collect_files(root, &mut files);
    files.sort();

    let mut pages = Vec::with_capacity(files.len());
    for path in files {
        match load_file(root, &path) {
            Ok(Some(page)) => pages.push(page),
            Ok(None) => {}
            Err(e) => tracing::warn!(path = %path.display(), "source file skipped: {e}"),
        }
    }
    tracing::info!(root = %root.display(), files = pages.len(), "loaded source tree");
    Ok(pages)
}
