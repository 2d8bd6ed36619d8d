// src/mirror/rewrite.rs
// =============================================================================
// Second pass over the mirrored HTML: absolute links to the mirrored site are
// cut down to path-only references so the tree works from any host.
//
//   href="https://example.test/contacts/"     ->  href="/contacts/"
//   src="//example.test/logo.png?v=2"         ->  src="/logo.png?v=2"
//   action="https://example.test?s=1#results" ->  action="/?s=1#results"
//
// What is touched:
//   a[href]  img[src|data-src]  source[src|data-src]  link[href]
//   script[src]  form[action]        the whole value
//   img[srcset]  source[srcset]      each candidate URL
//   [style]  <style> bodies          each url(...) / @import target
//
// The document is tokenized (see markup.rs) and only those byte ranges are
// replaced, so text, comments and scripts that happen to mention the site URL
// stay as they are.
//
// Rewriting is idempotent: after one pass no targeted attribute starts with
// the origin any more, so a second pass finds nothing to do.
// =============================================================================

use crate::error::MirrorError;
use crate::links::{css_url_spans, srcset_spans, Scope};
use crate::mirror::markup::{tokenize, Node};
use crate::mirror::store::write_atomic;
use serde::Serialize;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use url::Url;
use walkdir::WalkDir;

// How an attribute value holds its references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueShape {
    Url,
    Srcset,
    Css,
}

fn value_shape(tag: &str, attribute: &str) -> Option<ValueShape> {
    match (tag, attribute) {
        ("a", "href")
        | ("img", "src")
        | ("img", "data-src")
        | ("source", "src")
        | ("source", "data-src")
        | ("link", "href")
        | ("script", "src")
        | ("form", "action") => Some(ValueShape::Url),
        ("img", "srcset") | ("source", "srcset") => Some(ValueShape::Srcset),
        (_, "style") => Some(ValueShape::Css),
        _ => None,
    }
}

/// Strips the site origin from absolute references.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    scope: Scope,
}

impl RewriteRule {
    pub fn new(scope: Scope) -> Self {
        RewriteRule { scope }
    }

    pub fn origin(&self) -> String {
        self.scope.origin()
    }

    /// Returns the local replacement for `value`, or None if the value is not
    /// an absolute reference to the site.
    pub fn apply(&self, value: &str) -> Option<String> {
        let value = value.trim();
        let (scheme, after_scheme) = split_scheme(value)?;
        let scheme: &str = match scheme {
            Some(s) => s,
            None => self.scope.scheme(),
        };

        let authority_end = after_scheme
            .find(|c: char| matches!(c, '/' | '?' | '#'))
            .unwrap_or(after_scheme.len());
        let (authority, rest) = after_scheme.split_at(authority_end);

        let origin = Url::parse(&format!("{scheme}://{authority}/")).ok()?;
        if !self.scope.contains(&origin) {
            return None;
        }

        // "//double//slash" would read as a host, so keep exactly one
        Some(format!("/{}", rest.trim_start_matches('/')))
    }
}

// "https://host/x" -> (Some("https"), "host/x"), "//host/x" -> (None, "host/x")
fn split_scheme(value: &str) -> Option<(Option<&'static str>, &str)> {
    if let Some(rest) = value.strip_prefix("//") {
        return Some((None, rest));
    }
    for scheme in ["https", "http"] {
        let prefix_len = scheme.len() + 3;
        let head = value.get(..scheme.len());
        let separator = value.get(scheme.len()..prefix_len);
        if head.is_some_and(|h| h.eq_ignore_ascii_case(scheme)) && separator == Some("://") {
            return Some((Some(scheme), &value[prefix_len..]));
        }
    }
    None
}

/// Rewrites one document. Returns the new markup and the number of
/// references that changed.
pub fn rewrite_html(html: &str, rule: &RewriteRule) -> (String, usize) {
    let mut edits = Vec::new();
    let mut in_style_block = false;

    for node in tokenize(html) {
        match &node {
            Node::Tag { name, closing, attributes, .. } => {
                in_style_block = name == "style" && !closing;
                if *closing {
                    continue;
                }
                for attr in attributes {
                    let Some(range) = attr.value.clone() else {
                        continue;
                    };
                    match value_shape(name, &attr.name) {
                        Some(ValueShape::Url) => push_edit(&mut edits, html, range, rule),
                        Some(ValueShape::Srcset) => {
                            for span in srcset_spans(&html[range.clone()]) {
                                push_edit(&mut edits, html, offset(&span, range.start), rule);
                            }
                        }
                        Some(ValueShape::Css) => css_edits(&mut edits, html, range, rule),
                        None => {}
                    }
                }
            }
            Node::RawText(_) if in_style_block => css_edits(&mut edits, html, node.span(), rule),
            _ => {}
        }
    }

    if edits.is_empty() {
        return (html.to_string(), 0);
    }

    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    for (range, replacement) in &edits {
        out.push_str(&html[cursor..range.start]);
        out.push_str(replacement);
        cursor = range.end;
    }
    out.push_str(&html[cursor..]);

    (out, edits.len())
}

fn push_edit(edits: &mut Vec<(Range<usize>, String)>, html: &str, range: Range<usize>, rule: &RewriteRule) {
    if let Some(replacement) = rule.apply(&html[range.clone()]) {
        edits.push((range, replacement));
    }
}

fn css_edits(edits: &mut Vec<(Range<usize>, String)>, html: &str, range: Range<usize>, rule: &RewriteRule) {
    for span in css_url_spans(&html[range.clone()]) {
        push_edit(edits, html, offset(&span, range.start), rule);
    }
}

fn offset(span: &Range<usize>, by: usize) -> Range<usize> {
    span.start + by..span.end + by
}

/// Outcome of a rewrite pass over many files.
#[derive(Debug, Default, Serialize)]
pub struct RewriteSummary {
    pub files_scanned: usize,
    pub files_changed: usize,
    pub references_rewritten: usize,
    pub failures: Vec<RewriteFailure>,
}

#[derive(Debug, Serialize)]
pub struct RewriteFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Rewrites a single file in place. Returns the number of changed references.
pub fn rewrite_file(path: &Path, rule: &RewriteRule) -> Result<usize, MirrorError> {
    let bytes = std::fs::read(path).map_err(|e| MirrorError::fs(path, e))?;
    let html = String::from_utf8(bytes).map_err(|e| {
        MirrorError::fs(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })?;

    let (rewritten, count) = rewrite_html(&html, rule);
    if count > 0 {
        write_atomic(path, rewritten.as_bytes())?;
    }
    Ok(count)
}

/// Rewrites every given file. A file that fails is recorded and skipped.
pub fn rewrite_files<I>(paths: I, rule: &RewriteRule) -> RewriteSummary
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut summary = RewriteSummary::default();

    for path in paths {
        summary.files_scanned += 1;
        match rewrite_file(&path, rule) {
            Ok(0) => {}
            Ok(count) => {
                debug!("rewrote {} reference(s) in {}", count, path.display());
                summary.files_changed += 1;
                summary.references_rewritten += count;
            }
            Err(e) => {
                warn!("{}", e);
                summary.failures.push(RewriteFailure {
                    path,
                    error: e.to_string(),
                });
            }
        }
    }

    summary
}

/// Rewrites every .html/.htm file under `root`.
pub fn rewrite_tree(root: &Path, rule: &RewriteRule) -> RewriteSummary {
    rewrite_files(html_files(root), rule)
}

/// All .html/.htm files under `root`, in a stable order.
pub fn html_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> RewriteRule {
        RewriteRule::new(Scope::parse("https://example.test/").unwrap())
    }

    #[test]
    fn test_apply() {
        let r = rule();
        assert_eq!(r.apply("https://example.test/contacts/").as_deref(), Some("/contacts/"));
        assert_eq!(r.apply("http://example.test/a.css?ver=1").as_deref(), Some("/a.css?ver=1"));
        assert_eq!(r.apply("//example.test/logo.png").as_deref(), Some("/logo.png"));
        assert_eq!(r.apply("HTTPS://EXAMPLE.TEST").as_deref(), Some("/"));
        assert_eq!(r.apply("https://example.test?s=1#res").as_deref(), Some("/?s=1#res"));
        assert_eq!(r.apply("https://example.test/#top").as_deref(), Some("/#top"));

        assert_eq!(r.apply("/contacts/"), None);
        assert_eq!(r.apply("https://other.test/x"), None);
        assert_eq!(r.apply("https://example.test.evil.test/x"), None);
        assert_eq!(r.apply("https://example.test:8443/x"), None);
        assert_eq!(r.apply("mailto:info@example.test"), None);
    }

    #[test]
    fn test_contacts_link_becomes_path_only() {
        let html = r#"<a href="https://example.test/contacts/">Контакты</a>"#;
        let (out, count) = rewrite_html(html, &rule());
        assert_eq!(out, r#"<a href="/contacts/">Контакты</a>"#);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_only_targeted_attributes_change() {
        let html = concat!(
            r#"<link rel="stylesheet" href='https://example.test/css/main.css?ver=3'>"#,
            r#"<meta property="og:url" content="https://example.test/">"#,
            r#"<script src=https://example.test/js/app.js></script>"#,
            r#"<p>Visit https://example.test/ today</p>"#,
            r#"<img src="https://example.test/logo.png" data-full="https://example.test/big.png">"#,
            r#"<form method="post" action="https://example.test/spasibo/"></form>"#,
            r#"<script>var u = "<a href='https://example.test/x'>";</script>"#,
        );
        let (out, count) = rewrite_html(html, &rule());
        let expected = concat!(
            r#"<link rel="stylesheet" href='/css/main.css?ver=3'>"#,
            r#"<meta property="og:url" content="https://example.test/">"#,
            r#"<script src=/js/app.js></script>"#,
            r#"<p>Visit https://example.test/ today</p>"#,
            r#"<img src="/logo.png" data-full="https://example.test/big.png">"#,
            r#"<form method="post" action="/spasibo/"></form>"#,
            r#"<script>var u = "<a href='https://example.test/x'>";</script>"#,
        );
        assert_eq!(out, expected);
        assert_eq!(count, 4);
    }

    #[test]
    fn test_srcset_lazy_and_css_references() {
        let html = concat!(
            r#"<img src="https://example.test/a.jpg" srcset="https://example.test/a.jpg 1x, https://example.test/a-2x.jpg 2x" data-src="https://example.test/lazy.jpg">"#,
            r#"<picture><source srcset="//example.test/b.webp 480w,https://cdn.other.test/c.webp 800w"></picture>"#,
            r#"<div style="background: url('https://example.test/bg.jpg') no-repeat"></div>"#,
            r#"<style>.hero { background: url(https://example.test/hero.png) }</style>"#,
        );
        let (out, count) = rewrite_html(html, &rule());
        let expected = concat!(
            r#"<img src="/a.jpg" srcset="/a.jpg 1x, /a-2x.jpg 2x" data-src="/lazy.jpg">"#,
            r#"<picture><source srcset="/b.webp 480w,https://cdn.other.test/c.webp 800w"></picture>"#,
            r#"<div style="background: url('/bg.jpg') no-repeat"></div>"#,
            r#"<style>.hero { background: url(/hero.png) }</style>"#,
        );
        assert_eq!(out, expected);
        assert_eq!(count, 7);

        let (again, count) = rewrite_html(&out, &rule());
        assert_eq!(again, out);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let html = r#"<!doctype html><a href="//example.test//double">x</a>
            <A HREF="https://example.test/catalog/?page=2#list">y</A>
            <img src="https://cdn.other.test/lib.png">"#;
        let (once, _) = rewrite_html(html, &rule());
        let (twice, count) = rewrite_html(&once, &rule());
        assert_eq!(once, twice);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_rewrite_tree_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("catalog/index.html");
        std::fs::create_dir_all(page.parent().unwrap()).unwrap();
        std::fs::write(&page, r#"<a href="https://example.test/contacts/">c</a>"#).unwrap();
        std::fs::write(dir.path().join("style.css"), "a{background:url(https://example.test/x.png)}").unwrap();

        let summary = rewrite_tree(dir.path(), &rule());
        assert_eq!(summary.files_scanned, 1);
        assert_eq!(summary.files_changed, 1);
        assert_eq!(summary.references_rewritten, 1);
        assert_eq!(std::fs::read_to_string(&page).unwrap(), r#"<a href="/contacts/">c</a>"#);

        let again = rewrite_tree(dir.path(), &rule());
        assert_eq!(again.files_changed, 0);
    }
}
