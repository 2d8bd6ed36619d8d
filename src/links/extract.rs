// src/links/extract.rs
// =============================================================================
// This module finds the URLs a fetched document refers to.
//
// HTML is parsed with the `scraper` crate (html5ever underneath) and queried
// with CSS selectors. Stylesheets are plain text, so their url(...) and
// @import references are pulled out with a regex.
//
// Every reference goes through the same gate (`LinkFilter::admit`):
// - canonicalize it against the document's own URL
// - drop it if it is not on the crawl host
// - drop it if it is a *page* link under a denylisted prefix
//
// Assets are never denylisted: /wp-content/uploads/photo.jpg is still wanted
// as a file even though we never crawl /wp-content/uploads/ as a page.
// =============================================================================

use crate::links::Scope;
use crate::mirror::ContentCategory;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::HashSet;
use std::ops::Range;
use std::sync::OnceLock;
use tracing::trace;
use url::Url;

/// Path prefixes that are never crawled as pages.
pub const DEFAULT_PAGE_DENYLIST: &[&str] = &[
    "/wp-admin/",
    "/wp-includes/",
    "/wp-json/",
    "/wp-login.php",
    "/wp-content/uploads/",
    "/xmlrpc.php",
    "/feed/",
    "/comments/feed/",
];

/// How a URL was referenced. Only decides whether the denylist applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Anchors, form actions, non-asset <link>s
    Page,
    /// Images, stylesheets, scripts, CSS url(...) targets
    Asset,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiscoveredLink {
    pub url: Url,
    pub kind: LinkKind,
}

/// Scope plus page denylist.
#[derive(Debug, Clone)]
pub struct LinkFilter {
    scope: Scope,
    page_denylist: Vec<String>,
}

impl LinkFilter {
    pub fn new(scope: Scope, page_denylist: Vec<String>) -> Self {
        LinkFilter { scope, page_denylist }
    }

    pub fn is_denied_page(&self, url: &Url) -> bool {
        let path = url.path();
        self.page_denylist.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Canonicalizes a raw reference and applies the scope rules.
    /// Returns None for anything that should not be crawled.
    pub fn admit(&self, reference: &str, base: &Url, kind: LinkKind) -> Option<DiscoveredLink> {
        let url = match self.scope.canonicalize(reference, base) {
            Ok(url) => url,
            Err(e) => {
                trace!("dropping reference: {}", e);
                return None;
            }
        };

        if !self.scope.contains(&url) {
            return None;
        }
        if kind == LinkKind::Page && self.is_denied_page(&url) {
            trace!("denylisted page: {}", url);
            return None;
        }

        Some(DiscoveredLink { url, kind })
    }
}

// Collects links, keeping only the first sighting of each URL.
// First-seen order keeps the crawl order deterministic.
#[derive(Default)]
struct LinkSet {
    seen: HashSet<Url>,
    links: Vec<DiscoveredLink>,
}

impl LinkSet {
    fn push(&mut self, link: Option<DiscoveredLink>) {
        if let Some(link) = link {
            if self.seen.insert(link.url.clone()) {
                self.links.push(link);
            }
        }
    }
}

/// Extracts every in-scope URL referenced by a document.
///
/// `doc_url` is the canonical URL of the document itself and is the base for
/// relative references. Only HTML and stylesheets are mined; other categories
/// yield nothing.
pub fn extract_links(
    content: &str,
    category: ContentCategory,
    doc_url: &Url,
    filter: &LinkFilter,
) -> Vec<DiscoveredLink> {
    let mut set = LinkSet::default();
    match category {
        ContentCategory::Html => extract_from_html(content, doc_url, filter, &mut set),
        ContentCategory::Stylesheet => extract_from_css(content, doc_url, filter, &mut set),
        _ => {}
    }
    set.links
}

struct Selectors {
    anchors: Selector,
    forms: Selector,
    images: Selector,
    sources: Selector,
    links: Selector,
    scripts: Selector,
    styled: Selector,
    style_blocks: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        // These selectors are constants, so a parse failure is a programmer error
        let parse = |css: &str| Selector::parse(css).expect("static selector is valid");
        Selectors {
            anchors: parse("a[href]"),
            forms: parse("form[action]"),
            images: parse("img"),
            sources: parse("source[srcset], source[src]"),
            links: parse("link[href]"),
            scripts: parse("script[src]"),
            styled: parse("[style]"),
            style_blocks: parse("style"),
        }
    })
}

fn extract_from_html(html: &str, base: &Url, filter: &LinkFilter, set: &mut LinkSet) {
    let document = Html::parse_document(html);
    let s = selectors();

    // A <base href> changes what relative links resolve against
    let base = base_href(&document)
        .and_then(|href| base.join(href).ok())
        .unwrap_or_else(|| base.clone());
    let base = &base;

    for el in document.select(&s.anchors) {
        set.push(attr_link(el, "href", base, filter, LinkKind::Page));
    }
    for el in document.select(&s.forms) {
        set.push(attr_link(el, "action", base, filter, LinkKind::Page));
    }
    for el in document.select(&s.images).chain(document.select(&s.sources)) {
        set.push(attr_link(el, "src", base, filter, LinkKind::Asset));
        // lazy-loading themes keep the real image in data-src
        set.push(attr_link(el, "data-src", base, filter, LinkKind::Asset));
        if let Some(srcset) = el.value().attr("srcset") {
            for span in srcset_spans(srcset) {
                set.push(filter.admit(&srcset[span], base, LinkKind::Asset));
            }
        }
    }
    for el in document.select(&s.links) {
        let kind = if is_asset_link(el) {
            LinkKind::Asset
        } else {
            LinkKind::Page
        };
        set.push(attr_link(el, "href", base, filter, kind));
    }
    for el in document.select(&s.scripts) {
        set.push(attr_link(el, "src", base, filter, LinkKind::Asset));
    }
    for el in document.select(&s.styled) {
        if let Some(style) = el.value().attr("style") {
            extract_from_css(style, base, filter, set);
        }
    }
    for el in document.select(&s.style_blocks) {
        let css: String = el.text().collect();
        extract_from_css(&css, base, filter, set);
    }
}

fn extract_from_css(css: &str, base: &Url, filter: &LinkFilter, set: &mut LinkSet) {
    for reference in css_urls(css) {
        set.push(filter.admit(reference, base, LinkKind::Asset));
    }
}

fn attr_link(
    el: ElementRef<'_>,
    attr: &str,
    base: &Url,
    filter: &LinkFilter,
    kind: LinkKind,
) -> Option<DiscoveredLink> {
    el.value()
        .attr(attr)
        .and_then(|value| filter.admit(value, base, kind))
}

fn base_href(document: &Html) -> Option<&str> {
    static BASE: OnceLock<Selector> = OnceLock::new();
    let selector = BASE.get_or_init(|| Selector::parse("base[href]").expect("static selector is valid"));
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("href"))
}

// <link rel="stylesheet|icon|preload|..."> is an asset; rel="canonical",
// "alternate", "shortlink" and friends point at pages.
fn is_asset_link(el: ElementRef<'_>) -> bool {
    let rel = el.value().attr("rel").unwrap_or_default().to_ascii_lowercase();
    rel.split_whitespace().any(|r| {
        matches!(
            r,
            "stylesheet" | "icon" | "apple-touch-icon" | "preload" | "prefetch" | "manifest" | "mask-icon"
        )
    })
}

/// Raw url(...) and @import targets in a piece of CSS, in source order.
pub fn css_urls(css: &str) -> Vec<&str> {
    css_url_spans(css).into_iter().map(|span| &css[span]).collect()
}

/// Byte ranges of the url(...) and @import targets in `css`, quotes and
/// surrounding whitespace excluded.
pub fn css_url_spans(css: &str) -> Vec<Range<usize>> {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    let re = URL_RE.get_or_init(|| {
        Regex::new(
            r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]*))\s*\)|@import\s+(?:"([^"]*)"|'([^']*)')"#,
        )
        .expect("static regex is valid")
    });

    re.captures_iter(css)
        .filter_map(|caps| caps.iter().skip(1).flatten().next())
        .map(|m| trimmed(css, m.range()))
        .filter(|span| !span.is_empty())
        .collect()
}

/// Byte ranges of the candidate URLs in a srcset value
/// ("a.jpg 1x, b.jpg 2x" -> the "a.jpg" and "b.jpg" ranges).
pub fn srcset_spans(srcset: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut offset = 0;
    for candidate in srcset.split(',') {
        let rest = candidate.trim_start();
        let start = offset + (candidate.len() - rest.len());
        let len = rest.find(char::is_whitespace).unwrap_or(rest.len());
        if len > 0 {
            spans.push(start..start + len);
        }
        offset += candidate.len() + 1;
    }
    spans
}

fn trimmed(text: &str, span: Range<usize>) -> Range<usize> {
    let slice = &text[span.clone()];
    let start = span.start + (slice.len() - slice.trim_start().len());
    let end = span.end - (slice.len() - slice.trim_end().len());
    start..end.max(start)
}
