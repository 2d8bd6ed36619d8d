// src/links/mod.rs
// =============================================================================
// This module contains everything that turns raw references into crawlable
// URLs.
//
// Submodules:
// - normalize: canonical URLs and the crawl scope
// - extract: finds references in HTML and CSS
// =============================================================================

mod extract;
mod normalize;

pub use extract::{css_url_spans, extract_links, srcset_spans, LinkFilter, LinkKind, DEFAULT_PAGE_DENYLIST};
pub use normalize::Scope;
