// src/links/normalize.rs
// =============================================================================
// URL canonicalization and crawl scope.
//
// The canonical form of a URL is the de-duplication key used everywhere:
// the frontier, the visited-set, and the path mapper all see the same string
// for two references that point at the same resource.
//
// Canonicalization, in order:
// 1. Scheme-relative references (//host/path) take the base's scheme
// 2. Relative references are resolved against the base (dot segments go away)
// 3. The fragment is dropped
// 4. The query string is kept untouched
// 5. Runs of "/" in the path collapse to a single "/"
//
// On top of that, any URL on the scope host is forced to the scope's scheme
// and port, so http:// and https:// links to the same page meet in one key.
// =============================================================================

use crate::error::MirrorError;
use url::Url;

/// The single origin a crawl is allowed to touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    origin: Url,
}

impl Scope {
    /// Builds the scope from the start URL of a crawl.
    pub fn new(start: &Url) -> Result<Self, MirrorError> {
        if !is_http(start) {
            return Err(MirrorError::invalid(start.as_str(), "start URL must be http or https"));
        }
        if start.host_str().is_none() {
            return Err(MirrorError::invalid(start.as_str(), "start URL has no host"));
        }

        let mut origin = start.clone();
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);
        Ok(Scope { origin })
    }

    pub fn parse(start: &str) -> Result<Self, MirrorError> {
        let url = Url::parse(start).map_err(|e| MirrorError::invalid(start, e.to_string()))?;
        Scope::new(&url)
    }

    pub fn host(&self) -> &str {
        self.origin.host_str().unwrap_or_default()
    }

    pub fn scheme(&self) -> &str {
        self.origin.scheme()
    }

    /// "https://example.test" or "http://127.0.0.1:8080", no trailing slash.
    pub fn origin(&self) -> String {
        self.origin.origin().ascii_serialization()
    }

    /// Same host and same effective port. The scheme is ignored here because
    /// canonicalization forces it anyway.
    pub fn contains(&self, url: &Url) -> bool {
        is_http(url)
            && url.host_str().map(|h| h.eq_ignore_ascii_case(self.host())) == Some(true)
            && url.port() == self.origin.port()
    }

    /// Resolves `reference` against `base` and returns the canonical URL.
    ///
    /// Fails with `InvalidReference` for empty or fragment-only references,
    /// unparseable input, and anything that is not http(s).
    pub fn canonicalize(&self, reference: &str, base: &Url) -> Result<Url, MirrorError> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(MirrorError::invalid(reference, "empty reference"));
        }
        if trimmed.starts_with('#') {
            return Err(MirrorError::invalid(reference, "fragment-only reference"));
        }

        let mut url = base
            .join(trimmed)
            .map_err(|e| MirrorError::invalid(reference, e.to_string()))?;

        if !is_http(&url) {
            return Err(MirrorError::invalid(
                reference,
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if url.host_str().is_none() {
            return Err(MirrorError::invalid(reference, "no host"));
        }

        url.set_fragment(None);

        if url.path().contains("//") {
            let collapsed = collapse_slashes(url.path());
            url.set_path(&collapsed);
        }

        if self.contains(&url) && url.scheme() != self.scheme() {
            // http <-> https is always allowed by the url crate
            let _ = url.set_scheme(self.origin.scheme());
            let _ = url.set_port(self.origin.port());
        }

        Ok(url)
    }

    /// Canonical form of an absolute URL (the start URL, or a URL read back
    /// from somewhere that is already absolute).
    pub fn canonicalize_absolute(&self, url: &str) -> Result<Url, MirrorError> {
        self.canonicalize(url, &self.origin)
    }
}

fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !previous_slash {
                out.push(c);
            }
            previous_slash = true;
        } else {
            out.push(c);
            previous_slash = false;
        }
    }
    out
}
