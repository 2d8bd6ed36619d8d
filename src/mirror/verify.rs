// src/mirror/verify.rs
// =============================================================================
// Checks that a mirrored tree is self-contained.
//
// Every local reference (path-only or relative) found in href/src/action
// attributes of the mirrored HTML is resolved against the page's own location,
// mapped with the same PathMapper the crawl used, and looked up on disk.
// Anything that does not exist is reported.
//
// Absolute URLs, mailto:, tel:, javascript:, data: and in-page fragments are
// skipped: they were never meant to resolve locally.
// =============================================================================

use crate::mirror::path::PathMapper;
use crate::mirror::rewrite::html_files;
use scraper::{Html, Selector};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;
use url::Url;

// Stand-in host used to resolve relative references between local files
const LOCAL_HOST: &str = "http://mirror.invalid/";

#[derive(Debug, Clone, Serialize)]
pub struct MissingReference {
    /// Page the reference was found in
    pub page: PathBuf,
    /// The reference exactly as written
    pub reference: String,
    /// Where the file was expected
    pub expected: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize)]
pub struct VerifyReport {
    pub pages_checked: usize,
    pub references_checked: usize,
    pub missing: Vec<MissingReference>,
}

impl VerifyReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

fn reference_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| {
        Selector::parse("a[href], link[href], img[src], script[src], source[src], form[action]")
            .expect("static selector is valid")
    })
}

/// Verifies every HTML page under the mapper's root.
pub fn verify_tree(mapper: &PathMapper) -> VerifyReport {
    let mut report = VerifyReport::default();

    for page in html_files(mapper.root()) {
        let html = match std::fs::read(&page) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                debug!("skipping unreadable {}: {}", page.display(), e);
                continue;
            }
        };
        let Some(base) = local_url(mapper.root(), &page) else {
            continue;
        };

        report.pages_checked += 1;
        check_page(&html, &base, &page, mapper, &mut report);
    }

    report
}

fn check_page(html: &str, base: &Url, page: &Path, mapper: &PathMapper, report: &mut VerifyReport) {
    let document = Html::parse_document(html);

    for el in document.select(reference_selector()) {
        let value = ["href", "src", "action"]
            .iter()
            .find_map(|attr| el.value().attr(attr))
            .unwrap_or_default()
            .trim();

        if value.is_empty() || value.starts_with('#') {
            continue;
        }
        let Ok(resolved) = base.join(value) else {
            continue;
        };
        // absolute references and other schemes leave the local host
        if resolved.host_str() != base.host_str() || resolved.scheme() != base.scheme() {
            continue;
        }

        report.references_checked += 1;
        let expected = mapper.map_path(resolved.path()).ok();
        let exists = expected.as_ref().map(|p| p.is_file()).unwrap_or(false);
        if !exists {
            report.missing.push(MissingReference {
                page: page.to_path_buf(),
                reference: value.to_string(),
                expected,
            });
        }
    }
}

// "root/catalog/index.html" -> http://mirror.invalid/catalog/index.html
fn local_url(root: &Path, file: &Path) -> Option<Url> {
    let relative = file.strip_prefix(root).ok()?;
    let mut url = Url::parse(LOCAL_HOST).ok()?;
    {
        let mut segments = url.path_segments_mut().ok()?;
        segments.clear();
        for component in relative.components() {
            segments.push(&component.as_os_str().to_string_lossy());
        }
    }
    Some(url)
}
