// src/mirror/path.rs
// =============================================================================
// Maps a canonical URL to the file it is stored in.
//
// The mapping is a pure function of the URL path. It never looks at the
// network or the disk, so the crawl and the later rewrite/check passes always
// agree on where a resource lives, run after run.
//
// Rules:
//   /                    -> <root>/index.html
//   /about/              -> <root>/about/index.html
//   /about               -> <root>/about/index.html   (no extension = page)
//   /css/main.css?ver=2  -> <root>/css/main.css       (query ignored)
//
// Segments are percent-decoded so that non-ASCII slugs become readable file
// names. A decoded segment that could climb out of the root ("..", ".",
// anything with a separator or NUL) is rejected instead of written.
// =============================================================================

use crate::error::MirrorError;
use std::path::{Path, PathBuf};
use url::Url;

/// Default document name for directory-shaped URLs.
pub const DEFAULT_DOCUMENT: &str = "index.html";

#[derive(Debug, Clone)]
pub struct PathMapper {
    root: PathBuf,
    default_document: String,
}

impl PathMapper {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        PathMapper {
            root: root.into(),
            default_document: DEFAULT_DOCUMENT.to_string(),
        }
    }

    pub fn with_default_document(mut self, name: impl Into<String>) -> Self {
        self.default_document = name.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path for a canonical URL.
    pub fn map(&self, url: &Url) -> Result<PathBuf, MirrorError> {
        self.map_path(url.path())
            .map_err(|reason| MirrorError::invalid(url.as_str(), reason))
    }

    /// Local path for a raw (still percent-encoded) URL path.
    pub fn map_path(&self, url_path: &str) -> Result<PathBuf, String> {
        let directory_shaped = url_path.is_empty() || url_path.ends_with('/');

        let mut segments = Vec::new();
        for raw in url_path.split('/').filter(|s| !s.is_empty()) {
            let decoded = urlencoding::decode(raw)
                .map_err(|_| format!("segment '{raw}' is not valid UTF-8"))?;
            check_segment(&decoded)?;
            segments.push(decoded.into_owned());
        }

        let mut path = self.root.clone();
        for segment in &segments {
            path.push(segment);
        }

        let file_shaped = !directory_shaped
            && segments.last().map(|s| s.contains('.')).unwrap_or(false);
        if !file_shaped {
            path.push(&self.default_document);
        }

        Ok(path)
    }
}

fn check_segment(segment: &str) -> Result<(), String> {
    if segment == "." || segment == ".." {
        return Err(format!("traversal segment '{segment}'"));
    }
    if segment.contains(|c: char| matches!(c, '/' | '\\' | '\0')) {
        return Err(format!("segment '{segment}' contains a path separator"));
    }
    Ok(())
}
