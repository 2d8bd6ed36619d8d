// src/mirror/store.rs
// =============================================================================
// Writing fetched resources to disk.
//
// Every file goes through `write_atomic`: the bytes land in a temporary file
// in the same directory, which is then renamed over the destination. A crash
// or Ctrl-C mid-write leaves either the old file or the new one, never half
// of each.
// =============================================================================

use crate::error::MirrorError;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use url::Url;

/// What kind of resource a file holds. Decides whether links are mined
/// from it and whether the rewrite pass touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    Html,
    Stylesheet,
    Script,
    Image,
    Other,
}

impl ContentCategory {
    /// Classifies a response by its Content-Type header, falling back to the
    /// URL's file extension when the header is missing or generic.
    pub fn classify(content_type: Option<&str>, url: &Url) -> Self {
        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        match mime.as_str() {
            "text/html" | "application/xhtml+xml" => ContentCategory::Html,
            "text/css" => ContentCategory::Stylesheet,
            "application/javascript" | "text/javascript" | "application/x-javascript" => {
                ContentCategory::Script
            }
            m if m.starts_with("image/") => ContentCategory::Image,
            _ => Self::from_extension(url),
        }
    }

    pub fn from_extension(url: &Url) -> Self {
        let last = url.path().rsplit('/').next().unwrap_or_default();
        let ext = match last.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return ContentCategory::Other,
        };

        match ext.as_str() {
            "html" | "htm" => ContentCategory::Html,
            "css" => ContentCategory::Stylesheet,
            "js" | "mjs" => ContentCategory::Script,
            "png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "ico" | "avif" | "bmp" => {
                ContentCategory::Image
            }
            _ => ContentCategory::Other,
        }
    }
}

/// A resource that has been written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct LocalAsset {
    pub path: PathBuf,
    pub category: ContentCategory,
    pub size: usize,
}

impl LocalAsset {
    pub fn write(path: PathBuf, bytes: &[u8], category: ContentCategory) -> Result<Self, MirrorError> {
        write_atomic(&path, bytes)?;
        Ok(LocalAsset {
            path,
            category,
            size: bytes.len(),
        })
    }
}

/// Writes `bytes` to `path` all-or-nothing, creating parent directories.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MirrorError> {
    let parent = path
        .parent()
        .ok_or_else(|| MirrorError::fs(path, std::io::Error::other("path has no parent directory")))?;

    std::fs::create_dir_all(parent).map_err(|e| MirrorError::fs(parent, e))?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(|e| MirrorError::fs(parent, e))?;
    tmp.write_all(bytes).map_err(|e| MirrorError::fs(path, e))?;
    tmp.as_file().sync_all().map_err(|e| MirrorError::fs(path, e))?;
    tmp.persist(path).map_err(|e| MirrorError::fs(path, e.error))?;

    Ok(())
}
