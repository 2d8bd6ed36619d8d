// src/error.rs
// =============================================================================
// Error types for the crawl/rewrite pipeline.
//
// Every per-URL failure is one of the `MirrorError` variants. The scheduler
// catches them and turns them into failed `VisitedRecord`s, so nothing below
// the scheduler ever aborts a crawl.
//
// The binary layer (main.rs) uses anyhow on top of these.
// =============================================================================

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// A failure attached to a single URL or file.
#[derive(Debug, Error)]
pub enum MirrorError {
    /// The reference could not be resolved, uses an unsupported scheme, or
    /// would map outside the output root.
    #[error("invalid reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    /// Connection refused, DNS failure, timeout, truncated body...
    #[error("network error for {url}: {message}")]
    NetworkError { url: String, message: String },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} for {url}")]
    HttpError { url: String, status: u16 },

    /// The target host is not the allow-listed one.
    #[error("{url} is outside the crawl scope ({scope})")]
    ScopeViolation { url: String, scope: String },

    /// Creating a directory or writing a file failed.
    #[error("filesystem error at {}: {source}", path.display())]
    FilesystemError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MirrorError {
    pub fn invalid(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        MirrorError::InvalidReference {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MirrorError::FilesystemError {
            path: path.into(),
            source,
        }
    }

    /// The kind tag stored in a `VisitedRecord`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MirrorError::InvalidReference { .. } => ErrorKind::InvalidReference,
            MirrorError::NetworkError { .. } => ErrorKind::NetworkError,
            MirrorError::HttpError { .. } => ErrorKind::HttpError,
            MirrorError::ScopeViolation { .. } => ErrorKind::ScopeViolation,
            MirrorError::FilesystemError { .. } => ErrorKind::FilesystemError,
        }
    }

    /// HTTP status, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            MirrorError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Serializable tag for `MirrorError`, kept in the crawl report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidReference,
    NetworkError,
    HttpError,
    ScopeViolation,
    FilesystemError,
}

/// Errors that end a whole run rather than a single URL.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Nothing can be produced if the start page cannot be written.
    #[error("could not persist the start page")]
    SeedNotPersisted(#[source] MirrorError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
