// src/config.rs
// =============================================================================
// Crawl configuration.
//
// `CrawlConfig` is built from the command line (see cli.rs) and handed to the
// scheduler. It is also echoed back in the JSON report so a run can be
// reproduced.
// =============================================================================

use crate::error::CrawlError;
use crate::links::{Scope, DEFAULT_PAGE_DENYLIST};
use crate::mirror::DEFAULT_DOCUMENT;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// A common desktop browser. Some sites serve stripped-down pages to
/// unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

pub const DEFAULT_ACCEPT_LANGUAGE: &str = "ru-RU,ru;q=0.8,en-US;q=0.5,en;q=0.3";

pub const DEFAULT_DELAY_MS: u64 = 1000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_OUTPUT_DIR: &str = "mirror";

#[derive(Debug, Clone, Serialize)]
pub struct CrawlConfig {
    pub start_url: String,
    pub output_dir: PathBuf,
    /// Minimum gap between two requests, in milliseconds
    pub delay_ms: u64,
    pub timeout_secs: u64,
    /// Stop after this many fetch attempts (None = until the frontier drains)
    pub max_pages: Option<usize>,
    /// Do not follow links more than this many hops from the start page
    pub max_depth: Option<usize>,
    /// How many fetches may be in flight at once. They still share one
    /// politeness delay.
    pub concurrency: usize,
    /// Path prefixes that are never crawled as pages
    pub page_denylist: Vec<String>,
    pub default_document: String,
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
}

impl CrawlConfig {
    pub fn new(start_url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        CrawlConfig {
            start_url: start_url.into(),
            output_dir: output_dir.into(),
            delay_ms: DEFAULT_DELAY_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_pages: None,
            max_depth: None,
            concurrency: 1,
            page_denylist: DEFAULT_PAGE_DENYLIST.iter().map(|p| p.to_string()).collect(),
            default_document: DEFAULT_DOCUMENT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Checks the settings and returns the crawl scope derived from the
    /// start URL.
    pub fn validate(&self) -> Result<Scope, CrawlError> {
        if self.concurrency == 0 {
            return Err(CrawlError::Config("concurrency must be at least 1".to_string()));
        }
        if self.max_pages == Some(0) {
            return Err(CrawlError::Config("max-pages must be at least 1".to_string()));
        }
        let document = self.default_document.as_str();
        if document.is_empty()
            || document == "."
            || document == ".."
            || document.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
        {
            return Err(CrawlError::Config(format!(
                "invalid default document name '{}'",
                self.default_document
            )));
        }
        Scope::parse(&self.start_url).map_err(|e| CrawlError::Config(e.to_string()))
    }
}
