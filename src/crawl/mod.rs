// src/crawl/mod.rs
// =============================================================================
// This module handles website crawling.
//
// Features:
// - Breadth-first crawling starting from a URL
// - Same-origin scope (never leaves the target site)
// - Every fetched page and asset is written to the mirror as it arrives
// - Polite crawling: a fixed delay between requests, even with concurrency
//
// Rust concepts:
// - Async programming: for network requests
// - Collections: HashSet for tracking visited URLs, VecDeque for the queue
// =============================================================================

mod fetch;
mod queue;

pub use queue::{CrawlReport, Scheduler};
