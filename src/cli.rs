// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// Subcommands:
// - mirror:  crawl a site into a local directory, then rewrite its links
// - rewrite: run only the link-rewrite pass over an existing mirror
// - check:   report local references that do not resolve to a file
// =============================================================================

use crate::config::{CrawlConfig, DEFAULT_DELAY_MS, DEFAULT_OUTPUT_DIR, DEFAULT_TIMEOUT_SECS};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "site-mirror",
    version = "0.1.0",
    about = "Mirror a single website to disk and make it browsable offline",
    long_about = "site-mirror crawls one website breadth-first, saves every page and asset \
                  it finds under a local directory, and rewrites absolute links to the site \
                  into local paths so the copy works from any host."
)]
pub struct Cli {
    /// Show debug output (RUST_LOG overrides this)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Crawl a website into a local directory
    ///
    /// Example: site-mirror mirror https://example.com -o example --delay-ms 500
    Mirror(MirrorArgs),

    /// Rewrite absolute links to a site in an existing mirror
    ///
    /// Example: site-mirror rewrite ./example --origin https://example.com
    Rewrite {
        /// Mirror directory to rewrite in place
        dir: PathBuf,

        /// Origin whose absolute links become local paths
        #[arg(long)]
        origin: String,

        /// Output results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Check that every local link in a mirror resolves to a file
    ///
    /// Exits with code 1 if anything is missing.
    Check {
        /// Mirror directory to check
        dir: PathBuf,

        /// Output results in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
pub struct MirrorArgs {
    /// Start URL (e.g., https://example.com/)
    pub start_url: String,

    /// Output directory
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Minimum delay between requests, in milliseconds
    #[arg(long, default_value_t = DEFAULT_DELAY_MS)]
    pub delay_ms: u64,

    /// Per-request timeout, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Stop after this many fetches
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Do not follow links more than this many hops from the start page
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Fetches in flight at once (they still share the delay)
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Extra path prefix never crawled as a page (repeatable)
    #[arg(long = "exclude", value_name = "PREFIX")]
    pub exclude: Vec<String>,

    /// Skip the link-rewrite pass after crawling
    #[arg(long)]
    pub no_rewrite: bool,

    /// Output results in JSON format
    #[arg(long)]
    pub json: bool,
}

impl MirrorArgs {
    pub fn to_config(&self) -> CrawlConfig {
        let mut config = CrawlConfig::new(self.start_url.clone(), self.output.clone());
        config.delay_ms = self.delay_ms;
        config.timeout_secs = self.timeout_secs;
        config.max_pages = self.max_pages;
        config.max_depth = self.max_depth;
        config.concurrency = self.concurrency;
        config.page_denylist.extend(self.exclude.iter().cloned());
        config
    }
}
