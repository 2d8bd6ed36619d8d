// src/crawl/queue.rs
// =============================================================================
// This module implements the crawl itself: a breadth-first walk over the
// site's link graph.
//
// How it works:
// 1. Seed the frontier with the start URL
// 2. Take the next URL from the front of the queue (FIFO = breadth-first)
// 3. Fetch it; on success write it to disk and mine it for links
// 4. Push every in-scope link that is neither visited nor queued
// 5. Repeat until the frontier is empty
//
// Per-URL lifecycle:  Discovered -> Fetching -> Persisted | Failed
//
// A URL is marked visited the moment it is claimed for fetching, so it can
// never be fetched twice in one run. Failures are recorded and the crawl goes
// on; only failing to write the start page ends the run early.
//
// Rust concepts:
// - VecDeque: the frontier (push_back / pop_front)
// - HashSet: visited and queued URLs, O(1) membership checks
// - Arc<AtomicBool>: a cancellation flag another task can flip
// =============================================================================

use crate::config::CrawlConfig;
use crate::crawl::fetch::{Fetched, Fetcher};
use crate::error::{CrawlError, ErrorKind, MirrorError};
use crate::links::{extract_links, LinkFilter, LinkKind};
use crate::mirror::{ContentCategory, LocalAsset, PathMapper};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// A canonical URL waiting in the frontier.
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: Url,
    /// Link hops from the start page (the start page is 0)
    pub depth: usize,
    pub kind: LinkKind,
    pub enqueued_at: Instant,
}

/// The outcome of one fetch.
#[derive(Debug, Clone, Serialize)]
pub struct VisitedRecord {
    pub url: String,
    pub success: bool,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ContentCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Where an in-scope redirect ended, and the extra copy stored there
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirected_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VisitedRecord {
    fn persisted(
        entry: &FrontierEntry,
        fetched: &Fetched,
        asset: &LocalAsset,
        redirect_copy: Option<PathBuf>,
    ) -> Self {
        let redirected = fetched.url != entry.url;
        VisitedRecord {
            url: entry.url.to_string(),
            success: true,
            depth: entry.depth,
            status: Some(fetched.status),
            local_path: Some(asset.path.clone()),
            category: Some(asset.category),
            content_type: fetched.content_type.clone(),
            redirected_to: redirected.then(|| fetched.url.to_string()),
            redirect_path: redirect_copy,
            error: None,
            message: None,
        }
    }

    fn failed(entry: &FrontierEntry, error: &MirrorError) -> Self {
        VisitedRecord {
            url: entry.url.to_string(),
            success: false,
            depth: entry.depth,
            status: error.status(),
            local_path: None,
            category: None,
            content_type: None,
            redirected_to: None,
            redirect_path: None,
            error: Some(error.kind()),
            message: Some(error.to_string()),
        }
    }
}

/// Everything one crawl run produced.
#[derive(Debug, Default, Serialize)]
pub struct CrawlReport {
    pub start_url: String,
    pub records: Vec<VisitedRecord>,
    /// Stopped by the cancellation flag
    pub cancelled: bool,
    /// Stopped by max_pages with URLs still in the frontier
    pub truncated: bool,
}

impl CrawlReport {
    pub fn persisted(&self) -> impl Iterator<Item = &VisitedRecord> {
        self.records.iter().filter(|r| r.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &VisitedRecord> {
        self.records.iter().filter(|r| !r.success)
    }

    /// Local paths of every HTML page written, for the rewrite pass.
    pub fn persisted_html(&self) -> Vec<PathBuf> {
        self.persisted()
            .filter(|r| r.category == Some(ContentCategory::Html))
            .flat_map(|r| r.local_path.iter().chain(r.redirect_path.iter()).cloned())
            .collect()
    }
}

/// Owns the frontier and visited-set for a single crawl.
pub struct Scheduler {
    start: Url,
    fetcher: Fetcher,
    filter: LinkFilter,
    mapper: PathMapper,
    frontier: VecDeque<FrontierEntry>,
    visited: HashSet<Url>,
    queued: HashSet<Url>,
    max_pages: Option<usize>,
    max_depth: Option<usize>,
    concurrency: usize,
    cancel: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(config: &CrawlConfig) -> Result<Self, CrawlError> {
        let scope = config.validate()?;
        let start = scope
            .canonicalize_absolute(&config.start_url)
            .map_err(|e| CrawlError::Config(e.to_string()))?;

        let fetcher = Fetcher::new(config, scope.clone())?;
        let filter = LinkFilter::new(scope, config.page_denylist.clone());
        let mapper = PathMapper::new(&config.output_dir)
            .with_default_document(config.default_document.clone());

        Ok(Scheduler {
            start,
            fetcher,
            filter,
            mapper,
            frontier: VecDeque::new(),
            visited: HashSet::new(),
            queued: HashSet::new(),
            max_pages: config.max_pages,
            max_depth: config.max_depth,
            concurrency: config.concurrency.max(1),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that stops the crawl at the next loop iteration when set.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Runs the crawl until the frontier is empty (or a guard trips).
    pub async fn run(mut self) -> Result<CrawlReport, CrawlError> {
        let mut report = CrawlReport {
            start_url: self.start.to_string(),
            ..Default::default()
        };

        let start = self.start.clone();
        self.enqueue(start, 0, LinkKind::Page);

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                warn!("crawl cancelled with {} URL(s) still queued", self.frontier.len());
                report.cancelled = true;
                break;
            }

            let budget = match self.max_pages {
                Some(max) => max.saturating_sub(report.records.len()),
                None => usize::MAX,
            };
            if budget == 0 {
                if !self.frontier.is_empty() {
                    info!("page limit reached, {} URL(s) left unfetched", self.frontier.len());
                    report.truncated = true;
                }
                break;
            }

            let batch = self.claim_batch(self.concurrency.min(budget));
            if batch.is_empty() {
                break;
            }

            // Fetch the batch concurrently; the fetcher's throttle still
            // spaces the requests. Results come back in claim order.
            let fetcher = &self.fetcher;
            let results: Vec<(FrontierEntry, Result<Fetched, MirrorError>)> = stream::iter(batch)
                .map(|entry| async move {
                    let result = fetcher.fetch(&entry.url).await;
                    (entry, result)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

            for (entry, result) in results {
                let is_seed = entry.depth == 0 && entry.url == self.start;
                let record = match self.process(&entry, result) {
                    Ok(record) => record,
                    Err(e @ MirrorError::FilesystemError { .. }) if is_seed => {
                        return Err(CrawlError::SeedNotPersisted(e));
                    }
                    Err(e) => VisitedRecord::failed(&entry, &e),
                };
                report.records.push(record);
            }

            debug!(
                "progress: {} fetched, {} queued",
                report.records.len(),
                self.frontier.len()
            );
        }

        Ok(report)
    }

    /// Adds a URL to the frontier unless it was already seen.
    /// Returns true if it was added.
    fn enqueue(&mut self, url: Url, depth: usize, kind: LinkKind) -> bool {
        if self.visited.contains(&url) || self.queued.contains(&url) {
            return false;
        }
        // Assets are part of the page that references them, so the depth
        // cap only stops pages
        if kind == LinkKind::Page && self.max_depth.is_some_and(|max| depth > max) {
            return false;
        }
        // URLs that cannot be stored safely are dropped right here
        if let Err(e) = self.mapper.map(&url) {
            debug!("{}", e);
            return false;
        }

        self.queued.insert(url.clone());
        self.frontier.push_back(FrontierEntry {
            url,
            depth,
            kind,
            enqueued_at: Instant::now(),
        });
        true
    }

    /// Takes up to `n` entries off the front of the frontier and marks them
    /// visited. Claiming happens on this one task, so no URL can be handed
    /// out twice.
    fn claim_batch(&mut self, n: usize) -> Vec<FrontierEntry> {
        let mut batch = Vec::new();
        while batch.len() < n {
            let Some(entry) = self.frontier.pop_front() else {
                break;
            };
            self.queued.remove(&entry.url);
            if !self.visited.insert(entry.url.clone()) {
                continue;
            }
            batch.push(entry);
        }
        batch
    }

    /// Persists a fetch result and enqueues its links.
    fn process(
        &mut self,
        entry: &FrontierEntry,
        result: Result<Fetched, MirrorError>,
    ) -> Result<VisitedRecord, MirrorError> {
        let fetched = match result {
            Ok(fetched) => fetched,
            Err(e) => {
                // 404s are routine on a real site
                if e.status() == Some(404) {
                    debug!("{}", e);
                } else {
                    warn!("{}", e);
                }
                return Err(e);
            }
        };

        let path = self.mapper.map(&entry.url)?;
        let asset = LocalAsset::write(path, &fetched.body, fetched.category)?;
        let redirect_copy = self.persist_redirect_target(entry, &fetched);
        info!(
            "[depth {}] {:?} {} -> {} ({} bytes, queued {:?} ago)",
            entry.depth,
            entry.kind,
            entry.url,
            asset.path.display(),
            asset.size,
            entry.enqueued_at.elapsed()
        );

        if matches!(fetched.category, ContentCategory::Html | ContentCategory::Stylesheet) {
            // Relative links resolve against where the content actually came from
            let links = extract_links(&fetched.text(), fetched.category, &fetched.url, &self.filter);
            let mut added = 0;
            for link in links {
                if self.enqueue(link.url, entry.depth + 1, link.kind) {
                    added += 1;
                }
            }
            debug!("{} new URL(s) from {}", added, entry.url);
        }

        Ok(VisitedRecord::persisted(entry, &fetched, &asset, redirect_copy))
    }

    /// After an in-scope redirect, also stores the body under the final URL
    /// and marks that URL visited so it is not fetched again. Returns the
    /// extra path, if one was written.
    fn persist_redirect_target(&mut self, entry: &FrontierEntry, fetched: &Fetched) -> Option<PathBuf> {
        if fetched.url == entry.url || !self.visited.insert(fetched.url.clone()) {
            return None;
        }
        // A queued copy is skipped when claimed, since it is now visited
        self.queued.remove(&fetched.url);

        let written = self
            .mapper
            .map(&fetched.url)
            .and_then(|path| LocalAsset::write(path, &fetched.body, fetched.category));
        match written {
            Ok(asset) => Some(asset.path),
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(start: &str, out: &std::path::Path) -> CrawlConfig {
        let mut config = CrawlConfig::new(start, out);
        config.delay_ms = 0;
        config.timeout_secs = 5;
        config
    }

    fn fetched(url: &Url, body: &str, category: ContentCategory) -> Fetched {
        Fetched {
            url: url.clone(),
            status: 200,
            content_type: None,
            category,
            body: body.as_bytes().to_vec(),
        }
    }

    async fn mount(server: &MockServer, route: &str, status: u16, body: &str, mime: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_raw(body.to_string(), mime))
            .expect(1)
            .mount(server)
            .await;
    }

    #[test]
    fn test_duplicate_links_queue_once() {
        let out = tempfile::tempdir().unwrap();
        let mut scheduler = Scheduler::new(&config("https://example.test/", out.path())).unwrap();
        let start = scheduler.start.clone();
        assert!(scheduler.enqueue(start.clone(), 0, LinkKind::Page));

        let entry = scheduler.claim_batch(1).remove(0);
        let body = r#"<a href="/about/">About</a>
                      <a href="/about/">About</a>
                      <img src="//example.test/logo.png">"#;
        let record = scheduler
            .process(&entry, Ok(fetched(&start, body, ContentCategory::Html)))
            .unwrap();

        assert!(record.success);
        let queued: Vec<&str> = scheduler.frontier.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(
            queued,
            vec!["https://example.test/about/", "https://example.test/logo.png"]
        );
        assert!(out.path().join("index.html").is_file());
    }

    #[test]
    fn test_visited_urls_are_never_requeued() {
        let out = tempfile::tempdir().unwrap();
        let mut scheduler = Scheduler::new(&config("https://example.test/", out.path())).unwrap();
        let start = scheduler.start.clone();
        scheduler.enqueue(start.clone(), 0, LinkKind::Page);
        scheduler.claim_batch(1);

        assert!(!scheduler.enqueue(start, 1, LinkKind::Page));
        let about = Url::parse("https://example.test/about/").unwrap();
        assert!(scheduler.enqueue(about.clone(), 1, LinkKind::Page));
        assert!(!scheduler.enqueue(about, 1, LinkKind::Page));
        assert_eq!(scheduler.frontier.len(), 1);
    }

    #[test]
    fn test_max_depth_guard() {
        let out = tempfile::tempdir().unwrap();
        let mut cfg = config("https://example.test/", out.path());
        cfg.max_depth = Some(1);
        let mut scheduler = Scheduler::new(&cfg).unwrap();
        assert!(scheduler.enqueue(Url::parse("https://example.test/a/").unwrap(), 1, LinkKind::Page));
        assert!(!scheduler.enqueue(Url::parse("https://example.test/b/").unwrap(), 2, LinkKind::Page));
        assert!(scheduler.enqueue(Url::parse("https://example.test/a.css").unwrap(), 2, LinkKind::Asset));
    }

    #[tokio::test]
    async fn test_max_depth_keeps_assets_of_the_last_pages() {
        let server = MockServer::start().await;
        mount(&server, "/", 200, r#"<a href="/a/">a</a>"#, "text/html").await;
        mount(
            &server,
            "/a/",
            200,
            r#"<link rel="stylesheet" href="/a.css"><img src="/a.png"><a href="/b/">b</a>"#,
            "text/html",
        )
        .await;
        mount(&server, "/a.css", 200, "body { background: url(/bg.png) }", "text/css").await;
        mount(&server, "/a.png", 200, "PNG", "image/png").await;
        mount(&server, "/bg.png", 200, "PNG", "image/png").await;

        let out = tempfile::tempdir().unwrap();
        let mut cfg = config(&format!("{}/", server.uri()), out.path());
        cfg.max_depth = Some(1);
        let report = Scheduler::new(&cfg).unwrap().run().await.unwrap();

        let paths: Vec<String> = report
            .records
            .iter()
            .map(|r| Url::parse(&r.url).unwrap().path().to_string())
            .collect();
        assert_eq!(paths, vec!["/", "/a/", "/a.png", "/a.css", "/bg.png"]);
        assert!(report.records.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn test_redirected_page_links_resolve_against_final_url() {
        let server = MockServer::start().await;
        mount(&server, "/", 200, r#"<a href="/old/">old</a>"#, "text/html").await;
        Mock::given(method("GET"))
            .and(path("/old/"))
            .respond_with(
                ResponseTemplate::new(301)
                    .insert_header("location", format!("{}/new/section/", server.uri()).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount(
            &server,
            "/new/section/",
            200,
            r#"<img src="pic.png"><a href="/new/section/">self</a>"#,
            "text/html",
        )
        .await;
        mount(&server, "/new/section/pic.png", 200, "PNG", "image/png").await;

        let out = tempfile::tempdir().unwrap();
        let report = Scheduler::new(&config(&format!("{}/", server.uri()), out.path()))
            .unwrap()
            .run()
            .await
            .unwrap();

        let paths: Vec<String> = report
            .records
            .iter()
            .map(|r| Url::parse(&r.url).unwrap().path().to_string())
            .collect();
        assert_eq!(paths, vec!["/", "/old/", "/new/section/pic.png"]);
        assert!(report.records.iter().all(|r| r.success));

        let old = &report.records[1];
        assert!(old.redirected_to.as_deref().unwrap().ends_with("/new/section/"));
        for file in ["old/index.html", "new/section/index.html", "new/section/pic.png"] {
            assert!(out.path().join(file).is_file(), "{file} not written");
        }
        assert_eq!(report.persisted_html().len(), 3);
    }

    #[test]
    fn test_failed_fetch_writes_nothing_and_mines_nothing() {
        let out = tempfile::tempdir().unwrap();
        let mut scheduler = Scheduler::new(&config("https://example.test/", out.path())).unwrap();
        let start = scheduler.start.clone();
        scheduler.enqueue(start.clone(), 0, LinkKind::Page);
        let entry = scheduler.claim_batch(1).remove(0);

        let err = scheduler
            .process(
                &entry,
                Err(MirrorError::HttpError {
                    url: start.to_string(),
                    status: 404,
                }),
            )
            .unwrap_err();
        let record = VisitedRecord::failed(&entry, &err);

        assert!(!record.success);
        assert_eq!(record.status, Some(404));
        assert_eq!(record.error, Some(ErrorKind::HttpError));
        assert!(scheduler.frontier.is_empty());
        assert!(!out.path().join("index.html").exists());
    }

    #[tokio::test]
    async fn test_crawl_mirrors_site_breadth_first() {
        let server = MockServer::start().await;
        let home = format!(
            r#"<html><head><link rel="stylesheet" href="/css/main.css"></head><body>
               <a href="/about/">About</a>
               <a href="/about/">About again</a>
               <a href="/missing/">Broken</a>
               <a href="/wp-admin/">Admin</a>
               <a href="https://other.test/">Elsewhere</a>
               <img src="//{host}/logo.png">
               </body></html>"#,
            host = server.address()
        );
        mount(&server, "/", 200, &home, "text/html").await;
        mount(&server, "/about/", 200, r#"<a href="/">Home</a><a href="/about/team/">Team</a>"#, "text/html").await;
        mount(&server, "/about/team/", 200, "<p>Team</p>", "text/html").await;
        mount(&server, "/logo.png", 200, "PNG", "image/png").await;
        mount(&server, "/css/main.css", 200, "body { background: url(../img/bg.jpg) }", "text/css").await;
        mount(&server, "/img/bg.jpg", 200, "JPG", "image/jpeg").await;
        mount(&server, "/missing/", 404, "", "text/html").await;

        let out = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(&config(&format!("{}/", server.uri()), out.path())).unwrap();
        let report = scheduler.run().await.unwrap();

        let order: Vec<String> = report
            .records
            .iter()
            .map(|r| Url::parse(&r.url).unwrap().path().to_string())
            .collect();
        assert_eq!(
            order,
            vec!["/", "/about/", "/missing/", "/logo.png", "/css/main.css", "/about/team/", "/img/bg.jpg"]
        );

        assert_eq!(report.persisted().count(), 6);
        let failed: Vec<&VisitedRecord> = report.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status, Some(404));
        assert!(!out.path().join("missing/index.html").exists());

        for file in ["index.html", "about/index.html", "about/team/index.html", "logo.png", "css/main.css", "img/bg.jpg"] {
            assert!(out.path().join(file).is_file(), "{file} not written");
        }
        assert_eq!(report.persisted_html().len(), 3);
        assert!(!report.cancelled && !report.truncated);
    }

    #[tokio::test]
    async fn test_concurrent_crawl_fetches_each_url_once() {
        let server = MockServer::start().await;
        let links: String = (0..8).map(|i| format!(r#"<a href="/p{i}/">{i}</a>"#)).collect();
        mount(&server, "/", 200, &links, "text/html").await;
        for i in 0..8 {
            // every page links back home and to its neighbour
            let body = format!(r#"<a href="/">home</a><a href="/p{}/">next</a>"#, (i + 1) % 8);
            mount(&server, &format!("/p{i}/"), 200, &body, "text/html").await;
        }

        let out = tempfile::tempdir().unwrap();
        let mut cfg = config(&format!("{}/", server.uri()), out.path());
        cfg.concurrency = 4;
        let report = Scheduler::new(&cfg).unwrap().run().await.unwrap();

        assert_eq!(report.records.len(), 9);
        assert!(report.records.iter().all(|r| r.success));
        // .expect(1) on every mock is verified when the server drops
    }

    #[tokio::test]
    async fn test_max_pages_truncates() {
        let server = MockServer::start().await;
        mount(&server, "/", 200, r#"<a href="/a/">a</a><a href="/b/">b</a>"#, "text/html").await;
        mount(&server, "/a/", 200, "a", "text/html").await;

        let out = tempfile::tempdir().unwrap();
        let mut cfg = config(&format!("{}/", server.uri()), out.path());
        cfg.max_pages = Some(2);
        let report = Scheduler::new(&cfg).unwrap().run().await.unwrap();

        assert_eq!(report.records.len(), 2);
        assert!(report.truncated);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let out = tempfile::tempdir().unwrap();
        let scheduler = Scheduler::new(&config("https://example.test/", out.path())).unwrap();
        scheduler.cancel_flag().store(true, Ordering::SeqCst);
        let report = scheduler.run().await.unwrap();
        assert!(report.cancelled);
        assert!(report.records.is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_output_is_fatal_for_seed() {
        let server = MockServer::start().await;
        mount(&server, "/", 200, "<p>home</p>", "text/html").await;

        let out = tempfile::tempdir().unwrap();
        let blocker = out.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let scheduler = Scheduler::new(&config(&format!("{}/", server.uri()), &blocker)).unwrap();
        let err = scheduler.run().await.unwrap_err();
        assert!(matches!(err, CrawlError::SeedNotPersisted(_)));
    }
}
