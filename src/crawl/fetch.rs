// src/crawl/fetch.rs
// =============================================================================
// This module downloads one URL at a time, politely.
//
// Key functionality:
// - A single GET per URL, no retries
// - A fixed minimum gap between requests, shared by every caller (Throttle)
// - Refuses to contact anything outside the crawl scope, and does not follow
//   redirects that leave it
// - Sends browser-like User-Agent / Accept / Accept-Language headers
// - Sorts failures into NetworkError, HttpError{status} and ScopeViolation
//
// Rust concepts:
// - async/await: network I/O without blocking the runtime
// - tokio::sync::Mutex: a lock that can be held across an .await
// =============================================================================

use crate::config::CrawlConfig;
use crate::error::{CrawlError, MirrorError};
use crate::links::Scope;
use crate::mirror::ContentCategory;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, USER_AGENT};
use reqwest::{redirect, Client};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;
use url::Url;

const MAX_REDIRECTS: usize = 10;

/// Enforces a fixed minimum gap between consecutive requests.
///
/// This is not a token bucket: there are no bursts. The first request goes
/// out immediately, every later one waits until `delay` has passed since the
/// previous one started. Concurrent callers queue on the mutex, so the gap
/// holds globally no matter how many fetches are in flight.
#[derive(Debug)]
pub struct Throttle {
    delay: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Throttle {
            delay,
            next_slot: Mutex::new(None),
        }
    }

    /// Waits for this caller's turn.
    pub async fn wait(&self) {
        let mut next_slot = self.next_slot.lock().await;
        if let Some(at) = *next_slot {
            sleep_until(at).await;
        }
        *next_slot = Some(Instant::now() + self.delay);
    }
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// Canonical URL the response finally came from (differs from the
    /// requested one after a redirect)
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub category: ContentCategory,
    pub body: Vec<u8>,
}

impl Fetched {
    /// Body as text, for link extraction. Invalid UTF-8 is replaced, which
    /// is fine for finding URLs; the bytes written to disk are untouched.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

pub struct Fetcher {
    client: Client,
    scope: Scope,
    throttle: Throttle,
}

impl Fetcher {
    pub fn new(config: &CrawlConfig, scope: Scope) -> Result<Self, CrawlError> {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            (USER_AGENT, &config.user_agent),
            (ACCEPT, &config.accept),
            (ACCEPT_LANGUAGE, &config.accept_language),
        ] {
            let value = HeaderValue::from_str(value)
                .map_err(|_| CrawlError::Config(format!("invalid {} header value", name)))?;
            headers.insert(name, value);
        }

        // Redirects are followed only while they stay on the crawl host.
        // Anything else comes back as the 3xx itself and is recorded as an
        // HTTP error.
        let redirect_scope = scope.clone();
        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                attempt.error("too many redirects")
            } else if !redirect_scope.contains(attempt.url()) {
                attempt.stop()
            } else {
                attempt.follow()
            }
        });

        let client = Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .redirect(policy)
            .build()?;

        Ok(Fetcher {
            client,
            scope,
            throttle: Throttle::new(config.delay()),
        })
    }

    /// Fetches `url` once.
    ///
    /// Out-of-scope URLs fail with ScopeViolation before any waiting or I/O,
    /// so calling this directly with a foreign URL is harmless.
    pub async fn fetch(&self, url: &Url) -> Result<Fetched, MirrorError> {
        if !self.scope.contains(url) {
            return Err(MirrorError::ScopeViolation {
                url: url.to_string(),
                scope: self.scope.origin(),
            });
        }

        self.throttle.wait().await;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| categorize_error(url, e))?;

        // Followed redirects stay in scope (see the redirect policy)
        let final_url = self
            .scope
            .canonicalize_absolute(response.url().as_str())
            .unwrap_or_else(|_| url.clone());
        if &final_url != url {
            debug!("{} redirected to {}", url, final_url);
        }

        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::HttpError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let category = ContentCategory::classify(content_type.as_deref(), url);

        let body = response
            .bytes()
            .await
            .map_err(|e| categorize_error(url, e))?;

        Ok(Fetched {
            url: final_url,
            status: status.as_u16(),
            content_type,
            category,
            body: body.to_vec(),
        })
    }
}

// Turns a reqwest error into a NetworkError with a short, readable message
fn categorize_error(url: &Url, error: reqwest::Error) -> MirrorError {
    let message = if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_redirect() {
        "too many redirects".to_string()
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    };

    MirrorError::NetworkError {
        url: url.to_string(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher_for(server: &MockServer) -> Fetcher {
        let mut config = CrawlConfig::new(server.uri(), "unused");
        config.delay_ms = 0;
        config.timeout_secs = 5;
        let scope = config.validate().unwrap();
        Fetcher::new(&config, scope).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_spaces_sequential_calls() {
        let throttle = Throttle::new(Duration::from_millis(500));
        let start = Instant::now();
        throttle.wait().await;
        assert!(start.elapsed() < Duration::from_millis(500));
        throttle.wait().await;
        throttle.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_is_global_across_concurrent_callers() {
        let throttle = Throttle::new(Duration::from_millis(200));
        let start = Instant::now();
        tokio::join!(throttle.wait(), throttle.wait(), throttle.wait(), throttle.wait());
        assert!(start.elapsed() >= Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_fetch_success_sends_browser_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/about/"))
            .and(header_exists("user-agent"))
            .and(header_exists("accept-language"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<h1>About</h1>", "text/html; charset=utf-8"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let url = Url::parse(&format!("{}/about/", server.uri())).unwrap();
        let fetched = fetcher.fetch(&url).await.unwrap();

        assert_eq!(fetched.status, 200);
        assert_eq!(fetched.category, ContentCategory::Html);
        assert_eq!(fetched.text(), "<h1>About</h1>");
    }

    #[tokio::test]
    async fn test_fetch_404_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone/"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let url = Url::parse(&format!("{}/gone/", server.uri())).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_out_of_scope_is_refused_without_io() {
        let server = MockServer::start().await;
        let fetcher = fetcher_for(&server);

        let err = fetcher
            .fetch(&Url::parse("https://other.test/").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::ScopeViolation { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redirect_off_site_is_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/out"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "https://other.test/"))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let url = Url::parse(&format!("{}/out", server.uri())).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert_eq!(err.status(), Some(302));
    }

    #[tokio::test]
    async fn test_in_scope_redirect_reports_final_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old/"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("location", format!("{}/new/", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new/"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<p>new</p>", "text/html"))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let url = Url::parse(&format!("{}/old/", server.uri())).unwrap();
        let fetched = fetcher.fetch(&url).await.unwrap();
        assert_eq!(fetched.url.path(), "/new/");
        assert_eq!(fetched.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Grab a free port, then close it so nothing listens there
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut config = CrawlConfig::new(format!("http://127.0.0.1:{port}/"), "unused");
        config.delay_ms = 0;
        let scope = config.validate().unwrap();
        let fetcher = Fetcher::new(&config, scope).unwrap();

        let err = fetcher
            .fetch(&Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, MirrorError::NetworkError { .. }));
    }
}
