use async_trait::async_trait;
use sp_core::{with_retry, Error, Result, RetryPolicy};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Some origins reject clients that do not look like a browser.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (compatible; slotpost/0.1; +https://github.com/slotpost)";

pub const FEED_TIMEOUT: Duration = Duration::from_secs(20);
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(20);
pub const ARTICLE_TIMEOUT: Duration = Duration::from_secs(25);

#[async_trait]
pub trait Fetch: Send + Sync {
    /// Returns the response body of a successful GET.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .build()?;
        Ok(Self { client, retry })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let client = &self.client;
        with_retry(&self.retry, url, move || async move {
            let response = client
                .get(url)
                .timeout(timeout)
                .send()
                .await?
                .error_for_status()?;
            let bytes = response.bytes().await?;
            Ok::<_, Error>(bytes.to_vec())
        })
        .await
    }
}

/// Serves canned bodies by URL; unknown URLs fail like a dead host.
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }

    /// URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Fetch for StaticFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Scraping(format!("no route to {}", url)))
    }
}
