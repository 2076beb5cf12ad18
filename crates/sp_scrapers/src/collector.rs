//! Candidate collection from syndication feeds and link-listing pages.

use scraper::{Html, Selector};
use sp_core::{Candidate, Error, ItemOutcome, Result, SkipReason, Sources};
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

use crate::fetcher::{Fetch, FEED_TIMEOUT, PAGE_TIMEOUT};

pub const FEED_ENTRY_LIMIT: usize = 20;
pub const LISTING_ANCHOR_LIMIT: usize = 80;
/// Anchors with shorter visible text are navigation or boilerplate.
pub const MIN_ANCHOR_TEXT_CHARS: usize = 8;

/// Result of one collection pass.
#[derive(Debug, Default)]
pub struct Collection {
    /// Unique by URL, in first-seen order.
    pub candidates: Vec<Candidate>,
    /// One entry per configured source: candidates found, or why it was skipped.
    pub sources: Vec<ItemOutcome<usize>>,
}

impl Collection {
    pub fn failed_sources(&self) -> usize {
        self.sources.iter().filter(|s| !s.is_accepted()).count()
    }
}

pub struct Collector {
    fetcher: Arc<dyn Fetch>,
}

impl Collector {
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self { fetcher }
    }

    /// Feeds first, then listing pages. A failing source is recorded and
    /// skipped; it never stops the others.
    pub async fn collect(&self, sources: &Sources) -> Collection {
        let mut collection = Collection::default();
        let mut found = Vec::new();

        for feed_url in &sources.rss {
            let outcome = self.collect_feed(feed_url).await;
            record(&mut collection, &mut found, feed_url, outcome, "feed");
        }

        for page_url in &sources.list_pages {
            let outcome = self.collect_listing(page_url).await;
            record(&mut collection, &mut found, page_url, outcome, "listing page");
        }

        collection.candidates = dedupe_by_url(found);
        tracing::info!(
            candidates = collection.candidates.len(),
            failed_sources = collection.failed_sources(),
            "collection finished"
        );
        collection
    }

    async fn collect_feed(&self, feed_url: &str) -> std::result::Result<Vec<Candidate>, SkipReason> {
        let body = self
            .fetcher
            .fetch(feed_url, FEED_TIMEOUT)
            .await
            .map_err(|e| SkipReason::FetchFailed(e.to_string()))?;
        parse_feed(&body, feed_url).map_err(|e| SkipReason::ParseFailed(e.to_string()))
    }

    async fn collect_listing(&self, page_url: &str) -> std::result::Result<Vec<Candidate>, SkipReason> {
        let body = self
            .fetcher
            .fetch(page_url, PAGE_TIMEOUT)
            .await
            .map_err(|e| SkipReason::FetchFailed(e.to_string()))?;
        let html = String::from_utf8_lossy(&body);
        parse_listing(&html, page_url).map_err(|e| SkipReason::ParseFailed(e.to_string()))
    }
}

fn record(
    collection: &mut Collection,
    found: &mut Vec<Candidate>,
    source: &str,
    outcome: std::result::Result<Vec<Candidate>, SkipReason>,
    kind: &str,
) {
    match outcome {
        Ok(candidates) => {
            tracing::debug!(source, kind, count = candidates.len(), "source collected");
            collection.sources.push(ItemOutcome::accepted(source, candidates.len()));
            found.extend(candidates);
        }
        Err(reason) => {
            tracing::warn!(source, kind, "collection failed: {}", reason);
            collection.sources.push(ItemOutcome::skipped(source, reason));
        }
    }
}

/// Parses an RSS/Atom/JSON feed and keeps the first entries that carry a
/// usable link.
pub fn parse_feed(body: &[u8], feed_url: &str) -> Result<Vec<Candidate>> {
    let parser = feed_rs::parser::Builder::new().base_uri(Some(feed_url)).build();
    let feed = parser
        .parse(body)
        .map_err(|e| Error::Scraping(format!("Failed to parse feed {}: {}", feed_url, e)))?;
    let base = Url::parse(feed_url).ok();

    let candidates = feed
        .entries
        .into_iter()
        .take(FEED_ENTRY_LIMIT)
        .filter_map(|entry| {
            let link = article_link(&entry.links)?;
            let url = resolve_http_url(base.as_ref(), link)?;
            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let summary = entry.summary.map(|t| t.content).unwrap_or_default();
            Candidate::new(url, title.trim(), summary.trim()).ok()
        })
        .collect();

    Ok(candidates)
}

/// The entry's article link: the first `alternate` (or rel-less) link, else
/// whatever link comes first. Atom entries often list `replies` and `edit`
/// links ahead of the article itself.
fn article_link(links: &[feed_rs::model::Link]) -> Option<&str> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.as_str())
}

/// Pulls article-looking anchors out of a listing page.
pub fn parse_listing(html: &str, page_url: &str) -> Result<Vec<Candidate>> {
    let page = Url::parse(page_url).map_err(|e| Error::InvalidUrl(format!("{}: {}", page_url, e)))?;
    let document = Html::parse_document(html);
    let base = document_base(&document, &page);

    let selector = Selector::parse("a[href]").map_err(|e| Error::Scraping(format!("Invalid selector: {}", e)))?;

    let candidates = document
        .select(&selector)
        .take(LISTING_ANCHOR_LIMIT)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            let url = resolve_http_url(Some(&base), href)?;
            let text = anchor
                .text()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if text.chars().count() < MIN_ANCHOR_TEXT_CHARS {
                return None;
            }
            Candidate::new(url, text, "").ok()
        })
        .collect();

    Ok(candidates)
}

/// Honors `<base href>` when the page declares one.
fn document_base(document: &Html, page: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|base| base.value().attr("href"))
                .and_then(|href| page.join(href).ok())
        })
        .unwrap_or_else(|| page.clone())
}

fn resolve_http_url(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    let url = match base {
        Some(base) => base.join(href).ok()?,
        None => Url::parse(href).ok()?,
    };
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// Drops repeated URLs, keeping the first occurrence.
pub fn dedupe_by_url(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::StaticFetcher;

    fn rss(count: usize) -> String {
        let items: String = (0..count)
            .map(|i| {
                format!(
                    "<item><title>Story {i}</title><link>https://news.example/story-{i}</link>\
                     <description>Summary {i}</description></item>"
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <rss version="2.0"><channel><title>News</title><link>https://news.example/</link>
            <description>d</description>{items}</channel></rss>"#
        )
    }

    #[test]
    fn test_parse_feed_caps_entries() {
        let candidates = parse_feed(rss(25).as_bytes(), "https://news.example/feed").unwrap();
        assert_eq!(candidates.len(), FEED_ENTRY_LIMIT);
        assert_eq!(candidates[0].url, "https://news.example/story-0");
        assert_eq!(candidates[0].title, "Story 0");
        assert_eq!(candidates[0].summary, "Summary 0");
        assert_eq!(candidates[19].url, "https://news.example/story-19");
    }

    #[test]
    fn test_parse_feed_skips_entries_without_link() {
        let body = r#"<?xml version="1.0"?>
            <rss version="2.0"><channel><title>News</title><link>https://news.example/</link><description>d</description>
            <item><title>No link here</title><description>x</description></item>
            <item><title>Linked</title><link>https://news.example/linked</link></item>
            </channel></rss>"#;
        let candidates = parse_feed(body.as_bytes(), "https://news.example/feed").unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].url, "https://news.example/linked");
    }

    #[test]
    fn test_parse_feed_prefers_alternate_link() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Blog</title>
  <id>tag:blog.example,2024:1</id>
  <updated>2024-05-01T00:00:00Z</updated>
  <entry>
    <id>tag:blog.example,2024:post-1</id>
    <title>Hospital AI goes live</title>
    <updated>2024-05-01T00:00:00Z</updated>
    <link rel="replies" type="application/atom+xml" href="https://blog.example/feeds/1/comments/default"/>
    <link rel="edit" type="application/atom+xml" href="https://blog.example/feeds/posts/default/1"/>
    <link rel="alternate" type="text/html" href="https://blog.example/2024/05/hospital-ai.html"/>
  </entry>
  <entry>
    <id>tag:blog.example,2024:post-2</id>
    <title>Only comments</title>
    <updated>2024-05-01T00:00:00Z</updated>
    <link rel="replies" href="https://blog.example/feeds/2/comments/default"/>
  </entry>
</feed>"#;
        let candidates = parse_feed(atom.as_bytes(), "https://blog.example/feeds/posts/default").unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].url, "https://blog.example/2024/05/hospital-ai.html");
        assert_eq!(candidates[0].title, "Hospital AI goes live");
        assert_eq!(candidates[1].url, "https://blog.example/feeds/2/comments/default");
    }

    #[test]
    fn test_parse_feed_rejects_garbage() {
        assert!(parse_feed(b"definitely not a feed", "https://news.example/feed").is_err());
    }

    #[test]
    fn test_parse_listing_filters_anchors() {
        let html = r#"
            <html><body>
                <a href="/">Home</a>
                <a href="/articles/ai-in-hospitals">AI in hospitals cuts wait times</a>
                <a href="https://other.example/deep-dive">A long external deep dive</a>
                <a href="mailto:desk@news.example">Contact the news desk</a>
                <a href="javascript:void(0)">Open the menu please</a>
                <a>Anchor without an href at all</a>
                <a href="/articles/short">Short</a>
            </body></html>
        "#;
        let candidates = parse_listing(html, "https://news.example/list").unwrap();
        let urls: Vec<_> = candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://news.example/articles/ai-in-hospitals", "https://other.example/deep-dive"]
        );
        assert_eq!(candidates[0].title, "AI in hospitals cuts wait times");
        assert_eq!(candidates[0].summary, "");
    }

    #[test]
    fn test_parse_listing_caps_anchors() {
        let anchors: String = (0..100)
            .map(|i| format!("<a href=\"/a/{i}\">Article number {i}</a>"))
            .collect();
        let html = format!("<html><body>{anchors}</body></html>");
        let candidates = parse_listing(&html, "https://news.example/").unwrap();
        assert_eq!(candidates.len(), LISTING_ANCHOR_LIMIT);
    }

    #[test]
    fn test_parse_listing_honors_base_tag() {
        let html = r#"<html><head><base href="https://cdn.example/news/"></head>
            <body><a href="story.html">A story worth reading</a></body></html>"#;
        let candidates = parse_listing(html, "https://news.example/list").unwrap();
        assert_eq!(candidates[0].url, "https://cdn.example/news/story.html");
    }

    #[test]
    fn test_dedupe_preserves_first_seen_order() {
        let c = |url: &str, title: &str| Candidate::new(url, title, "").unwrap();
        let deduped = dedupe_by_url(vec![
            c("https://a.example/1", "first"),
            c("https://a.example/2", "second"),
            c("https://a.example/1", "again"),
        ]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].title, "first");
        assert_eq!(deduped[1].url, "https://a.example/2");
    }

    #[tokio::test]
    async fn test_collect_merges_sources_and_survives_failures() {
        let listing = r#"<html><body>
            <a href="https://news.example/story-1">Story one seen on the listing</a>
            <a href="https://news.example/only-listing">Only on the listing page</a>
        </body></html>"#;
        let fetcher = StaticFetcher::new()
            .with_page("https://news.example/feed", rss(2))
            .with_page("https://news.example/list", listing);
        let collector = Collector::new(Arc::new(fetcher));

        let sources = Sources {
            rss: vec!["https://down.example/feed".to_string(), "https://news.example/feed".to_string()],
            list_pages: vec!["https://news.example/list".to_string()],
        };
        let collection = collector.collect(&sources).await;

        let urls: Vec<_> = collection.candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://news.example/story-0",
                "https://news.example/story-1",
                "https://news.example/only-listing",
            ]
        );
        // The feed copy wins over the listing copy.
        assert_eq!(collection.candidates[1].title, "Story 1");
        assert_eq!(collection.sources.len(), 3);
        assert_eq!(collection.failed_sources(), 1);
        assert!(matches!(collection.sources[0].result, Err(SkipReason::FetchFailed(_))));
    }
}
