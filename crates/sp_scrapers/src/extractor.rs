//! Article extraction: readability main-content pass with a full-page text
//! fallback.

use std::io::Cursor;
use std::sync::Arc;

use scraper::{ElementRef, Html, Node, Selector};
use sp_core::{Candidate, Error, ExtractedArticle, Result};
use url::Url;

use crate::fetcher::{Fetch, ARTICLE_TIMEOUT};

/// Readable text shorter than this is treated as an under-extraction.
pub const MIN_READABLE_CHARS: usize = 300;
/// Length cap of the full-page fallback text.
pub const FALLBACK_MAX_CHARS: usize = 10_000;

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template", "svg"];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "br", "dd", "div", "dl", "dt", "figcaption", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre",
    "section", "table", "td", "th", "title", "tr", "ul",
];

pub struct Extractor {
    fetcher: Arc<dyn Fetch>,
}

impl Extractor {
    pub fn new(fetcher: Arc<dyn Fetch>) -> Self {
        Self { fetcher }
    }

    /// Fetches the candidate's page and reduces it to an article record.
    pub async fn extract(&self, candidate: &Candidate) -> Result<ExtractedArticle> {
        let body = self.fetcher.fetch(&candidate.url, ARTICLE_TIMEOUT).await?;
        let html = String::from_utf8_lossy(&body);
        let article = extract_from_html(&html, &candidate.url, &candidate.title)?;
        tracing::debug!(
            url = %candidate.url,
            chars = article.body.chars().count(),
            has_image = article.image_url.is_some(),
            "article extracted"
        );
        Ok(article)
    }
}

/// Runs the extraction over an already fetched page. `fallback_title` is used
/// when the page yields no title of its own.
pub fn extract_from_html(html: &str, url: &str, fallback_title: &str) -> Result<ExtractedArticle> {
    let page_url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;

    let mut cursor = Cursor::new(html.as_bytes());
    let product = readability::extractor::extract(&mut cursor, &page_url)
        .map_err(|e| Error::Extraction(format!("readability failed for {}: {}", url, e)))?;

    let fragment = Html::parse_fragment(&product.content);
    let readable = block_text(fragment.root_element());
    let body = choose_body(readable, || page_text(html));

    let title = match product.title.trim() {
        "" => fallback_title.trim().to_string(),
        title => title.to_string(),
    };

    ExtractedArticle::new(url, title, body, first_image(&fragment))
}

/// Keeps the readable text unless it is too short, in which case the
/// truncated full-page text is used instead.
pub fn choose_body<F>(readable: String, page_text: F) -> String
where
    F: FnOnce() -> String,
{
    if readable.chars().count() >= MIN_READABLE_CHARS {
        return readable;
    }
    page_text().chars().take(FALLBACK_MAX_CHARS).collect()
}

/// Plain text of a whole document, one line per block.
pub fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    block_text(document.root_element())
}

/// First `<img>` whose `src` is an absolute HTTP(S) URL.
pub fn first_image(fragment: &Html) -> Option<String> {
    let selector = Selector::parse("img[src]").ok()?;
    let img = fragment.select(&selector).next()?;
    let src = img.value().attr("src")?.trim();
    let parsed = Url::parse(src).ok()?;
    matches!(parsed.scheme(), "http" | "https").then(|| src.to_string())
}

/// Flattens an element to text, breaking lines at block elements and
/// collapsing whitespace inside each line. Empty lines are dropped.
pub fn block_text(root: ElementRef) -> String {
    let mut raw = String::new();
    walk(root, &mut raw);

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn walk(element: ElementRef, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }
    let block = BLOCK_TAGS.contains(&name);
    if block {
        out.push('\n');
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c })),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    walk(child, out);
                }
            }
            _ => {}
        }
    }
    if block {
        out.push('\n');
    }
}
