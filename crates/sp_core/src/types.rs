use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::text::content_hash;
use crate::{Error, Result};

/// One of the three daily publication windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Slot {
    First,
    Second,
    Third,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::First, Slot::Second, Slot::Third];

    pub fn number(self) -> u8 {
        match self {
            Slot::First => 1,
            Slot::Second => 2,
            Slot::Third => 3,
        }
    }
}

impl TryFrom<u8> for Slot {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Slot::First),
            2 => Ok(Slot::Second),
            3 => Ok(Slot::Third),
            other => Err(Error::Validation(format!("slot must be 1, 2 or 3, got {}", other))),
        }
    }
}

impl From<Slot> for u8 {
    fn from(slot: Slot) -> Self {
        slot.number()
    }
}

impl FromStr for Slot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let value: u8 = s
            .trim()
            .parse()
            .map_err(|_| Error::Validation(format!("invalid slot: {:?}", s)))?;
        Slot::try_from(value)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// A raw article reference produced by the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    pub summary: String,
}

impl Candidate {
    pub fn new(url: impl Into<String>, title: impl Into<String>, summary: impl Into<String>) -> Result<Self> {
        let url = url.into();
        require_url(&url)?;
        Ok(Self {
            url,
            title: title.into(),
            summary: summary.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedArticle {
    pub url: String,
    pub title: String,
    pub body: String,
    pub image_url: Option<String>,
}

impl ExtractedArticle {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        image_url: Option<String>,
    ) -> Result<Self> {
        let url = url.into();
        require_url(&url)?;
        Ok(Self {
            url,
            title: title.into(),
            body: body.into(),
            image_url,
        })
    }
}

/// What the ranker concluded about an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub score: f64,
    pub topic: String,
    pub person: Option<String>,
    pub image_source: Option<String>,
}

/// A ranked article waiting in the selection queue, keyed by `article_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedArticle {
    pub article_hash: String,
    pub article_url: String,
    pub title: String,
    pub body: String,
    pub topic: String,
    pub person: Option<String>,
    pub image_url: Option<String>,
    pub image_source: Option<String>,
    pub score: f64,
    pub selected_at: DateTime<Utc>,
}

impl QueuedArticle {
    /// Builds the queue row for a ranked article. The hash is always derived
    /// from the article URL.
    pub fn from_ranked(article: ExtractedArticle, ranking: Ranking, selected_at: DateTime<Utc>) -> Result<Self> {
        require_url(&article.url)?;
        if !ranking.score.is_finite() {
            return Err(Error::Validation(format!("non-finite score for {}", article.url)));
        }
        Ok(Self {
            article_hash: content_hash(&article.url),
            article_url: article.url,
            title: article.title,
            body: article.body,
            topic: ranking.topic,
            person: ranking.person,
            image_url: article.image_url,
            image_source: ranking.image_source,
            score: ranking.score,
            selected_at,
        })
    }
}

/// A publication about to be recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPost {
    pub article_url: String,
    pub article_hash: String,
    pub topic: String,
    pub person: Option<String>,
    pub slot: Slot,
    pub text: String,
    pub tweet_id: Option<String>,
    pub image_source: Option<String>,
    pub posted_at: DateTime<Utc>,
}

impl NewPost {
    pub fn for_article(
        article: &QueuedArticle,
        slot: Slot,
        text: impl Into<String>,
        tweet_id: Option<String>,
        posted_at: DateTime<Utc>,
    ) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::Validation(format!("empty post text for {}", article.article_url)));
        }
        Ok(Self {
            article_url: article.article_url.clone(),
            article_hash: article.article_hash.clone(),
            topic: article.topic.clone(),
            person: article.person.clone(),
            slot,
            text,
            tweet_id,
            image_source: article.image_source.clone(),
            posted_at,
        })
    }
}

/// A row of the append-only publication log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedPost {
    pub id: i64,
    pub article_url: String,
    pub article_hash: String,
    pub topic: String,
    pub person: Option<String>,
    pub slot: Slot,
    pub text: String,
    pub tweet_id: Option<String>,
    pub image_source: Option<String>,
    pub posted_at: DateTime<Utc>,
}

impl PublishedPost {
    pub fn from_new(id: i64, post: NewPost) -> Self {
        Self {
            id,
            article_url: post.article_url,
            article_hash: post.article_hash,
            topic: post.topic,
            person: post.person,
            slot: post.slot,
            text: post.text,
            tweet_id: post.tweet_id,
            image_source: post.image_source,
            posted_at: post.posted_at,
        }
    }
}

/// Which published post an article collided with.
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateReason {
    Hash,
    Url,
    Person(String),
    Topic { previous: String, similarity: f64 },
}

impl fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateReason::Hash => write!(f, "article hash already published"),
            DuplicateReason::Url => write!(f, "article URL already published"),
            DuplicateReason::Person(person) => write!(f, "person {} already featured", person),
            DuplicateReason::Topic { previous, similarity } => {
                write!(f, "topic too close to {:?} ({:.2})", previous, similarity)
            }
        }
    }
}

/// Why one source or candidate was left out of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    FetchFailed(String),
    ParseFailed(String),
    ExtractionFailed(String),
    TooShort { chars: usize, minimum: usize },
    NearDuplicate(DuplicateReason),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::FetchFailed(e) => write!(f, "fetch failed: {}", e),
            SkipReason::ParseFailed(e) => write!(f, "parse failed: {}", e),
            SkipReason::ExtractionFailed(e) => write!(f, "extraction failed: {}", e),
            SkipReason::TooShort { chars, minimum } => {
                write!(f, "body too short ({} < {} chars)", chars, minimum)
            }
            SkipReason::NearDuplicate(reason) => write!(f, "near duplicate: {}", reason),
        }
    }
}

/// Per-item result: accepted value or the reason it was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome<T> {
    pub item: String,
    pub result: std::result::Result<T, SkipReason>,
}

impl<T> ItemOutcome<T> {
    pub fn accepted(item: impl Into<String>, value: T) -> Self {
        Self {
            item: item.into(),
            result: Ok(value),
        }
    }

    pub fn skipped(item: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            item: item.into(),
            result: Err(reason),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.result.is_ok()
    }
}

fn require_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(Error::InvalidUrl("empty URL".to_string()));
    }
    Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
    Ok(())
}
