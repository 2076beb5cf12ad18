use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::types::{NewPost, PublishedPost, QueuedArticle};
use crate::Result;

/// Durable selection queue plus the publication log.
///
/// Every mutating call commits before returning. A single writer process is
/// assumed; nothing here locks across processes.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Insert or fully replace the queue row with the same `article_hash`.
    async fn upsert_queued(&self, article: &QueuedArticle) -> Result<()>;

    /// Highest score first, most recent `selected_at` on ties.
    async fn best_candidate(&self) -> Result<Option<QueuedArticle>>;

    async fn queued(&self, article_hash: &str) -> Result<Option<QueuedArticle>>;

    async fn queue_len(&self) -> Result<usize>;

    /// Whether a post with this hash was published at or after `now - window_days`.
    async fn recently_published_hash(&self, article_hash: &str, window_days: u32, now: DateTime<Utc>) -> Result<bool>;

    async fn recent_posts(&self, window_days: u32, now: DateTime<Utc>) -> Result<Vec<PublishedPost>>;

    /// `posted_at` of the most recently appended post.
    async fn last_published_at(&self) -> Result<Option<DateTime<Utc>>>;

    /// Append a post; returns it with its assigned id.
    async fn save_published(&self, post: &NewPost) -> Result<PublishedPost>;

    async fn published_count(&self) -> Result<usize>;

    /// Release connections. Further calls may fail.
    async fn close(&self);
}

/// Start of a lookback window of `window_days` ending at `now`.
pub fn window_start(window_days: u32, now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(i64::from(window_days))
}
