use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sp_core::storage::window_start;
use sp_core::{NewPost, PostStore, PublishedPost, QueuedArticle, Result};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    queue: Vec<QueuedArticle>,
    posts: Vec<PublishedPost>,
}

impl MemoryStore {
    pub fn upsert_queued(&mut self, article: &QueuedArticle) {
        if let Some(existing) = self.queue.iter_mut().find(|a| a.article_hash == article.article_hash) {
            *existing = article.clone();
        } else {
            self.queue.push(article.clone());
        }
    }

    pub fn best_candidate(&self) -> Option<QueuedArticle> {
        self.queue
            .iter()
            .max_by(|a, b| {
                a.score
                    .total_cmp(&b.score)
                    .then_with(|| a.selected_at.cmp(&b.selected_at))
            })
            .cloned()
    }

    pub fn posts_since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &PublishedPost> {
        self.posts.iter().filter(move |p| p.posted_at >= since)
    }

    pub fn append(&mut self, post: &NewPost) -> PublishedPost {
        let id = self.posts.last().map(|p| p.id + 1).unwrap_or(1);
        let saved = PublishedPost::from_new(id, post.clone());
        self.posts.push(saved.clone());
        saved
    }
}

/// Process-local store. Nothing survives the process; used for tests and
/// throwaway dry runs.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PostStore for MemoryStorage {
    async fn upsert_queued(&self, article: &QueuedArticle) -> Result<()> {
        self.store.write().await.upsert_queued(article);
        Ok(())
    }

    async fn best_candidate(&self) -> Result<Option<QueuedArticle>> {
        Ok(self.store.read().await.best_candidate())
    }

    async fn queued(&self, article_hash: &str) -> Result<Option<QueuedArticle>> {
        let store = self.store.read().await;
        Ok(store.queue.iter().find(|a| a.article_hash == article_hash).cloned())
    }

    async fn queue_len(&self) -> Result<usize> {
        Ok(self.store.read().await.queue.len())
    }

    async fn recently_published_hash(&self, article_hash: &str, window_days: u32, now: DateTime<Utc>) -> Result<bool> {
        let store = self.store.read().await;
        let found = store
            .posts_since(window_start(window_days, now))
            .any(|p| p.article_hash == article_hash);
        Ok(found)
    }

    async fn recent_posts(&self, window_days: u32, now: DateTime<Utc>) -> Result<Vec<PublishedPost>> {
        let store = self.store.read().await;
        Ok(store.posts_since(window_start(window_days, now)).cloned().collect())
    }

    async fn last_published_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.store.read().await.posts.last().map(|p| p.posted_at))
    }

    async fn save_published(&self, post: &NewPost) -> Result<PublishedPost> {
        Ok(self.store.write().await.append(post))
    }

    async fn published_count(&self) -> Result<usize> {
        Ok(self.store.read().await.posts.len())
    }

    async fn close(&self) {}
}
