//! One pipeline run: gate, refill, pick, write, publish, record.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sp_core::text::normalize;
use sp_core::{
    Candidate, ContentConfig, Error, ItemOutcome, NewPost, PostStore, PostWriter, Publisher, PublishedPost,
    QueuedArticle, Result, RunLogger, RunSettings, SkipReason, Slot, ThumbnailRenderer,
};
use sp_scrapers::{Collector, Extractor, Fetch};

use crate::dedup::near_duplicate;
use crate::policy::apply_image_policy;
use crate::ranker::rank;
use crate::scheduler::{cooldown_elapsed, current_slot};
use crate::writer::TemplateWriter;

/// Articles whose normalized body is shorter than this never enter the queue.
pub const MIN_BODY_CHARS: usize = 400;

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    OutsideSlot,
    CooldownActive,
    QueueEmpty,
    Published {
        slot: Slot,
        post_id: i64,
        tweet_id: Option<String>,
    },
}

/// Per-source and per-candidate results of a queue refill.
#[derive(Debug, Default)]
pub struct RefillReport {
    pub sources: Vec<ItemOutcome<usize>>,
    /// Accepted candidates carry their score.
    pub articles: Vec<ItemOutcome<f64>>,
}

impl RefillReport {
    pub fn queued(&self) -> usize {
        self.articles.iter().filter(|a| a.is_accepted()).count()
    }

    pub fn skipped(&self) -> usize {
        self.articles.len() - self.queued()
    }
}

pub struct Pipeline {
    store: Arc<dyn PostStore>,
    collector: Collector,
    extractor: Extractor,
    writer: Arc<dyn PostWriter>,
    renderer: Arc<dyn ThumbnailRenderer>,
    publisher: Arc<dyn Publisher>,
    content: ContentConfig,
    settings: RunSettings,
    logger: RunLogger,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn PostStore>,
        fetcher: Arc<dyn Fetch>,
        renderer: Arc<dyn ThumbnailRenderer>,
        publisher: Arc<dyn Publisher>,
        content: ContentConfig,
        settings: RunSettings,
    ) -> Self {
        Self {
            store,
            collector: Collector::new(fetcher.clone()),
            extractor: Extractor::new(fetcher),
            writer: Arc::new(TemplateWriter::new()),
            renderer,
            publisher,
            content,
            settings,
            logger: RunLogger::new().with_prefix("[run]"),
        }
    }

    pub fn with_writer(mut self, writer: Arc<dyn PostWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_logger(mut self, logger: RunLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Runs against the wall clock, bounded by the configured run timeout.
    pub async fn run(&self, slot_override: Option<Slot>) -> Result<RunOutcome> {
        let run = self.run_at(slot_override, Utc::now());
        match self.settings.run_timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| Error::Timeout(format!("pipeline run exceeded {:?}", limit)))?,
            None => run.await,
        }
    }

    /// Runs with `now` as the current time. An explicit `slot_override`
    /// wins over the configured forced slot, which wins over the gate.
    pub async fn run_at(&self, slot_override: Option<Slot>, now: DateTime<Utc>) -> Result<RunOutcome> {
        let local_now = now.with_timezone(&self.settings.timezone);
        let slot = match slot_override
            .or(self.settings.forced_slot)
            .or_else(|| current_slot(local_now, &self.settings.slot_policy))
        {
            Some(slot) => slot,
            None => {
                self.logger
                    .info(&format!("⏸️ Outside every slot window at {}. Skip.", local_now.format("%H:%M %Z")));
                return Ok(RunOutcome::OutsideSlot);
            }
        };
        let logger = self.logger.clone().with_prefix(format!("[slot {}]", slot));

        let last = self.store.last_published_at().await?;
        if !cooldown_elapsed(last, now, self.settings.cooldown) {
            logger.info("🧊 Cooldown active. Skip posting.");
            return Ok(RunOutcome::CooldownActive);
        }

        let report = self.refill(now).await?;
        logger.info(&format!(
            "📥 Refill done: {} queued, {} skipped, {} of {} sources failed",
            report.queued(),
            report.skipped(),
            report.sources.iter().filter(|s| !s.is_accepted()).count(),
            report.sources.len()
        ));

        let Some(best) = self.store.best_candidate().await? else {
            logger.warn("No queue candidate found.");
            return Ok(RunOutcome::QueueEmpty);
        };
        logger.info(&format!("🏆 Picked {} (score {:.1}, {})", best.article_url, best.score, best.topic));

        let saved = self.publish(&best, slot, now, &logger).await?;
        logger.info(&format!(
            "✅ Posted. post_id={} tweet_id={}",
            saved.id,
            saved.tweet_id.as_deref().unwrap_or("-")
        ));

        Ok(RunOutcome::Published {
            slot,
            post_id: saved.id,
            tweet_id: saved.tweet_id,
        })
    }

    /// Collect, extract, filter, rank, dedupe and upsert. Failures local to a
    /// source or candidate are recorded in the report; store failures abort.
    pub async fn refill(&self, now: DateTime<Utc>) -> Result<RefillReport> {
        let collection = self.collector.collect(&self.content.sources).await;
        self.logger
            .info(&format!("🔎 Collected {} candidates", collection.candidates.len()));

        let recent = self.store.recent_posts(self.settings.dedupe_days, now).await?;
        let mut report = RefillReport {
            sources: collection.sources,
            articles: Vec::with_capacity(collection.candidates.len()),
        };

        for candidate in &collection.candidates {
            let outcome = match self.prepare(candidate, now).await {
                Ok(article) => self.admit(article, &recent, now).await?,
                Err(reason) => Err(reason),
            };
            if let Err(reason) = &outcome {
                tracing::debug!(url = %candidate.url, %reason, "candidate skipped");
            }
            report.articles.push(ItemOutcome {
                item: candidate.url.clone(),
                result: outcome,
            });
        }

        Ok(report)
    }

    /// Extraction, length filter and ranking for one candidate.
    async fn prepare(&self, candidate: &Candidate, now: DateTime<Utc>) -> std::result::Result<QueuedArticle, SkipReason> {
        let article = self
            .extractor
            .extract(candidate)
            .await
            .map_err(|e| SkipReason::ExtractionFailed(e.to_string()))?;

        let chars = normalize(&article.body).chars().count();
        if chars < MIN_BODY_CHARS {
            return Err(SkipReason::TooShort {
                chars,
                minimum: MIN_BODY_CHARS,
            });
        }

        let ranking = rank(&article, &self.content.people, &self.content.rules.themes);
        QueuedArticle::from_ranked(article, ranking, now).map_err(|e| SkipReason::ExtractionFailed(e.to_string()))
    }

    /// Near-duplicate gate then upsert. The outer `Result` carries store errors.
    async fn admit(
        &self,
        article: QueuedArticle,
        recent: &[PublishedPost],
        now: DateTime<Utc>,
    ) -> Result<std::result::Result<f64, SkipReason>> {
        let hash_published = self
            .store
            .recently_published_hash(&article.article_hash, self.settings.dedupe_days, now)
            .await?;
        if let Some(reason) = near_duplicate(&article, hash_published, recent) {
            return Ok(Err(SkipReason::NearDuplicate(reason)));
        }
        self.store.upsert_queued(&article).await?;
        Ok(Ok(article.score))
    }

    async fn publish(
        &self,
        article: &QueuedArticle,
        slot: Slot,
        now: DateTime<Utc>,
        logger: &RunLogger,
    ) -> Result<PublishedPost> {
        let texts = self.writer.write_posts(article, &self.content.rules);
        let text = texts.get(slot).to_string();

        let allow_image = self.settings.allow_image;
        let thumb = self
            .renderer
            .render(article, allow_image, &self.thumbnail_path(slot))
            .await?;
        logger.debug(&format!("thumbnail at {}", thumb.display()));

        logger.info(&format!("📤 Publishing via {}", self.publisher.name()));
        let media_id = self.publisher.upload_media(&thumb).await?;
        let tweet_id = self.publisher.create_post(&text, media_id.as_deref()).await?;

        let post = NewPost::for_article(article, slot, text, tweet_id, now)?;
        let post = apply_image_policy(post, allow_image);
        self.store.save_published(&post).await
    }

    fn thumbnail_path(&self, slot: Slot) -> PathBuf {
        self.settings.data_dir.join(format!("thumb_slot{}.jpg", slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sp_core::config::Sources;
    use sp_core::{ExtractedArticle, Ranking, SlotPolicy};
    use sp_scrapers::StaticFetcher;
    use sp_storage::MemoryStorage;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingPublisher {
        posts: Mutex<Vec<(String, Option<String>)>>,
        fail: bool,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        fn name(&self) -> &str {
            "recording"
        }

        async fn upload_media(&self, _path: &Path) -> Result<Option<String>> {
            Ok(Some("media-1".to_string()))
        }

        async fn create_post(&self, text: &str, media_id: Option<&str>) -> Result<Option<String>> {
            if self.fail {
                return Err(Error::Publish("status 503".to_string()));
            }
            self.posts
                .lock()
                .unwrap()
                .push((text.to_string(), media_id.map(str::to_string)));
            Ok(Some("tweet-1".to_string()))
        }
    }

    struct PathRenderer;

    #[async_trait]
    impl ThumbnailRenderer for PathRenderer {
        async fn render(&self, _article: &QueuedArticle, _allow_image: bool, out_path: &Path) -> Result<PathBuf> {
            Ok(out_path.to_path_buf())
        }
    }

    fn long_body(topic_word: &str) -> String {
        format!(
            "<p>{}</p>",
            format!("The {topic_word} team rolled out enterprise workflow automation, with measured productivity gains. ")
                .repeat(8)
        )
    }

    fn page(title: &str, body: &str) -> String {
        format!("<html><head><title>{title}</title></head><body><div class=\"article\">{body}</div></body></html>")
    }

    fn settings() -> RunSettings {
        RunSettings {
            slot_policy: SlotPolicy::FixedWindows,
            ..RunSettings::default()
        }
    }

    fn queued(url: &str, score: f64, topic: &str) -> QueuedArticle {
        let article = ExtractedArticle::new(url, "Queued title", "Queued body", None).unwrap();
        let ranking = Ranking {
            score,
            topic: topic.to_string(),
            person: Some("Ada".to_string()),
            image_source: Some("wikimedia".to_string()),
        };
        QueuedArticle::from_ranked(article, ranking, Utc::now()).unwrap()
    }

    fn pipeline(
        store: Arc<dyn PostStore>,
        fetcher: StaticFetcher,
        publisher: Arc<RecordingPublisher>,
        sources: Sources,
        settings: RunSettings,
    ) -> Pipeline {
        let content = ContentConfig {
            sources,
            ..ContentConfig::default()
        };
        Pipeline::new(store, Arc::new(fetcher), Arc::new(PathRenderer), publisher, content, settings)
    }

    #[tokio::test]
    async fn test_outside_slot_is_noop() {
        let store = Arc::new(MemoryStorage::new());
        store.upsert_queued(&queued("https://a.example/1", 5.0, "AI use-case")).await.unwrap();
        let publisher = Arc::new(RecordingPublisher::default());
        let p = pipeline(store.clone(), StaticFetcher::new(), publisher.clone(), Sources::default(), settings());

        // 03:00 in Tokyo
        let now = "2024-05-01T18:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(p.run_at(None, now).await.unwrap(), RunOutcome::OutsideSlot);
        assert_eq!(store.published_count().await.unwrap(), 0);
        assert!(publisher.posts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gate_picks_fixed_window_slot() {
        let store = Arc::new(MemoryStorage::new());
        store.upsert_queued(&queued("https://a.example/1", 5.0, "AI use-case")).await.unwrap();
        let publisher = Arc::new(RecordingPublisher::default());
        let p = pipeline(store.clone(), StaticFetcher::new(), publisher, Sources::default(), settings());

        // 21:30 in Tokyo
        let now = "2024-05-01T12:30:00Z".parse::<DateTime<Utc>>().unwrap();
        match p.run_at(None, now).await.unwrap() {
            RunOutcome::Published { slot, .. } => assert_eq!(slot, Slot::Third),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_queue_is_noop() {
        let store = Arc::new(MemoryStorage::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let p = pipeline(store.clone(), StaticFetcher::new(), publisher, Sources::default(), settings());

        assert_eq!(p.run_at(Some(Slot::First), Utc::now()).await.unwrap(), RunOutcome::QueueEmpty);
    }

    #[tokio::test]
    async fn test_publishes_with_image_policy() {
        let store = Arc::new(MemoryStorage::new());
        let article = queued("https://a.example/1", 5.0, "AI use-case");
        store.upsert_queued(&article).await.unwrap();
        let publisher = Arc::new(RecordingPublisher::default());
        let p = pipeline(store.clone(), StaticFetcher::new(), publisher.clone(), Sources::default(), settings());

        let outcome = p.run_at(Some(Slot::Second), Utc::now()).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Published {
                slot: Slot::Second,
                post_id: 1,
                tweet_id: Some("tweet-1".to_string()),
            }
        );

        let posts = publisher.posts.lock().unwrap().clone();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].0.starts_with("[Strategy]"));
        assert_eq!(posts[0].1.as_deref(), Some("media-1"));

        let recorded = store.recent_posts(1, Utc::now()).await.unwrap();
        assert_eq!(recorded[0].image_source.as_deref(), Some("no-face-card"));
        assert_eq!(recorded[0].person.as_deref(), Some("Ada"));
        assert_eq!(recorded[0].article_hash, article.article_hash);
    }

    #[tokio::test]
    async fn test_custom_writer_text_is_posted_for_slot() {
        struct SlotNameWriter;

        impl PostWriter for SlotNameWriter {
            fn write_posts(&self, article: &QueuedArticle, _rules: &sp_core::Rules) -> sp_core::SlotTexts {
                sp_core::SlotTexts {
                    first: format!("morning: {}", article.title),
                    second: format!("afternoon: {}", article.title),
                    third: format!("evening: {}", article.title),
                }
            }
        }

        let store = Arc::new(MemoryStorage::new());
        store.upsert_queued(&queued("https://a.example/1", 5.0, "AI use-case")).await.unwrap();
        let publisher = Arc::new(RecordingPublisher::default());
        let p = pipeline(store.clone(), StaticFetcher::new(), publisher.clone(), Sources::default(), settings())
            .with_writer(Arc::new(SlotNameWriter));

        p.run_at(Some(Slot::Third), Utc::now()).await.unwrap();
        let posts = publisher.posts.lock().unwrap().clone();
        assert_eq!(posts[0].0, "evening: Queued title");
        let recorded = store.recent_posts(1, Utc::now()).await.unwrap();
        assert_eq!(recorded[0].text, "evening: Queued title");
    }

    #[tokio::test]
    async fn test_publish_failure_records_nothing() {
        let store = Arc::new(MemoryStorage::new());
        store.upsert_queued(&queued("https://a.example/1", 5.0, "AI use-case")).await.unwrap();
        let publisher = Arc::new(RecordingPublisher {
            fail: true,
            ..RecordingPublisher::default()
        });
        let p = pipeline(store.clone(), StaticFetcher::new(), publisher, Sources::default(), settings());

        let result = p.run_at(Some(Slot::First), Utc::now()).await;
        assert!(matches!(result, Err(Error::Publish(_))));
        assert_eq!(store.published_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_refill_records_skips_and_queues() {
        let listing = r#"<html><body>
            <a href="https://news.example/long">A long hospital story</a>
            <a href="https://news.example/short">A very short story</a>
            <a href="https://news.example/missing">A story that is gone</a>
        </body></html>"#;
        let fetcher = StaticFetcher::new()
            .with_page("https://news.example/list", listing)
            .with_page("https://news.example/long", page("Hospital", &long_body("medical")))
            .with_page("https://news.example/short", page("Short", "<p>Too short to matter, honestly.</p>"));
        let sources = Sources {
            rss: vec!["https://down.example/feed".to_string()],
            list_pages: vec!["https://news.example/list".to_string()],
        };
        let store = Arc::new(MemoryStorage::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let p = pipeline(store.clone(), fetcher, publisher, sources, settings());

        let report = p.refill(Utc::now()).await.unwrap();
        assert_eq!(report.sources.len(), 2);
        assert_eq!(report.articles.len(), 3);
        assert_eq!(report.queued(), 1);
        assert!(matches!(report.articles[1].result, Err(SkipReason::TooShort { .. })));
        assert!(matches!(report.articles[2].result, Err(SkipReason::ExtractionFailed(_))));

        let best = store.best_candidate().await.unwrap().unwrap();
        assert_eq!(best.article_url, "https://news.example/long");
        assert_eq!(best.topic, "Medical AI");
        // enterprise, workflow, productivity
        assert_eq!(best.score, 1.5);
    }

    #[tokio::test]
    async fn test_refill_rejects_recent_duplicates() {
        let fetcher = StaticFetcher::new()
            .with_page("https://news.example/list", r#"<a href="https://news.example/long">A long hospital story</a>"#)
            .with_page("https://news.example/long", page("Hospital", &long_body("finance")));
        let sources = Sources {
            rss: vec![],
            list_pages: vec!["https://news.example/list".to_string()],
        };
        let store = Arc::new(MemoryStorage::new());
        let previous = queued("https://news.example/long", 1.0, "Medical AI");
        let post = NewPost::for_article(&previous, Slot::First, "old", None, Utc::now() - chrono::Duration::days(3)).unwrap();
        store.save_published(&post).await.unwrap();

        let publisher = Arc::new(RecordingPublisher::default());
        let p = pipeline(store.clone(), fetcher, publisher, sources, settings());
        let report = p.refill(Utc::now()).await.unwrap();

        assert_eq!(report.queued(), 0);
        assert!(matches!(report.articles[0].result, Err(SkipReason::NearDuplicate(_))));
        assert_eq!(store.queue_len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_timeout() {
        struct SlowRenderer;

        #[async_trait]
        impl ThumbnailRenderer for SlowRenderer {
            async fn render(&self, _article: &QueuedArticle, _allow: bool, out_path: &Path) -> Result<PathBuf> {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(out_path.to_path_buf())
            }
        }

        let store = Arc::new(MemoryStorage::new());
        store.upsert_queued(&queued("https://a.example/1", 5.0, "AI use-case")).await.unwrap();
        let settings = RunSettings {
            forced_slot: Some(Slot::First),
            run_timeout: Some(Duration::from_millis(20)),
            ..settings()
        };
        let p = Pipeline::new(
            store.clone(),
            Arc::new(StaticFetcher::new()),
            Arc::new(SlowRenderer),
            Arc::new(RecordingPublisher::default()),
            ContentConfig::default(),
            settings,
        );

        assert!(matches!(p.run(None).await, Err(Error::Timeout(_))));
        assert_eq!(store.published_count().await.unwrap(), 0);
    }
}
