use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sp_core::storage::window_start;
use sp_core::{Error, NewPost, PostStore, PublishedPost, QueuedArticle, Result, Slot};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        article_url TEXT NOT NULL,
        article_hash TEXT NOT NULL,
        topic TEXT,
        person TEXT,
        slot INTEGER NOT NULL,
        text TEXT NOT NULL,
        tweet_id TEXT,
        image_source TEXT,
        posted_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS article_queue (
        article_hash TEXT PRIMARY KEY,
        article_url TEXT NOT NULL,
        title TEXT NOT NULL,
        body TEXT NOT NULL,
        topic TEXT,
        person TEXT,
        image_url TEXT,
        image_source TEXT,
        score REAL,
        selected_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_posts_posted_at ON posts(posted_at)",
    // Add future migrations here
];

pub struct SQLiteStorage {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create database directory: {}", e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        // One connection: the pipeline is the only writer and never runs queries concurrently.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(db_error("Failed to connect to database"))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", i, e)))?;
        }

        tracing::debug!(path = %db_path.display(), "sqlite store ready");

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> Error {
    move |e| Error::Database(format!("{}: {}", context, e))
}

pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("Failed to parse timestamp {:?}: {}", raw, e)))
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get::<T, _>(name)
        .map_err(|e| Error::Database(format!("Failed to read column {}: {}", name, e)))
}

fn queued_from_row(row: &SqliteRow) -> Result<QueuedArticle> {
    Ok(QueuedArticle {
        article_hash: column(row, "article_hash")?,
        article_url: column(row, "article_url")?,
        title: column(row, "title")?,
        body: column(row, "body")?,
        topic: column::<Option<String>>(row, "topic")?.unwrap_or_default(),
        person: column(row, "person")?,
        image_url: column(row, "image_url")?,
        image_source: column(row, "image_source")?,
        score: column::<Option<f64>>(row, "score")?.unwrap_or(0.0),
        selected_at: parse_timestamp(&column::<String>(row, "selected_at")?)?,
    })
}

fn post_from_row(row: &SqliteRow) -> Result<PublishedPost> {
    let slot: i64 = column(row, "slot")?;
    let slot = u8::try_from(slot)
        .map_err(|_| Error::Database(format!("slot out of range: {}", slot)))
        .and_then(Slot::try_from)?;

    Ok(PublishedPost {
        id: column(row, "id")?,
        article_url: column(row, "article_url")?,
        article_hash: column(row, "article_hash")?,
        topic: column::<Option<String>>(row, "topic")?.unwrap_or_default(),
        person: column(row, "person")?,
        slot,
        text: column(row, "text")?,
        tweet_id: column(row, "tweet_id")?,
        image_source: column(row, "image_source")?,
        posted_at: parse_timestamp(&column::<String>(row, "posted_at")?)?,
    })
}

#[async_trait]
impl PostStore for SQLiteStorage {
    async fn upsert_queued(&self, article: &QueuedArticle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO article_queue
            (article_hash, article_url, title, body, topic, person, image_url, image_source, score, selected_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(article_hash) DO UPDATE SET
                article_url = excluded.article_url,
                title = excluded.title,
                body = excluded.body,
                topic = excluded.topic,
                person = excluded.person,
                image_url = excluded.image_url,
                image_source = excluded.image_source,
                score = excluded.score,
                selected_at = excluded.selected_at
            "#,
        )
        .bind(&article.article_hash)
        .bind(&article.article_url)
        .bind(&article.title)
        .bind(&article.body)
        .bind(&article.topic)
        .bind(article.person.as_deref())
        .bind(article.image_url.as_deref())
        .bind(article.image_source.as_deref())
        .bind(article.score)
        .bind(format_timestamp(article.selected_at))
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to upsert queued article"))?;

        Ok(())
    }

    async fn best_candidate(&self) -> Result<Option<QueuedArticle>> {
        let row = sqlx::query("SELECT * FROM article_queue ORDER BY score DESC, selected_at DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to select best candidate"))?;

        row.as_ref().map(queued_from_row).transpose()
    }

    async fn queued(&self, article_hash: &str) -> Result<Option<QueuedArticle>> {
        let row = sqlx::query("SELECT * FROM article_queue WHERE article_hash = ?")
            .bind(article_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get queued article"))?;

        row.as_ref().map(queued_from_row).transpose()
    }

    async fn queue_len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM article_queue")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to count queue"))?;
        Ok(count.max(0) as usize)
    }

    async fn recently_published_hash(&self, article_hash: &str, window_days: u32, now: DateTime<Utc>) -> Result<bool> {
        let since = format_timestamp(window_start(window_days, now));
        let row = sqlx::query("SELECT 1 FROM posts WHERE article_hash = ? AND posted_at >= ? LIMIT 1")
            .bind(article_hash)
            .bind(since)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to check published hash"))?;
        Ok(row.is_some())
    }

    async fn recent_posts(&self, window_days: u32, now: DateTime<Utc>) -> Result<Vec<PublishedPost>> {
        let since = format_timestamp(window_start(window_days, now));
        let rows = sqlx::query("SELECT * FROM posts WHERE posted_at >= ? ORDER BY id")
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to get recent posts"))?;

        rows.iter().map(post_from_row).collect()
    }

    async fn last_published_at(&self) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = sqlx::query_scalar("SELECT posted_at FROM posts ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to get last post time"))?;

        raw.as_deref().map(parse_timestamp).transpose()
    }

    async fn save_published(&self, post: &NewPost) -> Result<PublishedPost> {
        let result = sqlx::query(
            r#"
            INSERT INTO posts
            (article_url, article_hash, topic, person, slot, text, tweet_id, image_source, posted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.article_url)
        .bind(&post.article_hash)
        .bind(&post.topic)
        .bind(post.person.as_deref())
        .bind(i64::from(post.slot.number()))
        .bind(&post.text)
        .bind(post.tweet_id.as_deref())
        .bind(post.image_source.as_deref())
        .bind(format_timestamp(post.posted_at))
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to save post"))?;

        Ok(PublishedPost::from_new(result.last_insert_rowid(), post.clone()))
    }

    async fn published_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("Failed to count posts"))?;
        Ok(count.max(0) as usize)
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::debug!(path = %self.get_db_path().display(), "sqlite store closed");
    }
}
