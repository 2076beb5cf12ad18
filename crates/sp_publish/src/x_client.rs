//! Social-network client: chunked media upload and post creation, signed
//! with OAuth 1.0a user-context credentials.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use oauth1_request as oauth;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sp_core::{with_retry, Error, Publisher, Result, RetryPolicy, RunSettings, XCredentials};

pub const UPLOAD_URL: &str = "https://upload.twitter.com/1.1/media/upload.json";
pub const POST_URL: &str = "https://api.twitter.com/2/tweets";
pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;
pub const API_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_CHARS: usize = 300;

#[derive(Deserialize)]
struct InitResponse {
    media_id_string: String,
}

#[derive(Deserialize)]
struct CreateResponse {
    data: Option<CreatedPost>,
}

#[derive(Deserialize)]
struct CreatedPost {
    id: String,
}

/// Form parameters are part of the signature base string.
#[derive(oauth::Request)]
struct InitParams<'a> {
    command: &'a str,
    media_type: &'a str,
    total_bytes: usize,
}

#[derive(oauth::Request)]
struct FinalizeParams<'a> {
    command: &'a str,
    media_id: &'a str,
}

enum Mode {
    DryRun,
    Live { token: oauth::Token },
}

pub struct XClient {
    client: reqwest::Client,
    mode: Mode,
    retry: RetryPolicy,
    upload_url: String,
    post_url: String,
}

impl fmt::Debug for XClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("XClient")
            .field("dry_run", &self.is_dry_run())
            .field("credentials", &"<redacted>")
            .field("upload_url", &self.upload_url)
            .field("post_url", &self.post_url)
            .finish()
    }
}

impl XClient {
    /// Logs instead of calling the API; never returns identifiers.
    pub fn dry_run() -> Self {
        Self {
            client: reqwest::Client::new(),
            mode: Mode::DryRun,
            retry: RetryPolicy::default(),
            upload_url: UPLOAD_URL.to_string(),
            post_url: POST_URL.to_string(),
        }
    }

    pub fn live(credentials: XCredentials, retry: RetryPolicy) -> Result<Self> {
        let missing = credentials.missing();
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "{} required when DRY_RUN=false",
                missing.join(", ")
            )));
        }
        let token = oauth::Token::from_parts(
            credentials.api_key,
            credentials.api_secret,
            credentials.access_token,
            credentials.access_token_secret,
        );
        let client = reqwest::Client::builder().timeout(API_TIMEOUT).build()?;
        Ok(Self {
            client,
            mode: Mode::Live { token },
            retry,
            upload_url: UPLOAD_URL.to_string(),
            post_url: POST_URL.to_string(),
        })
    }

    pub fn from_settings(settings: &RunSettings) -> Result<Self> {
        if settings.dry_run {
            return Ok(Self::dry_run());
        }
        Self::live(settings.x_credentials.clone(), RetryPolicy::default())
    }

    /// Points the client at other endpoints, e.g. a local test server.
    pub fn with_endpoints(mut self, upload_url: impl Into<String>, post_url: impl Into<String>) -> Self {
        self.upload_url = upload_url.into();
        self.post_url = post_url.into();
        self
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self.mode, Mode::DryRun)
    }

    /// A POST carrying a fresh OAuth header. Only form parameters are
    /// signed; multipart and JSON bodies sign as `()`.
    fn signed_post<R>(&self, token: &oauth::Token, url: &str, params: &R) -> reqwest::RequestBuilder
    where
        R: oauth::Request + ?Sized,
    {
        let authorization = oauth::post(url, params, token, oauth::HmacSha1::new());
        self.client.post(url).header(AUTHORIZATION, authorization)
    }

    fn signed_form<R>(&self, token: &oauth::Token, url: &str, params: &R) -> reqwest::RequestBuilder
    where
        R: oauth::Request + ?Sized,
    {
        self.signed_post(token, url, params)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(oauth::to_form(params))
    }

    /// Sends with retries; any status >= 400 counts as a failed attempt.
    /// `build` runs once per attempt so every attempt gets its own nonce.
    async fn send<F>(&self, what: &str, build: F) -> Result<String>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let build = &build;
        with_retry(&self.retry, what, move || async move {
            let response = build().send().await?;
            let status = response.status();
            let body = response.text().await?;
            if status.as_u16() >= 400 {
                let excerpt: String = body.chars().take(ERROR_BODY_CHARS).collect();
                return Err(Error::Publish(format!("X API error {}: {}", status.as_u16(), excerpt)));
            }
            Ok(body)
        })
        .await
    }

    async fn upload_chunked(&self, token: &oauth::Token, bytes: Vec<u8>) -> Result<String> {
        let init = InitParams {
            command: "INIT",
            media_type: "image/jpeg",
            total_bytes: bytes.len(),
        };
        let body = self
            .send("media INIT", || self.signed_form(token, &self.upload_url, &init))
            .await?;
        let media_id = serde_json::from_str::<InitResponse>(&body)?.media_id_string;

        for (segment, chunk) in bytes.chunks(CHUNK_SIZE).enumerate() {
            let segment = segment.to_string();
            self.send("media APPEND", || {
                let form = Form::new()
                    .text("command", "APPEND")
                    .text("media_id", media_id.clone())
                    .text("segment_index", segment.clone())
                    .part("media", Part::bytes(chunk.to_vec()));
                self.signed_post(token, &self.upload_url, &()).multipart(form)
            })
            .await?;
        }

        let finalize = FinalizeParams {
            command: "FINALIZE",
            media_id: &media_id,
        };
        self.send("media FINALIZE", || self.signed_form(token, &self.upload_url, &finalize))
            .await?;

        Ok(media_id)
    }
}

#[async_trait]
impl Publisher for XClient {
    fn name(&self) -> &str {
        "x"
    }

    async fn upload_media(&self, path: &Path) -> Result<Option<String>> {
        let token = match &self.mode {
            Mode::DryRun => {
                tracing::info!("[DRY_RUN] skip media upload: {}", path.display());
                return Ok(None);
            }
            Mode::Live { token } => token,
        };
        let bytes = tokio::fs::read(path).await?;
        let media_id = self.upload_chunked(token, bytes).await?;
        tracing::info!(media_id = %media_id, "media uploaded");
        Ok(Some(media_id))
    }

    async fn create_post(&self, text: &str, media_id: Option<&str>) -> Result<Option<String>> {
        let mut payload = serde_json::json!({ "text": text });
        if let Some(id) = media_id {
            payload["media"] = serde_json::json!({ "media_ids": [id] });
        }

        let token = match &self.mode {
            Mode::DryRun => {
                tracing::info!("[DRY_RUN] post: {}", text);
                return Ok(None);
            }
            Mode::Live { token } => token,
        };

        let body = self
            .send("create post", || self.signed_post(token, &self.post_url, &()).json(&payload))
            .await?;
        let created: CreateResponse = serde_json::from_str(&body)?;
        Ok(created.data.map(|d| d.id))
    }
}
