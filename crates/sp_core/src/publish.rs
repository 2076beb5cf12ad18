//! Outbound collaborators of the pipeline: text templating, thumbnail
//! rendering and the social-network client.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::config::Rules;
use crate::types::{QueuedArticle, Slot};
use crate::Result;

/// The three slot-specific texts rendered for one article.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotTexts {
    pub first: String,
    pub second: String,
    pub third: String,
}

impl SlotTexts {
    pub fn get(&self, slot: Slot) -> &str {
        match slot {
            Slot::First => &self.first,
            Slot::Second => &self.second,
            Slot::Third => &self.third,
        }
    }
}

pub trait PostWriter: Send + Sync {
    fn write_posts(&self, article: &QueuedArticle, rules: &Rules) -> SlotTexts;
}

#[async_trait]
pub trait ThumbnailRenderer: Send + Sync {
    /// Renders a card for `article` into `out_path` and returns the written path.
    async fn render(&self, article: &QueuedArticle, allow_image: bool, out_path: &Path) -> Result<PathBuf>;
}

/// Social-network client. In dry-run mode both calls succeed with `None`.
#[async_trait]
pub trait Publisher: Send + Sync {
    fn name(&self) -> &str;

    async fn upload_media(&self, path: &Path) -> Result<Option<String>>;

    async fn create_post(&self, text: &str, media_id: Option<&str>) -> Result<Option<String>>;
}
