pub mod config;
pub mod error;
pub mod logging;
pub mod publish;
pub mod retry;
pub mod storage;
pub mod text;
pub mod types;

pub use config::{ContentConfig, Person, Rules, RunSettings, SlotPolicy, Sources, XCredentials};
pub use error::{Error, Result};
pub use logging::RunLogger;
pub use publish::{PostWriter, Publisher, SlotTexts, ThumbnailRenderer};
pub use retry::{with_retry, RetryPolicy};
pub use storage::PostStore;
pub use types::{
    Candidate, DuplicateReason, ExtractedArticle, ItemOutcome, NewPost, PublishedPost, QueuedArticle, Ranking,
    SkipReason, Slot,
};

pub mod prelude {
    pub use super::{Error, PostStore, Result};
    pub use super::types::*;
}
