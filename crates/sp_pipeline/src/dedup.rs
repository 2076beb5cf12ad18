use sp_core::text::jaccard;
use sp_core::{DuplicateReason, PublishedPost, QueuedArticle};

/// Topic similarity at or above this rejects a candidate.
pub const TOPIC_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Checks a ranked article against what was published inside the lookback
/// window. `hash_published` is the store's answer for the article's hash;
/// `recent` are the posts of the same window.
pub fn near_duplicate(
    candidate: &QueuedArticle,
    hash_published: bool,
    recent: &[PublishedPost],
) -> Option<DuplicateReason> {
    if hash_published {
        return Some(DuplicateReason::Hash);
    }

    recent.iter().find_map(|post| {
        if post.article_url == candidate.article_url {
            return Some(DuplicateReason::Url);
        }
        if let (Some(previous), Some(current)) = (&post.person, &candidate.person) {
            if previous == current {
                return Some(DuplicateReason::Person(current.clone()));
            }
        }
        let similarity = jaccard(&post.topic, &candidate.topic);
        (similarity >= TOPIC_SIMILARITY_THRESHOLD).then(|| DuplicateReason::Topic {
            previous: post.topic.clone(),
            similarity,
        })
    })
}
