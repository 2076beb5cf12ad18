use sp_core::NewPost;

/// Persisted in place of a person's image tag when images are disabled.
pub const NO_FACE_CARD: &str = "no-face-card";

/// Last step before a post is recorded: without image permission the
/// ranker's image attribution is never persisted.
pub fn apply_image_policy(mut post: NewPost, allow_image: bool) -> NewPost {
    if !allow_image {
        post.image_source = Some(NO_FACE_CARD.to_string());
    }
    post
}
