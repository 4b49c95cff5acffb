//! Document store seam.
//!
//! Services never talk to a database directly; they receive an `Arc<dyn Store>` through
//! `AppState`. Every operation that touches two documents at once (follow edges, likes)
//! is a single store call so backends can apply it atomically.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::models::{Comment, Notification, Post, User};

pub mod memory;
pub mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
}

impl UniqueField {
    pub fn message(self) -> &'static str {
        match self {
            UniqueField::Username => "Username is already taken.",
            UniqueField::Email => "Email is already in use.",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate {0:?}")]
    Duplicate(UniqueField),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed document: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Which posts a listing covers. Results are always newest first.
#[derive(Debug, Clone)]
pub enum PostFilter {
    All,
    ByAuthors(Vec<String>),
    ByIds(Vec<String>),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;
    async fn disconnect(&self) -> StoreResult<()>;

    /// Fails with `StoreError::Duplicate` when the username or email is taken.
    async fn insert_user(&self, user: &User) -> StoreResult<()>;
    async fn find_user(&self, id: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Missing ids are skipped.
    async fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>>;
    async fn user_ids(&self) -> StoreResult<Vec<String>>;
    /// Persists profile and credential fields only; edges, liked posts and the
    /// refresh token are owned by their dedicated operations.
    async fn update_profile(&self, user: &User) -> StoreResult<()>;
    /// Returns false when the user does not exist.
    async fn set_refresh_token(&self, user_id: &str, token: Option<&str>) -> StoreResult<bool>;
    /// Flips the follower -> target edge on both users. Returns true when now following.
    async fn toggle_follow(&self, follower_id: &str, target_id: &str) -> StoreResult<bool>;

    async fn insert_post(&self, post: &Post) -> StoreResult<()>;
    async fn find_post(&self, id: &str) -> StoreResult<Option<Post>>;
    async fn list_posts(&self, filter: PostFilter) -> StoreResult<Vec<Post>>;
    /// Also drops the post from every liker's liked posts.
    async fn delete_post(&self, id: &str) -> StoreResult<bool>;
    /// Returns false when the post does not exist.
    async fn push_comment(&self, post_id: &str, comment: &Comment) -> StoreResult<bool>;
    /// Flips the like on both the post and the user. `None` when the post does not exist,
    /// otherwise whether the post is now liked.
    async fn toggle_like(&self, post_id: &str, user_id: &str) -> StoreResult<Option<bool>>;

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()>;
    async fn find_notification(&self, id: &str) -> StoreResult<Option<Notification>>;
    async fn notifications_for(&self, user_id: &str) -> StoreResult<Vec<Notification>>;
    /// Returns how many notifications flipped from unread to read.
    async fn mark_notifications_read(&self, user_id: &str) -> StoreResult<usize>;
    async fn delete_notifications_for(&self, user_id: &str) -> StoreResult<usize>;
    async fn delete_notification(&self, id: &str) -> StoreResult<bool>;
}
