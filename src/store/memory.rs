use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{PostFilter, Store, StoreError, StoreResult, UniqueField};
use crate::models::models::{Comment, Notification, Post, User};

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    users_list: Vec<String>,
    posts: HashMap<String, Post>,
    /// Post ids, newest first.
    feed: Vec<String>,
    notifications: HashMap<String, Notification>,
    /// Notification ids, newest first.
    inbox: Vec<String>,
}

/// Process-local store. Every operation runs under one lock, which makes the
/// two-sided toggles atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut inner = self.inner.write();
        for existing in inner.users.values() {
            if existing.username == user.username {
                return Err(StoreError::Duplicate(UniqueField::Username));
            }
            if existing.email == user.email {
                return Err(StoreError::Duplicate(UniqueField::Email));
            }
        }
        inner.users.insert(user.id.clone(), user.clone());
        inner.users_list.push(user.id.clone());
        Ok(())
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.inner.read().users.get(id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read();
        Ok(inner.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read();
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        let inner = self.inner.read();
        Ok(ids.iter().filter_map(|id| inner.users.get(id).cloned()).collect())
    }

    async fn user_ids(&self) -> StoreResult<Vec<String>> {
        Ok(self.inner.read().users_list.clone())
    }

    async fn update_profile(&self, user: &User) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let stored = inner
            .users
            .get_mut(&user.id)
            .ok_or_else(|| StoreError::Backend(format!("user {} does not exist", user.id)))?;
        stored.full_name = user.full_name.clone();
        stored.password = user.password.clone();
        stored.bio = user.bio.clone();
        stored.link = user.link.clone();
        stored.profile_img = user.profile_img.clone();
        stored.cover_img = user.cover_img.clone();
        stored.updated_at = user.updated_at;
        Ok(())
    }

    async fn set_refresh_token(&self, user_id: &str, token: Option<&str>) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        match inner.users.get_mut(user_id) {
            Some(user) => {
                user.refresh_token = token.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn toggle_follow(&self, follower_id: &str, target_id: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        if !inner.users.contains_key(target_id) {
            return Err(StoreError::Backend(format!("user {} does not exist", target_id)));
        }

        let now_following = match inner.users.get_mut(follower_id) {
            Some(follower) if follower.following.iter().any(|id| id == target_id) => {
                follower.following.retain(|id| id != target_id);
                false
            }
            Some(follower) => {
                follower.following.push(target_id.to_string());
                true
            }
            None => {
                return Err(StoreError::Backend(format!("user {} does not exist", follower_id)))
            }
        };

        if let Some(target) = inner.users.get_mut(target_id) {
            target.followers.retain(|id| id != follower_id);
            if now_following {
                target.followers.push(follower_id.to_string());
            }
        }

        Ok(now_following)
    }

    async fn insert_post(&self, post: &Post) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.posts.insert(post.id.clone(), post.clone());
        inner.feed.insert(0, post.id.clone());
        Ok(())
    }

    async fn find_post(&self, id: &str) -> StoreResult<Option<Post>> {
        Ok(self.inner.read().posts.get(id).cloned())
    }

    async fn list_posts(&self, filter: PostFilter) -> StoreResult<Vec<Post>> {
        let inner = self.inner.read();
        let keep: Box<dyn Fn(&Post) -> bool> = match filter {
            PostFilter::All => Box::new(|_: &Post| true),
            PostFilter::ByAuthors(authors) => {
                let authors: HashSet<String> = authors.into_iter().collect();
                Box::new(move |p: &Post| authors.contains(&p.author))
            }
            PostFilter::ByIds(ids) => {
                let ids: HashSet<String> = ids.into_iter().collect();
                Box::new(move |p: &Post| ids.contains(&p.id))
            }
        };

        Ok(inner
            .feed
            .iter()
            .filter_map(|id| inner.posts.get(id))
            .filter(|p| keep(*p))
            .cloned()
            .collect())
    }

    async fn delete_post(&self, id: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        let Some(post) = inner.posts.remove(id) else {
            return Ok(false);
        };
        inner.feed.retain(|p| p != id);
        for liker in &post.likes {
            if let Some(user) = inner.users.get_mut(liker) {
                user.liked_posts.retain(|p| p != id);
            }
        }
        Ok(true)
    }

    async fn push_comment(&self, post_id: &str, comment: &Comment) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        match inner.posts.get_mut(post_id) {
            Some(post) => {
                post.comments.push(comment.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn toggle_like(&self, post_id: &str, user_id: &str) -> StoreResult<Option<bool>> {
        let mut inner = self.inner.write();
        if !inner.users.contains_key(user_id) {
            return Err(StoreError::Backend(format!("user {} does not exist", user_id)));
        }
        let Some(post) = inner.posts.get_mut(post_id) else {
            return Ok(None);
        };

        let now_liked = if post.likes.iter().any(|id| id == user_id) {
            post.likes.retain(|id| id != user_id);
            false
        } else {
            post.likes.push(user_id.to_string());
            true
        };

        if let Some(user) = inner.users.get_mut(user_id) {
            user.liked_posts.retain(|id| id != post_id);
            if now_liked {
                user.liked_posts.push(post_id.to_string());
            }
        }

        Ok(Some(now_liked))
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner
            .notifications
            .insert(notification.id.clone(), notification.clone());
        inner.inbox.insert(0, notification.id.clone());
        Ok(())
    }

    async fn find_notification(&self, id: &str) -> StoreResult<Option<Notification>> {
        Ok(self.inner.read().notifications.get(id).cloned())
    }

    async fn notifications_for(&self, user_id: &str) -> StoreResult<Vec<Notification>> {
        let inner = self.inner.read();
        Ok(inner
            .inbox
            .iter()
            .filter_map(|id| inner.notifications.get(id))
            .filter(|n| n.to == user_id)
            .cloned()
            .collect())
    }

    async fn mark_notifications_read(&self, user_id: &str) -> StoreResult<usize> {
        let mut inner = self.inner.write();
        let mut flipped = 0;
        for notification in inner.notifications.values_mut() {
            if notification.to == user_id && !notification.read {
                notification.read = true;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    async fn delete_notifications_for(&self, user_id: &str) -> StoreResult<usize> {
        let mut inner = self.inner.write();
        let before = inner.notifications.len();
        inner.notifications.retain(|_, n| n.to != user_id);
        let Inner {
            notifications,
            inbox,
            ..
        } = &mut *inner;
        inbox.retain(|id| notifications.contains_key(id));
        Ok(before - notifications.len())
    }

    async fn delete_notification(&self, id: &str) -> StoreResult<bool> {
        let mut inner = self.inner.write();
        if inner.notifications.remove(id).is_none() {
            return Ok(false);
        }
        inner.inbox.retain(|n| n != id);
        Ok(true)
    }
}
