//! Redis-backed document store.
//!
//! Documents are JSON strings; edges, likes and listings live in sorted sets scored by
//! time in microseconds so they come back in insertion order. Two-sided toggles, post
//! deletion and marking an inbox read each run as a single Lua script.

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::info;

use super::{PostFilter, Store, StoreError, StoreResult, UniqueField};
use crate::models::models::{Comment, Notification, Post, User};

const USERS_KEY: &str = "users";
const POSTS_KEY: &str = "posts";

fn user_key(id: &str) -> String {
    format!("user:{}", id)
}

fn user_edge_key(id: &str, edge: &str) -> String {
    format!("user:{}:{}", id, edge)
}

fn refresh_token_key(id: &str) -> String {
    format!("user:{}:refresh_token", id)
}

fn username_key(username: &str) -> String {
    format!("username:{}", username)
}

fn email_key(email: &str) -> String {
    format!("email:{}", email)
}

fn post_key(id: &str) -> String {
    format!("post:{}", id)
}

fn post_likes_key(id: &str) -> String {
    format!("post:{}:likes", id)
}

fn post_comments_key(id: &str) -> String {
    format!("post:{}:comments", id)
}

fn notification_key(id: &str) -> String {
    format!("notification:{}", id)
}

fn score(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64
}

/// KEYS: [member set of A, member set of B, guard document]
/// ARGV: [member for A, member for B, score]
/// Returns -1 if the guard is missing, 1 when the pair was added, 0 when removed.
fn toggle_pair_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| {
        Script::new(
            r"
            if redis.call('EXISTS', KEYS[3]) == 0 then
                return -1
            end
            if redis.call('ZSCORE', KEYS[1], ARGV[1]) then
                redis.call('ZREM', KEYS[1], ARGV[1])
                redis.call('ZREM', KEYS[2], ARGV[2])
                return 0
            end
            redis.call('ZADD', KEYS[1], ARGV[3], ARGV[1])
            redis.call('ZADD', KEYS[2], ARGV[3], ARGV[2])
            return 1
            ",
        )
    })
}

/// KEYS: [post document, post likes, post comments, global post index]
/// ARGV: [post id]
/// Returns 0 if the post is missing, 1 once it and every edge pointing at it are gone.
/// Likers are read inside the script, so no like lands between the read and the removal.
const DELETE_POST_LUA: &str = r"
    local doc = redis.call('GET', KEYS[1])
    if not doc then
        return 0
    end
    local author = cjson.decode(doc)['author']
    for _, liker in ipairs(redis.call('ZRANGE', KEYS[2], 0, -1)) do
        redis.call('ZREM', 'user:' .. liker .. ':liked_posts', ARGV[1])
    end
    redis.call('ZREM', 'user:' .. author .. ':posts', ARGV[1])
    redis.call('ZREM', KEYS[4], ARGV[1])
    redis.call('DEL', KEYS[1], KEYS[2], KEYS[3])
    return 1
    ";

fn delete_post_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(DELETE_POST_LUA))
}

/// KEYS: [notification inbox]
/// Returns how many notifications were flipped from unread to read.
const MARK_READ_LUA: &str = r"
    local flipped = 0
    for _, id in ipairs(redis.call('ZRANGE', KEYS[1], 0, -1)) do
        local key = 'notification:' .. id
        local raw = redis.call('GET', key)
        if raw then
            local doc = cjson.decode(raw)
            if not doc['read'] then
                doc['read'] = true
                redis.call('SET', key, cjson.encode(doc))
                flipped = flipped + 1
            end
        end
    end
    return flipped
    ";

fn mark_read_script() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(MARK_READ_LUA))
}

/// User documents are stored without edges or session state; those are hydrated
/// from their own keys.
fn user_document(user: &User) -> serde_json::Result<String> {
    let mut doc = user.clone();
    doc.followers.clear();
    doc.following.clear();
    doc.liked_posts.clear();
    doc.refresh_token = None;
    serde_json::to_string(&doc)
}

fn post_document(post: &Post) -> serde_json::Result<String> {
    let mut doc = post.clone();
    doc.likes.clear();
    doc.comments.clear();
    serde_json::to_string(&doc)
}

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis document store");
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    async fn load_user(&self, id: &str) -> StoreResult<Option<User>> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.get(user_key(id)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let mut user: User = serde_json::from_str(&raw)?;
        user.followers = conn.zrange(user_edge_key(id, "followers"), 0, -1).await?;
        user.following = conn.zrange(user_edge_key(id, "following"), 0, -1).await?;
        user.liked_posts = conn.zrange(user_edge_key(id, "liked_posts"), 0, -1).await?;
        user.refresh_token = conn.get(refresh_token_key(id)).await?;
        Ok(Some(user))
    }

    async fn load_user_by_index(&self, index_key: String) -> StoreResult<Option<User>> {
        let mut conn = self.conn();
        let id: Option<String> = conn.get(index_key).await?;
        match id {
            Some(id) => self.load_user(&id).await,
            None => Ok(None),
        }
    }

    async fn load_post(&self, id: &str) -> StoreResult<Option<Post>> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.get(post_key(id)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let mut post: Post = serde_json::from_str(&raw)?;
        post.likes = conn.zrange(post_likes_key(id), 0, -1).await?;
        let comments: Vec<String> = conn.lrange(post_comments_key(id), 0, -1).await?;
        post.comments = comments
            .iter()
            .map(|c| serde_json::from_str::<Comment>(c))
            .collect::<Result<_, _>>()?;
        Ok(Some(post))
    }

    async fn load_notification(&self, id: &str) -> StoreResult<Option<Notification>> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.get(notification_key(id)).await?;
        raw.map(|r| serde_json::from_str(&r))
            .transpose()
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn disconnect(&self) -> StoreResult<()> {
        // ConnectionManager closes its socket when the last clone drops.
        info!("Disconnecting from Redis document store");
        Ok(())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut conn = self.conn();
        let doc = user_document(user)?;

        let username_claimed: bool = conn.set_nx(username_key(&user.username), &user.id).await?;
        if !username_claimed {
            return Err(StoreError::Duplicate(UniqueField::Username));
        }
        let email_claimed: bool = conn.set_nx(email_key(&user.email), &user.id).await?;
        if !email_claimed {
            let _: () = conn.del(username_key(&user.username)).await?;
            return Err(StoreError::Duplicate(UniqueField::Email));
        }

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(user_key(&user.id), doc)
            .ignore()
            .sadd(USERS_KEY, &user.id)
            .ignore();
        if let Some(token) = &user.refresh_token {
            pipe.set(refresh_token_key(&user.id), token).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn find_user(&self, id: &str) -> StoreResult<Option<User>> {
        self.load_user(id).await
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.load_user_by_index(username_key(username)).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.load_user_by_index(email_key(email)).await
    }

    async fn find_users(&self, ids: &[String]) -> StoreResult<Vec<User>> {
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(user) = self.load_user(id).await? {
                users.push(user);
            }
        }
        Ok(users)
    }

    async fn user_ids(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        let ids: Vec<String> = conn.smembers(USERS_KEY).await?;
        Ok(ids)
    }

    async fn update_profile(&self, user: &User) -> StoreResult<()> {
        let mut conn = self.conn();
        let exists: bool = conn.exists(user_key(&user.id)).await?;
        if !exists {
            return Err(StoreError::Backend(format!("user {} does not exist", user.id)));
        }
        let _: () = conn.set(user_key(&user.id), user_document(user)?).await?;
        Ok(())
    }

    async fn set_refresh_token(&self, user_id: &str, token: Option<&str>) -> StoreResult<bool> {
        let mut conn = self.conn();
        let exists: bool = conn.exists(user_key(user_id)).await?;
        if !exists {
            return Ok(false);
        }
        match token {
            Some(token) => {
                let _: () = conn.set(refresh_token_key(user_id), token).await?;
            }
            None => {
                let _: () = conn.del(refresh_token_key(user_id)).await?;
            }
        }
        Ok(true)
    }

    async fn toggle_follow(&self, follower_id: &str, target_id: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let outcome: i64 = toggle_pair_script()
            .key(user_edge_key(follower_id, "following"))
            .key(user_edge_key(target_id, "followers"))
            .key(user_key(target_id))
            .arg(target_id)
            .arg(follower_id)
            .arg(score(Utc::now()))
            .invoke_async(&mut conn)
            .await?;

        match outcome {
            -1 => Err(StoreError::Backend(format!("user {} does not exist", target_id))),
            n => Ok(n == 1),
        }
    }

    async fn insert_post(&self, post: &Post) -> StoreResult<()> {
        let mut conn = self.conn();
        let at = score(post.created_at);
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(post_key(&post.id), post_document(post)?)
            .ignore()
            .zadd(POSTS_KEY, &post.id, at)
            .ignore()
            .zadd(user_edge_key(&post.author, "posts"), &post.id, at)
            .ignore();
        for comment in &post.comments {
            pipe.rpush(post_comments_key(&post.id), serde_json::to_string(comment)?)
                .ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn find_post(&self, id: &str) -> StoreResult<Option<Post>> {
        self.load_post(id).await
    }

    async fn list_posts(&self, filter: PostFilter) -> StoreResult<Vec<Post>> {
        let mut conn = self.conn();
        let ids: Vec<String> = match filter {
            PostFilter::All => conn.zrevrange(POSTS_KEY, 0, -1).await?,
            PostFilter::ByAuthors(authors) => {
                let mut ids = Vec::new();
                for author in authors {
                    let authored: Vec<String> =
                        conn.zrange(user_edge_key(&author, "posts"), 0, -1).await?;
                    ids.extend(authored);
                }
                ids
            }
            PostFilter::ByIds(ids) => ids,
        };

        let mut posts = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(post) = self.load_post(id).await? {
                posts.push(post);
            }
        }
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(posts)
    }

    async fn delete_post(&self, id: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let deleted: i64 = delete_post_script()
            .key(post_key(id))
            .key(post_likes_key(id))
            .key(post_comments_key(id))
            .key(POSTS_KEY)
            .arg(id)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn push_comment(&self, post_id: &str, comment: &Comment) -> StoreResult<bool> {
        let mut conn = self.conn();
        let exists: bool = conn.exists(post_key(post_id)).await?;
        if !exists {
            return Ok(false);
        }
        let _: () = conn
            .rpush(post_comments_key(post_id), serde_json::to_string(comment)?)
            .await?;
        Ok(true)
    }

    async fn toggle_like(&self, post_id: &str, user_id: &str) -> StoreResult<Option<bool>> {
        let mut conn = self.conn();
        let outcome: i64 = toggle_pair_script()
            .key(post_likes_key(post_id))
            .key(user_edge_key(user_id, "liked_posts"))
            .key(post_key(post_id))
            .arg(user_id)
            .arg(post_id)
            .arg(score(Utc::now()))
            .invoke_async(&mut conn)
            .await?;

        Ok(match outcome {
            -1 => None,
            n => Some(n == 1),
        })
    }

    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        let mut conn = self.conn();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(
                notification_key(&notification.id),
                serde_json::to_string(notification)?,
            )
            .ignore()
            .zadd(
                user_edge_key(&notification.to, "notifications"),
                &notification.id,
                score(notification.created_at),
            )
            .ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn find_notification(&self, id: &str) -> StoreResult<Option<Notification>> {
        self.load_notification(id).await
    }

    async fn notifications_for(&self, user_id: &str) -> StoreResult<Vec<Notification>> {
        let mut conn = self.conn();
        let ids: Vec<String> = conn
            .zrevrange(user_edge_key(user_id, "notifications"), 0, -1)
            .await?;

        let mut notifications = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Some(notification) = self.load_notification(id).await? {
                notifications.push(notification);
            }
        }
        Ok(notifications)
    }

    async fn mark_notifications_read(&self, user_id: &str) -> StoreResult<usize> {
        let mut conn = self.conn();
        let flipped: usize = mark_read_script()
            .key(user_edge_key(user_id, "notifications"))
            .invoke_async(&mut conn)
            .await?;
        Ok(flipped)
    }

    async fn delete_notifications_for(&self, user_id: &str) -> StoreResult<usize> {
        let mut conn = self.conn();
        let inbox = user_edge_key(user_id, "notifications");
        let ids: Vec<String> = conn.zrange(&inbox, 0, -1).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = ids.iter().map(|id| notification_key(id)).collect();
        let mut pipe = redis::pipe();
        pipe.atomic().del(&keys).ignore().del(&inbox).ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(ids.len())
    }

    async fn delete_notification(&self, id: &str) -> StoreResult<bool> {
        let Some(notification) = self.load_notification(id).await? else {
            return Ok(false);
        };

        let mut conn = self.conn();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(notification_key(id))
            .ignore()
            .zrem(user_edge_key(&notification.to, "notifications"), id)
            .ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(true)
    }
}
