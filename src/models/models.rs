use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub followers: Vec<String>,
    #[serde(default)]
    pub following: Vec<String>,
    #[serde(default)]
    pub liked_posts: Vec<String>,
    pub bio: Option<String>,
    pub link: Option<String>,
    pub profile_img: Option<String>,
    pub cover_img: Option<String>,
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Comment {
    pub id: String,
    pub user: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Post {
    pub id: String,
    pub author: String,
    pub text: Option<String>,
    pub img: Option<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Follow,
    Like,
    Comment,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Notification {
    pub id: String,
    pub from: String,
    pub to: String,
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// User as returned to clients: no credential, no session state.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PublicUser {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub followers: Vec<String>,
    pub following: Vec<String>,
    pub liked_posts: Vec<String>,
    pub bio: Option<String>,
    pub link: Option<String>,
    pub profile_img: Option<String>,
    pub cover_img: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            full_name: user.full_name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            followers: user.followers.clone(),
            following: user.following.clone(),
            liked_posts: user.liked_posts.clone(),
            bio: user.bio.clone(),
            link: user.link.clone(),
            profile_img: user.profile_img.clone(),
            cover_img: user.cover_img.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Author and commenter projection embedded in posts; omits the email.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthorView {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub followers: Vec<String>,
    pub following: Vec<String>,
    pub bio: Option<String>,
    pub link: Option<String>,
    pub profile_img: Option<String>,
    pub cover_img: Option<String>,
}

impl From<&User> for AuthorView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            full_name: user.full_name.clone(),
            username: user.username.clone(),
            followers: user.followers.clone(),
            following: user.following.clone(),
            bio: user.bio.clone(),
            link: user.link.clone(),
            profile_img: user.profile_img.clone(),
            cover_img: user.cover_img.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CommentView {
    pub id: String,
    pub user: Option<AuthorView>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PostView {
    pub id: String,
    pub author: Option<AuthorView>,
    pub text: Option<String>,
    pub img: Option<String>,
    pub likes: Vec<String>,
    pub comments: Vec<CommentView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NotificationSender {
    pub id: String,
    pub username: String,
    pub profile_img: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct NotificationView {
    pub id: String,
    pub from: Option<NotificationSender>,
    pub to: String,
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}
