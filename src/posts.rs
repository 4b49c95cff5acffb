use std::collections::HashMap;

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::info;

use crate::config::{MAX_COMMENT_LENGTH, MAX_POST_LENGTH};
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{clean_optional, new_id, now, require_uuid, sanitize_text};
use crate::media::retire;
use crate::models::models::{AuthorView, Comment, CommentView, NotificationKind, Post, PostView};
use crate::notifications::notify;
use crate::session::Session;
use crate::store::PostFilter;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreatePostRequest {
    pub text: Option<String>,
    pub img: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommentRequest {
    pub text: Option<String>,
}

/// Resolves authors and commenters in one store round trip. References to users that
/// no longer exist render as `null`.
pub async fn render(state: &AppState, posts: Vec<Post>) -> ApiResult<Vec<PostView>> {
    let mut ids: Vec<String> = posts
        .iter()
        .flat_map(|p| {
            std::iter::once(p.author.clone()).chain(p.comments.iter().map(|c| c.user.clone()))
        })
        .collect();
    ids.sort();
    ids.dedup();

    let people: HashMap<String, AuthorView> = state
        .store
        .find_users(&ids)
        .await?
        .iter()
        .map(|u| (u.id.clone(), AuthorView::from(u)))
        .collect();

    Ok(posts
        .into_iter()
        .map(|post| PostView {
            author: people.get(&post.author).cloned(),
            comments: post
                .comments
                .into_iter()
                .map(|c| CommentView {
                    user: people.get(&c.user).cloned(),
                    id: c.id,
                    text: c.text,
                    created_at: c.created_at,
                })
                .collect(),
            id: post.id,
            text: post.text,
            img: post.img,
            likes: post.likes,
            created_at: post.created_at,
            updated_at: post.updated_at,
        })
        .collect())
}

async fn render_one(state: &AppState, post: Post) -> ApiResult<PostView> {
    render(state, vec![post])
        .await?
        .pop()
        .ok_or_else(|| ApiError::Internal("post projection came back empty".to_string()))
}

async fn existing_post(state: &AppState, post_id: &str) -> ApiResult<Post> {
    state
        .store
        .find_post(post_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found."))
}

pub async fn create(
    state: &AppState,
    session: &Session,
    input: &CreatePostRequest,
) -> ApiResult<Post> {
    let raw_text = input.text.as_deref().map(str::trim).filter(|t| !t.is_empty());
    if raw_text.is_some_and(|t| t.chars().count() > MAX_POST_LENGTH) {
        return Err(ApiError::bad_request(format!(
            "Post text must be at most {} characters long.",
            MAX_POST_LENGTH
        )));
    }

    let text = clean_optional(raw_text);
    let img_source = input.img.as_deref().map(str::trim).filter(|s| !s.is_empty());
    if text.is_none() && img_source.is_none() {
        return Err(ApiError::bad_request("Post must have text or an image."));
    }

    let img = match img_source {
        Some(source) => Some(state.media.upload(source).await?.url),
        None => None,
    };

    let created_at = now();
    let post = Post {
        id: new_id(),
        author: session.user_id().to_string(),
        text,
        img,
        likes: Vec::new(),
        comments: Vec::new(),
        created_at,
        updated_at: created_at,
    };
    state.store.insert_post(&post).await?;

    info!(post_id = %post.id, author = %post.author, "Post created");
    Ok(post)
}

pub async fn list_all(state: &AppState) -> ApiResult<Vec<PostView>> {
    let posts = state.store.list_posts(PostFilter::All).await?;
    render(state, posts).await
}

pub async fn delete(state: &AppState, session: &Session, post_id: &str) -> ApiResult<()> {
    let post = existing_post(state, post_id).await?;
    if post.author != session.user_id() {
        return Err(ApiError::Forbidden(
            "You are not authorized to delete this post.".to_string(),
        ));
    }

    if let Some(img) = &post.img {
        retire(state.media.as_ref(), img).await?;
    }
    state.store.delete_post(post_id).await?;

    info!(post_id = %post_id, "Post deleted");
    Ok(())
}

pub async fn comment(
    state: &AppState,
    session: &Session,
    post_id: &str,
    input: &CommentRequest,
) -> ApiResult<PostView> {
    let text = input
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("Text field is required."))?;
    if text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Comment must be at most {} characters long.",
            MAX_COMMENT_LENGTH
        )));
    }
    let text = sanitize_text(text);
    if text.is_empty() {
        return Err(ApiError::bad_request("Text field is required."));
    }

    let post = existing_post(state, post_id).await?;
    let entry = Comment {
        id: new_id(),
        user: session.user_id().to_string(),
        text,
        created_at: now(),
    };
    if !state.store.push_comment(post_id, &entry).await? {
        return Err(ApiError::not_found("Post not found."));
    }

    notify(state, session.user_id(), &post.author, NotificationKind::Comment).await?;

    let updated = existing_post(state, post_id).await?;
    render_one(state, updated).await
}

/// Returns whether the caller now likes the post.
pub async fn like_unlike(state: &AppState, session: &Session, post_id: &str) -> ApiResult<bool> {
    let post = existing_post(state, post_id).await?;

    let liked = state
        .store
        .toggle_like(post_id, session.user_id())
        .await?
        .ok_or_else(|| ApiError::not_found("Post not found."))?;

    if liked {
        notify(state, session.user_id(), &post.author, NotificationKind::Like).await?;
    }
    Ok(liked)
}

pub async fn liked_by(state: &AppState, user_id: &str) -> ApiResult<Vec<PostView>> {
    let user = state
        .store
        .find_user(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    let posts = state.store.list_posts(PostFilter::ByIds(user.liked_posts)).await?;
    render(state, posts).await
}

pub async fn following_feed(state: &AppState, session: &Session) -> ApiResult<Vec<PostView>> {
    let me = state
        .store
        .find_user(session.user_id())
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    let posts = state.store.list_posts(PostFilter::ByAuthors(me.following)).await?;
    render(state, posts).await
}

pub async fn by_username(state: &AppState, username: &str) -> ApiResult<Vec<PostView>> {
    let user = state
        .store
        .find_user_by_username(username)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    let posts = state.store.list_posts(PostFilter::ByAuthors(vec![user.id])).await?;
    render(state, posts).await
}

// === HTTP Handlers ===

pub async fn handle_create(
    state: web::Data<AppState>,
    session: Session,
    body: web::Json<CreatePostRequest>,
) -> ApiResult<HttpResponse> {
    let post = create(&state, &session, &body).await?;
    let view = render_one(&state, post).await?;
    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "Post created successfully.",
        "post": view,
    })))
}

pub async fn handle_list_all(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let posts = list_all(&state).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "posts": posts })))
}

pub async fn handle_delete(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let post_id = path.into_inner();
    require_uuid(&post_id, "post")?;

    delete(&state, &session, &post_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": "Post deleted successfully." })))
}

pub async fn handle_comment(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
    body: web::Json<CommentRequest>,
) -> ApiResult<HttpResponse> {
    let post_id = path.into_inner();
    require_uuid(&post_id, "post")?;

    let post = comment(&state, &session, &post_id, &body).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Comment added successfully.",
        "post": post,
    })))
}

pub async fn handle_like(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let post_id = path.into_inner();
    require_uuid(&post_id, "post")?;

    let liked = like_unlike(&state, &session, &post_id).await?;
    let message = if liked {
        "Post liked successfully."
    } else {
        "Post unliked successfully."
    };
    Ok(HttpResponse::Ok().json(serde_json::json!({ "message": message, "liked": liked })))
}

pub async fn handle_liked(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user_id = path.into_inner();
    require_uuid(&user_id, "user")?;

    Ok(HttpResponse::Ok().json(liked_by(&state, &user_id).await?))
}

pub async fn handle_following(
    state: web::Data<AppState>,
    session: Session,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(following_feed(&state, &session).await?))
}

pub async fn handle_user_posts(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(by_username(&state, &path).await?))
}
