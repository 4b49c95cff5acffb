use actix_web::{web, HttpResponse};
use rand::seq::SliceRandom;
use serde::Deserialize;
use tracing::info;

use crate::auth::validate_password;
use crate::config::{MAX_BIO_LENGTH, SUGGESTED_USERS_LIMIT, SUGGESTION_SAMPLE_SIZE};
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{clean_optional, hash_password, now, verify_password};
use crate::media::{retire, MediaHost};
use crate::models::models::{PublicUser, TokenPair, User};
use crate::session::Session;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub link: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
    pub profile_img: Option<String>,
    pub cover_img: Option<String>,
}

pub async fn profile(state: &AppState, username: &str) -> ApiResult<User> {
    state
        .store
        .find_user_by_username(username)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))
}

/// Up to `sample` random ids that are neither the caller nor already followed.
fn sample_candidates(all: Vec<String>, me: &User, sample: usize) -> Vec<String> {
    let candidates: Vec<String> = all
        .into_iter()
        .filter(|id| *id != me.id && !me.following.contains(id))
        .collect();

    let mut rng = rand::thread_rng();
    candidates
        .choose_multiple(&mut rng, sample)
        .cloned()
        .collect()
}

pub async fn suggested(state: &AppState, session: &Session) -> ApiResult<Vec<User>> {
    let me = state
        .store
        .find_user(session.user_id())
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    let ids = state.store.user_ids().await?;
    let mut picked = sample_candidates(ids, &me, SUGGESTION_SAMPLE_SIZE);
    picked.truncate(SUGGESTED_USERS_LIMIT);

    Ok(state.store.find_users(&picked).await?)
}

/// Swaps a hosted image: the previous one is retired before the new one is uploaded.
async fn replace_image(
    media: &dyn MediaHost,
    current: Option<&str>,
    source: &str,
) -> ApiResult<String> {
    if let Some(url) = current {
        retire(media, url).await?;
    }
    Ok(media.upload(source).await?.url)
}

/// Applies a profile update. When the password changes a fresh token pair is issued,
/// which also invalidates every earlier refresh token.
pub async fn update_profile(
    state: &AppState,
    session: &Session,
    input: &UpdateProfileRequest,
) -> ApiResult<(User, Option<TokenPair>)> {
    let mut user = state
        .store
        .find_user(session.user_id())
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    let current_password = input.current_password.as_deref().filter(|p| !p.is_empty());
    let new_password = input.new_password.as_deref().filter(|p| !p.is_empty());

    let password_changed = match (current_password, new_password) {
        (None, None) => false,
        (Some(current), Some(new)) => {
            if !verify_password(current, &user.password) {
                return Err(ApiError::bad_request("Incorrect current password."));
            }
            validate_password(new)?;
            user.password = hash_password(new)?;
            true
        }
        _ => {
            return Err(ApiError::bad_request(
                "Please provide both current password and new password.",
            ))
        }
    };

    let raw_bio = input.bio.as_deref().map(str::trim).filter(|b| !b.is_empty());
    if raw_bio.is_some_and(|b| b.chars().count() > MAX_BIO_LENGTH) {
        return Err(ApiError::bad_request(format!(
            "Bio must be at most {} characters long.",
            MAX_BIO_LENGTH
        )));
    }

    let full_name = clean_optional(input.full_name.as_deref());
    let bio = clean_optional(raw_bio);
    // Links are stored as given, never run through the sanitizer.
    let link = input
        .link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string);

    let media = state.media.as_ref();
    if let Some(source) = input.profile_img.as_deref().filter(|s| !s.trim().is_empty()) {
        user.profile_img = Some(replace_image(media, user.profile_img.as_deref(), source).await?);
    }
    if let Some(source) = input.cover_img.as_deref().filter(|s| !s.trim().is_empty()) {
        user.cover_img = Some(replace_image(media, user.cover_img.as_deref(), source).await?);
    }

    if let Some(full_name) = full_name {
        user.full_name = full_name;
    }
    if bio.is_some() {
        user.bio = bio;
    }
    if link.is_some() {
        user.link = link;
    }
    user.updated_at = now();

    state.store.update_profile(&user).await?;

    let pair = if password_changed {
        let pair = state.tokens.issue(state.store.as_ref(), &user.id).await?;
        info!(user_id = %user.id, "Password changed, token pair reissued");
        Some(pair)
    } else {
        None
    };

    info!(user_id = %user.id, "Profile updated");
    Ok((user, pair))
}

// === HTTP Handlers ===

pub async fn handle_profile(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let user = profile(&state, &path).await?;
    Ok(HttpResponse::Ok().json(PublicUser::from(&user)))
}

pub async fn handle_suggested(
    state: web::Data<AppState>,
    session: Session,
) -> ApiResult<HttpResponse> {
    let users: Vec<PublicUser> = suggested(&state, &session)
        .await?
        .iter()
        .map(PublicUser::from)
        .collect();
    Ok(HttpResponse::Ok().json(users))
}

pub async fn handle_update(
    state: web::Data<AppState>,
    session: Session,
    body: web::Json<UpdateProfileRequest>,
) -> ApiResult<HttpResponse> {
    let (user, pair) = update_profile(&state, &session, &body).await?;

    let mut response = HttpResponse::Ok();
    let mut payload = serde_json::json!({
        "message": "Updated successfully.",
        "user": PublicUser::from(&user),
    });

    if let Some(pair) = pair {
        state.cookies.set_pair(&mut response, &pair);
        payload["access_token"] = serde_json::Value::String(pair.access_token);
        payload["refresh_token"] = serde_json::Value::String(pair.refresh_token);
    }

    Ok(response.json(payload))
}
