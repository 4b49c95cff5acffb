use actix_web::{web, HttpResponse};
use tracing::info;

use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::require_uuid;
use crate::models::models::NotificationKind;
use crate::notifications::notify;
use crate::session::Session;
use crate::AppState;

/// Follows `target_id` if the caller does not follow them yet, unfollows otherwise.
/// Returns whether the caller now follows the target.
pub async fn follow_unfollow(
    state: &AppState,
    session: &Session,
    target_id: &str,
) -> ApiResult<bool> {
    let follower_id = session.user_id();
    if target_id == follower_id {
        return Err(ApiError::bad_request("You can't follow or unfollow yourself."));
    }

    if state.store.find_user(target_id).await?.is_none() {
        return Err(ApiError::not_found("User not found."));
    }

    let following = state.store.toggle_follow(follower_id, target_id).await?;

    if following {
        notify(state, follower_id, target_id, NotificationKind::Follow).await?;
        info!(follower = %follower_id, target = %target_id, "Followed user");
    } else {
        info!(follower = %follower_id, target = %target_id, "Unfollowed user");
    }

    Ok(following)
}

// === HTTP Handlers ===

pub async fn handle_follow(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let target_id = path.into_inner();
    require_uuid(&target_id, "user")?;

    let following = follow_unfollow(&state, &session, &target_id).await?;
    let message = if following {
        "User followed successfully."
    } else {
        "User unfollowed successfully."
    };

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": message,
        "user_id": target_id,
        "following": following,
    })))
}
