use std::collections::HashMap;

use actix_web::{web, HttpResponse};
use tracing::info;

use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{new_id, now, require_uuid};
use crate::models::models::{Notification, NotificationKind, NotificationSender, NotificationView};
use crate::session::Session;
use crate::AppState;

/// Records a notification for `to`. Acting on one's own content notifies nobody.
pub async fn notify(
    state: &AppState,
    from: &str,
    to: &str,
    kind: NotificationKind,
) -> ApiResult<()> {
    if from == to {
        return Ok(());
    }

    state
        .store
        .insert_notification(&Notification {
            id: new_id(),
            from: from.to_string(),
            to: to.to_string(),
            kind,
            read: false,
            created_at: now(),
        })
        .await?;
    Ok(())
}

async fn project(
    state: &AppState,
    notifications: Vec<Notification>,
) -> ApiResult<Vec<NotificationView>> {
    let mut sender_ids: Vec<String> = notifications.iter().map(|n| n.from.clone()).collect();
    sender_ids.sort();
    sender_ids.dedup();

    let senders: HashMap<String, NotificationSender> = state
        .store
        .find_users(&sender_ids)
        .await?
        .into_iter()
        .map(|u| {
            (
                u.id.clone(),
                NotificationSender {
                    id: u.id,
                    username: u.username,
                    profile_img: u.profile_img,
                },
            )
        })
        .collect();

    Ok(notifications
        .into_iter()
        .map(|n| NotificationView {
            from: senders.get(&n.from).cloned(),
            id: n.id,
            to: n.to,
            kind: n.kind,
            read: n.read,
            created_at: n.created_at,
        })
        .collect())
}

/// Newest first, as they were before this call; every returned notification is
/// marked read afterwards.
pub async fn list(state: &AppState, session: &Session) -> ApiResult<Vec<NotificationView>> {
    let notifications = state.store.notifications_for(session.user_id()).await?;
    let views = project(state, notifications).await?;

    let marked = state.store.mark_notifications_read(session.user_id()).await?;
    if marked > 0 {
        info!(user_id = %session.user_id(), marked, "Marked notifications read");
    }
    Ok(views)
}

pub async fn delete_all(state: &AppState, session: &Session) -> ApiResult<usize> {
    let deleted = state.store.delete_notifications_for(session.user_id()).await?;
    info!(user_id = %session.user_id(), deleted, "Deleted all notifications");
    Ok(deleted)
}

pub async fn delete_one(state: &AppState, session: &Session, id: &str) -> ApiResult<()> {
    let notification = state
        .store
        .find_notification(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification not found."))?;

    if notification.to != session.user_id() {
        return Err(ApiError::Forbidden(
            "You're not allowed to delete this notification.".to_string(),
        ));
    }

    state.store.delete_notification(id).await?;
    Ok(())
}

// === HTTP Handlers ===

pub async fn handle_list(state: web::Data<AppState>, session: Session) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(list(&state, &session).await?))
}

pub async fn handle_delete_all(
    state: web::Data<AppState>,
    session: Session,
) -> ApiResult<HttpResponse> {
    let deleted = delete_all(&state, &session).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "All notifications deleted successfully.",
        "deleted": deleted,
    })))
}

pub async fn handle_delete_one(
    state: web::Data<AppState>,
    session: Session,
    path: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    require_uuid(&id, "notification")?;

    delete_one(&state, &session, &id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "The notification was deleted successfully."
    })))
}
