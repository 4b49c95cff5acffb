use actix_web::dev::HttpServiceFactory;
use actix_web::{web, HttpResponse};
use tracing::error;

use crate::core::errors::ApiError;
use crate::session::RequireSession;
use crate::{auth, follow, notifications, posts, users, AppState};

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::bad_request(err.to_string()).into())
}

pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    match state.store.ping().await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "status": "ok" })),
        Err(e) => {
            error!(error = %e, "Health check failed");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unavailable",
                "error": e.to_string(),
            }))
        }
    }
}

async fn no_route() -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({ "error": "No route found" }))
}

fn auth_routes() -> impl HttpServiceFactory {
    web::scope("/auth")
        .route("/sign-up", web::post().to(auth::handle_sign_up))
        .route("/sign-in", web::post().to(auth::handle_sign_in))
        .route("/refresh-token", web::post().to(auth::handle_refresh))
        .service(
            web::resource("/logout")
                .wrap(RequireSession)
                .route(web::post().to(auth::handle_logout)),
        )
        .service(
            web::resource("/profile")
                .wrap(RequireSession)
                .route(web::get().to(auth::handle_profile)),
        )
}

// Sessions are checked per resource; unmatched paths still reach the JSON 404.

fn user_routes() -> impl HttpServiceFactory {
    web::scope("/users")
        .service(
            web::resource("/profile/{username}")
                .wrap(RequireSession)
                .route(web::get().to(users::handle_profile)),
        )
        .service(
            web::resource("/follow/{user_id}")
                .wrap(RequireSession)
                .route(web::post().to(follow::handle_follow)),
        )
        .service(
            web::resource("/suggested")
                .wrap(RequireSession)
                .route(web::get().to(users::handle_suggested)),
        )
        .service(
            web::resource("/update")
                .wrap(RequireSession)
                .route(web::put().to(users::handle_update)),
        )
}

fn post_routes() -> impl HttpServiceFactory {
    web::scope("/posts")
        .service(
            web::resource("/all")
                .wrap(RequireSession)
                .route(web::get().to(posts::handle_list_all)),
        )
        .service(
            web::resource("/following")
                .wrap(RequireSession)
                .route(web::get().to(posts::handle_following)),
        )
        .service(
            web::resource("/liked/{user_id}")
                .wrap(RequireSession)
                .route(web::get().to(posts::handle_liked)),
        )
        .service(
            web::resource("/user/{username}")
                .wrap(RequireSession)
                .route(web::get().to(posts::handle_user_posts)),
        )
        .service(
            web::resource("/create")
                .wrap(RequireSession)
                .route(web::post().to(posts::handle_create)),
        )
        .service(
            web::resource("/like/{post_id}")
                .wrap(RequireSession)
                .route(web::post().to(posts::handle_like)),
        )
        .service(
            web::resource("/comment/{post_id}")
                .wrap(RequireSession)
                .route(web::post().to(posts::handle_comment)),
        )
        .service(
            web::resource("/{post_id}")
                .wrap(RequireSession)
                .route(web::delete().to(posts::handle_delete)),
        )
}

fn notification_routes() -> impl HttpServiceFactory {
    web::scope("/notifications")
        .service(
            web::resource("")
                .wrap(RequireSession)
                .route(web::get().to(notifications::handle_list))
                .route(web::delete().to(notifications::handle_delete_all)),
        )
        .service(
            web::resource("/{id}")
                .wrap(RequireSession)
                .route(web::delete().to(notifications::handle_delete_one)),
        )
}

/// The full route table. Callers register `web::Data<AppState>` on the `App`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .route("/health", web::get().to(health))
        .service(
            web::scope("/api/v1")
                .service(auth_routes())
                .service(user_routes())
                .service(post_routes())
                .service(notification_routes()),
        )
        .default_service(web::route().to(no_route));
}
