use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use tracing::info;

use crate::config::{
    MAX_USERNAME_LENGTH, MIN_PASSWORD_LENGTH, MIN_USERNAME_LENGTH, REFRESH_TOKEN_COOKIE,
};
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{
    hash_password, is_valid_email, new_id, now, sanitize_text, verify_password,
};
use crate::models::models::{PublicUser, TokenPair, User};
use crate::session::Session;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignUpRequest {
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignInRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

fn required<'a>(value: &'a Option<String>) -> Option<&'a str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {} characters long.",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

/// Validates, hashes and stores a new identity, then issues its first token pair.
pub async fn register(state: &AppState, input: &SignUpRequest) -> ApiResult<(User, TokenPair)> {
    let (full_name, username, email, password) = match (
        required(&input.full_name),
        required(&input.username),
        required(&input.email),
        input.password.as_deref().filter(|p| !p.is_empty()),
    ) {
        (Some(f), Some(u), Some(e), Some(p)) => (f, u, e, p),
        _ => return Err(ApiError::bad_request("All fields are required.")),
    };

    if !is_valid_email(email) {
        return Err(ApiError::bad_request("Invalid email. Please provide a valid email."));
    }

    let username_len = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&username_len) {
        return Err(ApiError::bad_request(format!(
            "Username must be between {} and {} characters long.",
            MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
        )));
    }

    if state.store.find_user_by_username(username).await?.is_some() {
        return Err(ApiError::bad_request("Username is already taken."));
    }
    if state.store.find_user_by_email(email).await?.is_some() {
        return Err(ApiError::bad_request("Email is already in use."));
    }

    validate_password(password)?;

    let created_at = now();
    let user = User {
        id: new_id(),
        full_name: sanitize_text(full_name),
        username: username.to_string(),
        email: email.to_string(),
        password: hash_password(password)?,
        followers: Vec::new(),
        following: Vec::new(),
        liked_posts: Vec::new(),
        bio: None,
        link: None,
        profile_img: None,
        cover_img: None,
        refresh_token: None,
        created_at,
        updated_at: created_at,
    };

    // The store re-checks uniqueness, so a racing sign-up still gets a 400.
    state.store.insert_user(&user).await?;
    let pair = state.tokens.issue(state.store.as_ref(), &user.id).await?;

    info!(user_id = %user.id, username = %user.username, "User registered");
    Ok((user, pair))
}

pub async fn sign_in(state: &AppState, input: &SignInRequest) -> ApiResult<(User, TokenPair)> {
    let (username, password) = match (required(&input.username), input.password.as_deref()) {
        (Some(u), Some(p)) if !p.is_empty() => (u, p),
        _ => return Err(ApiError::bad_request("Username and password are required.")),
    };

    let user = match state.store.find_user_by_username(username).await? {
        Some(user) if verify_password(password, &user.password) => user,
        _ => return Err(ApiError::bad_request("Invalid credentials.")),
    };

    let pair = state.tokens.issue(state.store.as_ref(), &user.id).await?;
    info!(user_id = %user.id, "User signed in");
    Ok((user, pair))
}

pub async fn logout(state: &AppState, session: &Session) -> ApiResult<()> {
    state.tokens.revoke(state.store.as_ref(), session.user_id()).await?;
    info!(user_id = %session.user_id(), "User logged out");
    Ok(())
}

/// The refresh cookie wins over the body field.
pub async fn refresh(
    state: &AppState,
    cookie: Option<String>,
    body: Option<String>,
) -> ApiResult<TokenPair> {
    let token = cookie
        .filter(|t| !t.is_empty())
        .or_else(|| body.filter(|t| !t.is_empty()))
        .ok_or_else(|| {
            ApiError::Unauthorized("Unauthorized request: No Token Provided.".to_string())
        })?;

    state.tokens.rotate(state.store.as_ref(), &token).await
}

/// Re-reads the identity so the response reflects the stored state.
pub async fn me(state: &AppState, session: &Session) -> ApiResult<User> {
    state
        .store
        .find_user(session.user_id())
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))
}

// === HTTP Handlers ===

fn auth_body(message: &str, user: &User, pair: &TokenPair) -> serde_json::Value {
    serde_json::json!({
        "message": message,
        "user": PublicUser::from(user),
        "access_token": pair.access_token,
        "refresh_token": pair.refresh_token,
    })
}

pub async fn handle_sign_up(
    state: web::Data<AppState>,
    body: web::Json<SignUpRequest>,
) -> ApiResult<HttpResponse> {
    let (user, pair) = register(&state, &body).await?;

    let mut response = HttpResponse::Created();
    state.cookies.set_pair(&mut response, &pair);
    Ok(response.json(auth_body("User registered successfully.", &user, &pair)))
}

pub async fn handle_sign_in(
    state: web::Data<AppState>,
    body: web::Json<SignInRequest>,
) -> ApiResult<HttpResponse> {
    let (user, pair) = sign_in(&state, &body).await?;

    let mut response = HttpResponse::Ok();
    state.cookies.set_pair(&mut response, &pair);
    Ok(response.json(auth_body("User signed in successfully.", &user, &pair)))
}

pub async fn handle_logout(
    state: web::Data<AppState>,
    session: Session,
) -> ApiResult<HttpResponse> {
    logout(&state, &session).await?;

    let mut response = HttpResponse::Ok();
    state.cookies.clear(&mut response);
    Ok(response.json(serde_json::json!({ "message": "User logged out successfully." })))
}

pub async fn handle_profile(
    state: web::Data<AppState>,
    session: Session,
) -> ApiResult<HttpResponse> {
    let user = me(&state, &session).await?;
    Ok(HttpResponse::Ok().json(PublicUser::from(&user)))
}

/// Accepts the token from the cookie or a JSON body; a missing or unparsable body is
/// treated as carrying no token.
pub async fn handle_refresh(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: Option<web::Json<RefreshRequest>>,
) -> ApiResult<HttpResponse> {
    let cookie = req.cookie(REFRESH_TOKEN_COOKIE).map(|c| c.value().to_string());
    let from_body = body.and_then(|b| b.into_inner().refresh_token);

    let pair = refresh(&state, cookie, from_body).await?;

    let mut response = HttpResponse::Ok();
    state.cookies.set_pair(&mut response, &pair);
    Ok(response.json(serde_json::json!({
        "message": "Access token refreshed.",
        "access_token": pair.access_token,
        "refresh_token": pair.refresh_token,
    })))
}
