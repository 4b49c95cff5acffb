//! Session middleware and cookie contract.
//!
//! `RequireSession` resolves the caller's identity before the handler runs and stores it in
//! the request extensions; handlers take `Session` as an argument and pass it on explicitly.

use std::future::{ready, Ready};
use std::rc::Rc;

use actix_web::body::EitherBody;
use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{web, Error, FromRequest, HttpMessage, HttpRequest, HttpResponseBuilder};
use futures::future::LocalBoxFuture;
use tracing::warn;

use crate::config::{ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use crate::core::errors::ApiError;
use crate::models::models::{TokenPair, User};
use crate::AppState;

/// The authenticated caller for the current request.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
}

impl Session {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

impl FromRequest for Session {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<Session>() {
            Some(session) => ready(Ok(session.clone())),
            None => ready(Err(ApiError::Unauthorized(
                "Unauthorized request: No Token Provided.".to_string(),
            )
            .into())),
        }
    }
}

/// Cookie first, then `Authorization: Bearer`.
pub fn extract_access_token(req: &ServiceRequest) -> Option<String> {
    if let Some(cookie) = req.cookie(ACCESS_TOKEN_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

async fn resolve(state: &AppState, token: Option<String>) -> Result<Session, ApiError> {
    let token = token.ok_or_else(|| {
        ApiError::Unauthorized("Unauthorized request: No Token Provided.".to_string())
    })?;

    let user_id = state.tokens.verify_access(&token).map_err(|e| {
        warn!(error = %e, "Access token rejected");
        ApiError::Unauthorized("Unauthorized access: Invalid Access Token.".to_string())
    })?;

    let user = state
        .store
        .find_user(&user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    Ok(Session { user })
}

/// Guards a scope or resource: only requests carrying a valid access token for an
/// existing user reach the wrapped service. Rejections are answered directly with the
/// error's JSON response.
#[derive(Clone, Default)]
pub struct RequireSession;

impl<S, B> Transform<S, ServiceRequest> for RequireSession
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RequireSessionService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireSessionService {
            service: Rc::new(service),
        }))
    }
}

pub struct RequireSessionService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequireSessionService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            let Some(state) = req.app_data::<web::Data<AppState>>().cloned() else {
                let err = ApiError::Internal("application state missing".to_string());
                return Ok(req.error_response(err).map_into_right_body());
            };

            match resolve(&state, extract_access_token(&req)).await {
                Ok(session) => {
                    req.extensions_mut().insert(session);
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(err) => Ok(req.error_response(err).map_into_right_body()),
            }
        })
    }
}

// === Cookies ===

#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    pub secure: bool,
    pub access_max_age: chrono::Duration,
    pub refresh_max_age: chrono::Duration,
}

fn session_cookie(
    name: &'static str,
    value: String,
    max_age: chrono::Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .secure(secure)
        .max_age(CookieDuration::seconds(max_age.num_seconds()))
        .finish()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build(name, "")
        .path("/")
        .max_age(CookieDuration::ZERO)
        .finish()
}

impl CookieSettings {
    pub fn set_pair(&self, builder: &mut HttpResponseBuilder, pair: &TokenPair) {
        builder.cookie(session_cookie(
            ACCESS_TOKEN_COOKIE,
            pair.access_token.clone(),
            self.access_max_age,
            self.secure,
        ));
        builder.cookie(session_cookie(
            REFRESH_TOKEN_COOKIE,
            pair.refresh_token.clone(),
            self.refresh_max_age,
            self.secure,
        ));
    }

    pub fn clear(&self, builder: &mut HttpResponseBuilder) {
        builder.cookie(removal_cookie(ACCESS_TOKEN_COOKIE));
        builder.cookie(removal_cookie(REFRESH_TOKEN_COOKIE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn prefers_cookie_over_header() {
        let req = TestRequest::default()
            .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, "from-cookie"))
            .insert_header(("Authorization", "Bearer from-header"))
            .to_srv_request();
        assert_eq!(extract_access_token(&req).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn falls_back_to_bearer_header() {
        let req = TestRequest::default()
            .insert_header(("Authorization", "Bearer abc.def.ghi"))
            .to_srv_request();
        assert_eq!(extract_access_token(&req).as_deref(), Some("abc.def.ghi"));

        let req = TestRequest::default()
            .insert_header(("Authorization", "Basic abc"))
            .to_srv_request();
        assert_eq!(extract_access_token(&req), None);

        assert_eq!(extract_access_token(&TestRequest::default().to_srv_request()), None);
    }

    #[test]
    fn session_cookies_follow_the_contract() {
        let max_age = chrono::Duration::hours(5);
        let cookie = session_cookie(ACCESS_TOKEN_COOKIE, "t".to_string(), max_age, true);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(CookieDuration::hours(5)));

        let removal = removal_cookie(REFRESH_TOKEN_COOKIE);
        assert_eq!(removal.value(), "");
        assert_eq!(removal.max_age(), Some(CookieDuration::ZERO));
    }
}
