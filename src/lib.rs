use std::sync::Arc;

pub mod auth;
pub mod config;
pub mod core;
pub mod follow;
pub mod media;
pub mod models;
pub mod notifications;
pub mod posts;
pub mod routes;
pub mod session;
pub mod store;
pub mod tokens;
pub mod users;

use crate::config::Config;
use crate::media::MediaHost;
use crate::session::CookieSettings;
use crate::store::Store;
use crate::tokens::TokenService;

/// Everything a handler needs, shared by every worker.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub media: Arc<dyn MediaHost>,
    pub tokens: Arc<TokenService>,
    pub cookies: CookieSettings,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        media: Arc<dyn MediaHost>,
        tokens: TokenService,
        secure_cookies: bool,
    ) -> Self {
        let cookies = CookieSettings {
            secure: secure_cookies,
            access_max_age: tokens.access_ttl(),
            refresh_max_age: tokens.refresh_ttl(),
        };
        Self {
            store,
            media,
            tokens: Arc::new(tokens),
            cookies,
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn Store>, media: Arc<dyn MediaHost>) -> Self {
        Self::new(store, media, TokenService::from_config(config), !config.development)
    }
}
