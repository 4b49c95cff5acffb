use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::info;

use crate::config::Config;
use crate::core::helpers::{hash_password, new_id, now};
use crate::media::{CloudinaryHost, MediaHost, MemoryMediaHost};
use crate::models::models::{Post, User};
use crate::store::{MemoryStore, RedisStore, Store};
use crate::AppState;

/// Opens the store named by `DATABASE_URL`.
pub async fn connect(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    let url = config.database_url.as_str();

    if url.starts_with("memory://") {
        info!("Using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }

    if url.starts_with("redis://") || url.starts_with("rediss://") {
        let store = RedisStore::connect(url)
            .await
            .context("failed to connect to redis")?;
        store.ping().await.context("redis did not answer PING")?;
        info!("Connected to redis store");
        return Ok(Arc::new(store));
    }

    Err(anyhow!("unsupported DATABASE_URL scheme: {}", url))
}

pub fn connect_media(config: &Config) -> Arc<dyn MediaHost> {
    match &config.cloudinary {
        Some(cloudinary) => {
            info!(cloud_name = %cloudinary.cloud_name, "Using Cloudinary media host");
            Arc::new(CloudinaryHost::new(cloudinary.clone()))
        }
        None => {
            info!("No media host configured, keeping uploads in memory");
            Arc::new(MemoryMediaHost::new())
        }
    }
}

struct DemoAccount {
    username: &'static str,
    full_name: &'static str,
    bio: &'static str,
    welcome: &'static str,
}

const DEMO_ACCOUNTS: [DemoAccount; 3] = [
    DemoAccount {
        username: "test",
        full_name: "Test User",
        bio: "Test user bio",
        welcome: "This is my first post on Flock!",
    },
    DemoAccount {
        username: "alice",
        full_name: "Alice",
        bio: "Hello, I'm Alice!",
        welcome: "Welcome to my corner of Flock! Excited to share thoughts here.",
    },
    DemoAccount {
        username: "bob",
        full_name: "Bob",
        bio: "Bob's corner of the internet",
        welcome: "Hey everyone! Just joined Flock, looking forward to connecting with you all.",
    },
];

async fn ensure_demo_account(store: &dyn Store, account: &DemoAccount) -> anyhow::Result<User> {
    if let Some(existing) = store.find_user_by_username(account.username).await? {
        return Ok(existing);
    }

    let created_at = now();
    let user = User {
        id: new_id(),
        full_name: account.full_name.to_string(),
        username: account.username.to_string(),
        email: format!("{}@flock.local", account.username),
        password: hash_password(account.username)?,
        followers: Vec::new(),
        following: Vec::new(),
        liked_posts: Vec::new(),
        bio: Some(account.bio.to_string()),
        link: None,
        profile_img: None,
        cover_img: None,
        refresh_token: None,
        created_at,
        updated_at: created_at,
    };
    store.insert_user(&user).await?;

    store
        .insert_post(&Post {
            id: new_id(),
            author: user.id.clone(),
            text: Some(account.welcome.to_string()),
            img: None,
            likes: Vec::new(),
            comments: Vec::new(),
            created_at,
            updated_at: created_at,
        })
        .await?;

    info!(username = %user.username, "Seeded demo account");
    Ok(user)
}

/// Creates the demo accounts `test`, `alice` and `bob` (password = username) with a
/// welcome post each, and has `test` follow `bob`. Safe to run on every start.
pub async fn seed_demo_data(state: &AppState) -> anyhow::Result<()> {
    let store = state.store.as_ref();

    let mut seeded = Vec::with_capacity(DEMO_ACCOUNTS.len());
    for account in &DEMO_ACCOUNTS {
        seeded.push(ensure_demo_account(store, account).await?);
    }

    let test = &seeded[0];
    let bob = &seeded[2];
    if !test.following.contains(&bob.id) {
        store.toggle_follow(&test.id, &bob.id).await?;
    }

    Ok(())
}
