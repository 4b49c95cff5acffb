//! Runs against a live Redis. Start one and run with
//! `REDIS_URL=redis://127.0.0.1/ cargo test --test redis_store -- --ignored`.

use std::sync::Arc;

use flock::core::helpers::{new_id, now};
use flock::models::models::{Comment, Notification, NotificationKind, Post, User};
use flock::store::{PostFilter, RedisStore, Store, StoreError, UniqueField};

async fn connect() -> RedisStore {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
    RedisStore::connect(&url).await.expect("redis should be reachable")
}

fn user() -> User {
    let id = new_id();
    let handle = format!("u{}", &id[..8]);
    User {
        full_name: handle.clone(),
        email: format!("{}@x.com", handle),
        username: handle,
        id,
        password: "hash".to_string(),
        followers: Vec::new(),
        following: Vec::new(),
        liked_posts: Vec::new(),
        bio: None,
        link: None,
        profile_img: None,
        cover_img: None,
        refresh_token: None,
        created_at: now(),
        updated_at: now(),
    }
}

fn post(author: &str, text: &str) -> Post {
    Post {
        id: new_id(),
        author: author.to_string(),
        text: Some(text.to_string()),
        img: None,
        likes: Vec::new(),
        comments: Vec::new(),
        created_at: now(),
        updated_at: now(),
    }
}

#[tokio::test]
#[ignore]
async fn users_are_unique_and_hydrated() {
    let store = connect().await;
    let alice = user();
    store.insert_user(&alice).await.unwrap();

    let mut clash = user();
    clash.username = alice.username.clone();
    assert!(matches!(
        store.insert_user(&clash).await,
        Err(StoreError::Duplicate(UniqueField::Username))
    ));

    let mut clash = user();
    clash.email = alice.email.clone();
    assert!(matches!(
        store.insert_user(&clash).await,
        Err(StoreError::Duplicate(UniqueField::Email))
    ));

    assert!(store.set_refresh_token(&alice.id, Some("rt")).await.unwrap());
    let found = store.find_user_by_username(&alice.username).await.unwrap().unwrap();
    assert_eq!(found.id, alice.id);
    assert_eq!(found.refresh_token.as_deref(), Some("rt"));
    assert!(store.find_user_by_email(&alice.email).await.unwrap().is_some());
}

#[tokio::test]
#[ignore]
async fn follow_and_like_toggles_are_two_sided() {
    let store = connect().await;
    let (alice, bob) = (user(), user());
    store.insert_user(&alice).await.unwrap();
    store.insert_user(&bob).await.unwrap();

    assert!(store.toggle_follow(&alice.id, &bob.id).await.unwrap());
    let bob_now = store.find_user(&bob.id).await.unwrap().unwrap();
    assert_eq!(bob_now.followers, vec![alice.id.clone()]);
    assert!(!store.toggle_follow(&alice.id, &bob.id).await.unwrap());
    assert!(store.find_user(&alice.id).await.unwrap().unwrap().following.is_empty());

    let p = post(&bob.id, "like me");
    store.insert_post(&p).await.unwrap();
    assert_eq!(store.toggle_like(&p.id, &alice.id).await.unwrap(), Some(true));
    assert_eq!(
        store.find_user(&alice.id).await.unwrap().unwrap().liked_posts,
        vec![p.id.clone()]
    );

    assert!(store.delete_post(&p.id).await.unwrap());
    assert!(store.find_user(&alice.id).await.unwrap().unwrap().liked_posts.is_empty());
    assert_eq!(store.toggle_like(&p.id, &alice.id).await.unwrap(), None);
}

#[tokio::test]
#[ignore]
async fn comments_and_listings() {
    let store = connect().await;
    let alice = user();
    store.insert_user(&alice).await.unwrap();

    let older = post(&alice.id, "older");
    store.insert_post(&older).await.unwrap();
    let newer = post(&alice.id, "newer");
    store.insert_post(&newer).await.unwrap();

    let comment = Comment {
        id: new_id(),
        user: alice.id.clone(),
        text: "hi".to_string(),
        created_at: now(),
    };
    assert!(store.push_comment(&older.id, &comment).await.unwrap());
    assert_eq!(store.find_post(&older.id).await.unwrap().unwrap().comments, vec![comment]);

    let mine = store
        .list_posts(PostFilter::ByAuthors(vec![alice.id.clone()]))
        .await
        .unwrap();
    let ids: Vec<&str> = mine.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);
}

#[tokio::test]
#[ignore]
async fn notifications_round_trip() {
    let store = connect().await;
    let (alice, bob) = (user(), user());
    store.insert_user(&alice).await.unwrap();
    store.insert_user(&bob).await.unwrap();

    let notification = Notification {
        id: new_id(),
        from: bob.id.clone(),
        to: alice.id.clone(),
        kind: NotificationKind::Follow,
        read: false,
        created_at: now(),
    };
    store.insert_notification(&notification).await.unwrap();

    let already_read = Notification {
        id: new_id(),
        kind: NotificationKind::Like,
        read: true,
        ..notification.clone()
    };
    store.insert_notification(&already_read).await.unwrap();

    assert_eq!(store.mark_notifications_read(&alice.id).await.unwrap(), 1);
    assert_eq!(store.mark_notifications_read(&alice.id).await.unwrap(), 0);
    let marked = store.find_notification(&notification.id).await.unwrap().unwrap();
    assert_eq!(marked, Notification { read: true, ..notification.clone() });
    assert!(store.notifications_for(&alice.id).await.unwrap().iter().all(|n| n.read));
    assert_eq!(store.delete_notifications_for(&alice.id).await.unwrap(), 2);
    assert!(store.find_notification(&notification.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn deleting_a_post_under_concurrent_likes_leaves_no_liked_edges() {
    let store = Arc::new(connect().await);
    let author = user();
    store.insert_user(&author).await.unwrap();
    let likers: Vec<User> = (0..20).map(|_| user()).collect();
    for liker in &likers {
        store.insert_user(liker).await.unwrap();
    }
    let p = post(&author.id, "going away");
    store.insert_post(&p).await.unwrap();

    let mut likes = Vec::new();
    for liker in &likers {
        let (store, post_id, user_id) = (store.clone(), p.id.clone(), liker.id.clone());
        likes.push(tokio::spawn(async move {
            store.toggle_like(&post_id, &user_id).await.unwrap()
        }));
    }
    let deletion = {
        let (store, post_id) = (store.clone(), p.id.clone());
        tokio::spawn(async move { store.delete_post(&post_id).await.unwrap() })
    };

    for like in likes {
        like.await.unwrap();
    }
    assert!(deletion.await.unwrap());
    assert!(store.find_post(&p.id).await.unwrap().is_none());
    for liker in &likers {
        let liked = store.find_user(&liker.id).await.unwrap().unwrap().liked_posts;
        assert!(liked.is_empty(), "{} still likes a deleted post", liker.username);
    }
    assert!(store
        .list_posts(PostFilter::ByAuthors(vec![author.id.clone()]))
        .await
        .unwrap()
        .is_empty());
    assert!(!store.delete_post(&p.id).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn deleting_notifications_one_at_a_time() {
    let store = connect().await;
    let (alice, bob) = (user(), user());
    store.insert_user(&alice).await.unwrap();
    store.insert_user(&bob).await.unwrap();

    let notification = Notification {
        id: new_id(),
        from: bob.id.clone(),
        to: alice.id.clone(),
        kind: NotificationKind::Follow,
        read: false,
        created_at: now(),
    };
    store.insert_notification(&notification).await.unwrap();
    assert!(store.delete_notification(&notification.id).await.unwrap());
    assert!(store.notifications_for(&alice.id).await.unwrap().is_empty());
    assert!(!store.delete_notification(&notification.id).await.unwrap());
}
