use chrono::{Duration, Utc};
use modbot::AppState;
use modbot::cache::CacheError;
use modbot::config::CacheSettings;
use modbot::constants::{SESSION_NOT_FOUND, USER_NOT_FOUND};
use modbot::database::models::{Identity, Session, TwitchUser};
use modbot::database::{AccountStore, MemoryStore, StoreError};
use std::sync::Arc;

async fn setup() -> (Arc<MemoryStore>, AppState) {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_identity(Identity {
            points: 10,
            ..Identity::empty(1)
        })
        .await;
    store
        .upsert_twitch_user(&TwitchUser {
            id: 100,
            login: "alpha".into(),
            display_name: "Alpha".into(),
            identity: Some(1),
        })
        .await
        .unwrap();
    let app = AppState::new(store.clone(), &CacheSettings::default(), vec![42]);
    (store, app)
}

#[tokio::test]
async fn unknown_users_are_not_found() {
    let (_store, app) = setup().await;

    let missing = app.twitch_users.get_user_by_id(999, false).await;
    assert_eq!(missing, Err(CacheError::NotFound(USER_NOT_FOUND.into())));
    assert_eq!(missing.unwrap_err().to_string(), "User not found!");

    let garbage = app.twitch_users.get_user_by_id("abc", false).await;
    assert_eq!(garbage, Err(CacheError::NotFound(USER_NOT_FOUND.into())));
}

#[tokio::test]
async fn cached_lookups_skip_the_store() {
    let (store, app) = setup().await;

    let first = app.twitch_users.get_user_by_id("100", false).await.unwrap();
    let reads = store.account_reads();
    let second = app.twitch_users.get_user_by_id(100, false).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(store.account_reads(), reads);
    assert_eq!(second.identity.map(|i| i.points), Some(10));

    app.twitch_users.get_user_by_id(100, true).await.unwrap();
    assert_eq!(store.account_reads(), reads + 1);
}

#[tokio::test]
async fn name_lookups_normalize_the_login() {
    let (_store, app) = setup().await;

    let by_name = app.twitch_users.get_user_by_name("#Alpha", false).await.unwrap();
    assert_eq!(by_name.user.id, 100);
    let missing = app.twitch_users.get_user_by_name("nobody", false).await;
    assert_eq!(missing, Err(CacheError::NotFound(USER_NOT_FOUND.into())));
}

#[tokio::test]
async fn expired_sessions_are_not_found() {
    let (store, app) = setup().await;
    let now = Utc::now();
    store
        .insert_session(Session {
            id: "old".into(),
            identity: Some(1),
            created_at: now - Duration::days(30),
            expires_at: now - Duration::days(16),
            last_used: now - Duration::days(16),
        })
        .await;

    let result = app.sessions.get_session_by_id("old", false).await;
    assert_eq!(result, Err(CacheError::NotFound(SESSION_NOT_FOUND.into())));
}

#[tokio::test]
async fn created_sessions_are_served_from_the_cache() {
    let (store, app) = setup().await;
    let created = app.sessions.create_session("abc", Some(1)).await.unwrap();
    assert_eq!(created.identity.as_ref().map(|i| i.id), Some(1));

    let reads = store.account_reads();
    let fetched = app.sessions.get_session_by_id("abc", false).await.unwrap();
    assert_eq!(fetched, created);
    assert_eq!(store.account_reads(), reads);

    assert!(app.sessions.forget("abc").await);
    let refetched = app.sessions.get_session_by_id("abc", false).await.unwrap();
    assert_eq!(refetched.session.id, "abc");
    assert_eq!(store.account_reads(), reads + 1);
}

#[tokio::test]
async fn points_adjust_and_refresh_cached_records() {
    let (_store, app) = setup().await;
    let cached = app.twitch_users.get_user_by_id(100, false).await.unwrap();
    assert_eq!(cached.identity.map(|i| i.points), Some(10));

    let updated = app.points.add_points(1, 15).await.unwrap();
    assert_eq!(updated.points, 25);
    let refreshed = app.twitch_users.get_user_by_id(100, false).await.unwrap();
    assert_eq!(refreshed.identity.map(|i| i.points), Some(25));

    let err = app.points.remove_points(1, 30).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientPoints {
            required: 30,
            available: 25
        }
    ));
    assert_eq!(
        err.to_string(),
        "Not enough points! Requires 30 points, 25 points present."
    );

    let drained = app.points.remove_points(1, 25).await.unwrap();
    assert_eq!(drained.points, 0);
}

#[tokio::test]
async fn admins_are_recognised() {
    let (_store, app) = setup().await;
    assert!(app.is_admin(serenity::model::id::UserId::new(42)));
    assert!(!app.is_admin(serenity::model::id::UserId::new(7)));
}
