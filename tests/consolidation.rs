use modbot::AppState;
use modbot::config::CacheSettings;
use modbot::database::models::{DiscordUser, Identity, TwitchUser};
use modbot::database::{AccountStore, MemoryStore};
use modbot::services::ConsolidateError;
use std::sync::Arc;

fn identity(id: i64, points: i64) -> Identity {
    Identity {
        points,
        ..Identity::empty(id)
    }
}

async fn twitch(store: &MemoryStore, id: i64, login: &str, identity: Option<i64>) -> TwitchUser {
    store
        .upsert_twitch_user(&TwitchUser {
            id,
            login: login.to_string(),
            display_name: login.to_string(),
            identity,
        })
        .await
        .expect("upsert twitch user")
}

async fn discord(store: &MemoryStore, id: i64, identity: Option<i64>) -> DiscordUser {
    store
        .upsert_discord_user(&DiscordUser {
            id,
            global_name: Some(format!("user{id}")),
            display_name: None,
            identity,
        })
        .await
        .expect("upsert discord user")
}

fn app(store: &Arc<MemoryStore>) -> AppState {
    AppState::new(store.clone(), &CacheSettings::default(), Vec::new())
}

#[tokio::test]
async fn merges_flags_and_sums_points() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_identity(Identity {
            admin: true,
            ..identity(1, 10)
        })
        .await;
    store
        .insert_identity(Identity {
            moderator: true,
            authenticated: true,
            ..identity(2, 5)
        })
        .await;
    let tw = twitch(&store, 100, "alpha", Some(1)).await;
    let dc = discord(&store, 200, Some(2)).await;
    let app = app(&store);

    let merged = app.consolidator.consolidate(&[tw], &[dc]).await.expect("consolidate");
    assert_eq!(merged.id, 1);
    assert!(merged.admin && merged.moderator && merged.authenticated);
    assert_eq!(merged.points, 15);

    let retired = store.identity(2).await.unwrap().unwrap();
    assert_eq!(retired.merged_into, Some(1));
    assert_eq!(retired.points, 0);
    assert_eq!(store.discord_user(200).await.unwrap().unwrap().identity, Some(1));
}

#[tokio::test]
async fn consolidating_twice_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    store.insert_identity(identity(1, 10)).await;
    store.insert_identity(identity(2, 5)).await;
    let tw = twitch(&store, 100, "alpha", Some(1)).await;
    let dc = discord(&store, 200, Some(2)).await;
    let app = app(&store);

    let first = app
        .consolidator
        .consolidate(&[tw.clone()], &[dc.clone()])
        .await
        .unwrap();
    // Stale records still pointing at the retired identity resolve through it.
    let second = app.consolidator.consolidate(&[tw], &[dc]).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(second.points, 15);
}

#[tokio::test]
async fn pulls_in_accounts_already_sharing_an_identity() {
    let store = Arc::new(MemoryStore::new());
    store.insert_identity(identity(1, 1)).await;
    store.insert_identity(identity(2, 2)).await;
    store.insert_identity(identity(3, 4)).await;
    let tw = twitch(&store, 100, "alpha", Some(1)).await;
    let dc = discord(&store, 200, Some(2)).await;
    // Not passed in, but linked to identities that are.
    twitch(&store, 101, "alpha_alt", Some(2)).await;
    discord(&store, 201, Some(3)).await;
    twitch(&store, 102, "alpha_old", Some(3)).await;
    let app = app(&store);

    let merged = app
        .consolidator
        .consolidate(&[tw], &[dc])
        .await
        .unwrap();
    assert_eq!(merged.id, 1);
    // Identity 3 is not reachable: only 201 and 102 point at it.
    assert_eq!(merged.points, 3);
    assert_eq!(store.twitch_user(101).await.unwrap().unwrap().identity, Some(1));
    assert_eq!(store.twitch_user(102).await.unwrap().unwrap().identity, Some(3));

    let linked = store.linked_accounts(1).await.unwrap();
    assert_eq!(linked.twitch, vec![100, 101]);
    assert_eq!(linked.discord, vec![200]);
}

#[tokio::test]
async fn follows_previous_merges() {
    let store = Arc::new(MemoryStore::new());
    store.insert_identity(identity(1, 10)).await;
    store
        .insert_identity(Identity {
            merged_into: Some(1),
            ..identity(2, 0)
        })
        .await;
    let stale = twitch(&store, 100, "alpha", Some(2)).await;
    let app = app(&store);

    let merged = app.consolidator.consolidate(&[stale], &[]).await.unwrap();
    assert_eq!(merged.id, 1);
    assert_eq!(merged.points, 10);
    assert_eq!(store.twitch_user(100).await.unwrap().unwrap().identity, Some(1));
}

#[tokio::test]
async fn creates_an_identity_when_none_exists() {
    let store = Arc::new(MemoryStore::new());
    let tw = twitch(&store, 300, "fresh", None).await;
    let dc = discord(&store, 400, None).await;
    let app = app(&store);

    let created = app.consolidator.consolidate(&[tw], &[dc]).await.unwrap();
    assert_eq!(created.points, 0);
    assert!(!created.admin);
    assert_eq!(store.twitch_user(300).await.unwrap().unwrap().identity, Some(created.id));
    assert_eq!(store.discord_user(400).await.unwrap().unwrap().identity, Some(created.id));
}

#[tokio::test]
async fn empty_input_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let app = app(&store);
    let result = app.consolidator.consolidate(&[], &[]).await;
    assert!(matches!(result, Err(ConsolidateError::NoAccounts)));
}

#[tokio::test]
async fn shared_identity_is_counted_once() {
    let store = Arc::new(MemoryStore::new());
    store.insert_identity(identity(1, 10)).await;
    let tw = twitch(&store, 100, "alpha", Some(1)).await;
    let dc = discord(&store, 200, Some(1)).await;
    let app = app(&store);

    let merged = app.consolidator.consolidate(&[tw], &[dc]).await.unwrap();
    assert_eq!(merged.points, 10);
}

#[tokio::test]
async fn cached_records_see_the_merged_identity() {
    let store = Arc::new(MemoryStore::new());
    store.insert_identity(identity(1, 10)).await;
    store.insert_identity(identity(2, 5)).await;
    let tw = twitch(&store, 100, "alpha", Some(1)).await;
    let dc = discord(&store, 200, Some(2)).await;
    let app = app(&store);

    let before = app.discord_users.get_user_by_id(200, false).await.unwrap();
    assert_eq!(before.identity.map(|i| i.points), Some(5));
    let session = app.sessions.create_session("sess-1", Some(2)).await.unwrap();
    assert_eq!(session.identity.map(|i| i.id), Some(2));

    app.consolidator.consolidate(&[tw], &[dc]).await.unwrap();

    let after = app.discord_users.get_user_by_id(200, false).await.unwrap();
    assert_eq!(after.user.identity, Some(1));
    assert_eq!(after.identity.map(|i| i.points), Some(15));
    let session = app.sessions.get_session_by_id("sess-1", false).await.unwrap();
    assert_eq!(session.session.identity, Some(1));
}

#[tokio::test]
async fn long_merge_chains_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    // 1 -> 2 -> ... -> 30: more hops than the consolidator follows.
    for id in 1..30 {
        store
            .insert_identity(Identity {
                merged_into: Some(id + 1),
                ..identity(id, 0)
            })
            .await;
    }
    store.insert_identity(identity(30, 7)).await;
    let stale = twitch(&store, 100, "alpha", Some(1)).await;
    let app = app(&store);

    let result = app.consolidator.consolidate(&[stale], &[]).await;
    assert!(matches!(
        result,
        Err(ConsolidateError::BrokenMergeChain { start: 1 })
    ));
    assert_eq!(store.twitch_user(100).await.unwrap().unwrap().identity, Some(1));
    assert_eq!(store.identity(1).await.unwrap().unwrap().points, 0);
}

#[tokio::test]
async fn merge_loops_are_rejected() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_identity(Identity {
            merged_into: Some(2),
            ..identity(1, 0)
        })
        .await;
    store
        .insert_identity(Identity {
            merged_into: Some(1),
            ..identity(2, 0)
        })
        .await;
    let looped = twitch(&store, 100, "alpha", Some(1)).await;
    let app = app(&store);

    let result = app.consolidator.consolidate(&[looped], &[]).await;
    assert!(matches!(
        result,
        Err(ConsolidateError::BrokenMergeChain { start: 1 })
    ));
}

#[tokio::test]
async fn chains_within_the_hop_limit_resolve() {
    let store = Arc::new(MemoryStore::new());
    // 16 hops: 1 -> ... -> 17.
    for id in 1..17 {
        store
            .insert_identity(Identity {
                merged_into: Some(id + 1),
                ..identity(id, 0)
            })
            .await;
    }
    store.insert_identity(identity(17, 7)).await;
    let stale = twitch(&store, 100, "alpha", Some(1)).await;
    let app = app(&store);

    let merged = app.consolidator.consolidate(&[stale], &[]).await.unwrap();
    assert_eq!(merged.id, 17);
    assert_eq!(merged.points, 7);
}
