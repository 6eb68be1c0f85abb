//! This module defines the shared data structures used throughout the application.
//! These structs are used as `TypeMapKey`s to store shared state in Serenity's global context.

use crate::cache::{CacheConfig, IdentityInvalidation, TtlCache};
use crate::config::CacheSettings;
use crate::database::AccountStore;
use crate::database::models::{DiscordUserRecord, SessionRecord, TwitchUserRecord};
use crate::services::{DiscordUsers, IdentityConsolidator, Points, Sessions, TwitchUsers};
use serenity::gateway::ShardManager;
use serenity::model::id::UserId;
use serenity::prelude::TypeMapKey;
use std::sync::Arc;

/// A container for the ShardManager, allowing it to be stored in the global context.
/// This provides access to shard-specific information, like gateway latency.
pub struct ShardManagerContainer;

impl TypeMapKey for ShardManagerContainer {
    type Value = Arc<ShardManager>;
}

/// The central, shared state of the application.
/// An `Arc<AppState>` is stored in the global context for easy and safe access
/// from any command or event handler.
pub struct AppState {
    pub store: Arc<dyn AccountStore>,
    pub twitch_users: TwitchUsers,
    pub discord_users: DiscordUsers,
    pub sessions: Sessions,
    pub points: Points,
    pub consolidator: IdentityConsolidator,
    /// Discord users allowed to run `/link` and `/cachestats`.
    pub admin_ids: Vec<u64>,
}

impl AppState {
    /// Builds the caches (starting their sweepers) and the services sharing them.
    /// Must run inside a Tokio runtime.
    pub fn new(store: Arc<dyn AccountStore>, settings: &CacheSettings, admin_ids: Vec<u64>) -> Self {
        let twitch_cache = Arc::new(TtlCache::<TwitchUserRecord>::with_config(
            CacheConfig::new("twitch_users", settings.user_ttl)
                .with_retrieve_timeout(settings.retrieve_timeout),
        ));
        let discord_cache = Arc::new(TtlCache::<DiscordUserRecord>::with_config(
            CacheConfig::new("discord_users", settings.user_ttl)
                .with_retrieve_timeout(settings.retrieve_timeout),
        ));
        let session_cache = Arc::new(TtlCache::<SessionRecord>::with_config(
            CacheConfig::new("sessions", settings.session_ttl)
                .with_retrieve_timeout(settings.retrieve_timeout),
        ));
        let invalidators: Vec<Arc<dyn IdentityInvalidation>> = vec![
            twitch_cache.clone(),
            discord_cache.clone(),
            session_cache.clone(),
        ];

        Self {
            twitch_users: TwitchUsers::new(store.clone(), twitch_cache),
            discord_users: DiscordUsers::new(store.clone(), discord_cache),
            sessions: Sessions::new(store.clone(), session_cache),
            points: Points::new(store.clone(), invalidators.clone()),
            consolidator: IdentityConsolidator::new(store.clone(), invalidators),
            store,
            admin_ids,
        }
    }

    pub async fn from_ctx(ctx: &serenity::prelude::Context) -> Option<Arc<Self>> {
        ctx.data.read().await.get::<AppState>().cloned()
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_ids.contains(&user_id.get())
    }

    /// Stops every cache sweeper; used on shutdown.
    pub fn stop_caches(&self) {
        self.twitch_users.cache().stop();
        self.discord_users.cache().stop();
        self.sessions.cache().stop();
    }
}

impl TypeMapKey for AppState {
    type Value = Arc<AppState>;
}
