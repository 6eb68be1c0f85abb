//! Twitch and Discord user lookups through the identity-aware caches.
use super::populate_identity;
use crate::cache::{CacheError, CacheKey, KeyParse, TtlCache};
use crate::constants::USER_NOT_FOUND;
use crate::database::AccountStore;
use crate::database::models::{DiscordUser, DiscordUserRecord, TwitchUserRecord};
use crate::util::normalize_login;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

fn user_not_found() -> CacheError {
    CacheError::NotFound(USER_NOT_FOUND.to_string())
}

pub struct TwitchUsers {
    store: Arc<dyn AccountStore>,
    cache: Arc<TtlCache<TwitchUserRecord>>,
    /// login -> id, filled by name lookups.
    names: RwLock<HashMap<String, i64>>,
}

impl TwitchUsers {
    pub fn new(store: Arc<dyn AccountStore>, cache: Arc<TtlCache<TwitchUserRecord>>) -> Self {
        Self {
            store,
            cache,
            names: RwLock::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<TtlCache<TwitchUserRecord>> {
        &self.cache
    }

    /// Looks a user up by Twitch id (numeric or numeric-looking text).
    #[instrument(level = "debug", skip(self, id))]
    pub async fn get_user_by_id(
        &self,
        id: impl Into<CacheKey>,
        bypass_cache: bool,
    ) -> Result<TwitchUserRecord, CacheError> {
        let key = id.into();
        let parsed = key.parse_numeric();
        let store = Arc::clone(&self.store);
        self.cache
            .get(
                key,
                move || async move {
                    let KeyParse::Parsed(id) = parsed else {
                        return Err(user_not_found());
                    };
                    let user = store.twitch_user(id).await?.ok_or_else(user_not_found)?;
                    let identity = populate_identity(store.as_ref(), user.identity).await?;
                    Ok(TwitchUserRecord { user, identity })
                },
                bypass_cache,
                true,
            )
            .await
    }

    /// Looks a user up by login (`#Name` and any casing accepted).
    #[instrument(level = "debug", skip(self))]
    pub async fn get_user_by_name(
        &self,
        login: &str,
        bypass_cache: bool,
    ) -> Result<TwitchUserRecord, CacheError> {
        let login = normalize_login(login);
        let known = self.names.read().await.get(&login).copied();
        if let Some(id) = known {
            match self.get_user_by_id(id, bypass_cache).await {
                Ok(record) => return Ok(record),
                Err(e) => debug!(target = "twitch.users", %login, id, error = %e, "name cache entry is stale"),
            }
        }
        let user = self
            .store
            .twitch_user_by_login(&login)
            .await?
            .ok_or_else(user_not_found)?;
        self.names.write().await.insert(user.login.clone(), user.id);
        let identity = populate_identity(self.store.as_ref(), user.identity).await?;
        let record = TwitchUserRecord { user, identity };
        self.cache.put(record.user.id, record.clone()).await;
        Ok(record)
    }
}

pub struct DiscordUsers {
    store: Arc<dyn AccountStore>,
    cache: Arc<TtlCache<DiscordUserRecord>>,
}

impl DiscordUsers {
    pub fn new(store: Arc<dyn AccountStore>, cache: Arc<TtlCache<DiscordUserRecord>>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<TtlCache<DiscordUserRecord>> {
        &self.cache
    }

    #[instrument(level = "debug", skip(self, id))]
    pub async fn get_user_by_id(
        &self,
        id: impl Into<CacheKey>,
        bypass_cache: bool,
    ) -> Result<DiscordUserRecord, CacheError> {
        let key = id.into();
        let parsed = key.parse_numeric();
        let store = Arc::clone(&self.store);
        self.cache
            .get(
                key,
                move || async move {
                    let KeyParse::Parsed(id) = parsed else {
                        return Err(user_not_found());
                    };
                    let user = store.discord_user(id).await?.ok_or_else(user_not_found)?;
                    let identity = populate_identity(store.as_ref(), user.identity).await?;
                    Ok(DiscordUserRecord { user, identity })
                },
                bypass_cache,
                true,
            )
            .await
    }

    /// Like [`DiscordUsers::get_user_by_id`], but records a user seen on the gateway
    /// when the store does not know them yet.
    #[instrument(level = "debug", skip(self, user), fields(id = user.id.get()))]
    pub async fn get_or_create(
        &self,
        user: &serenity::model::user::User,
    ) -> Result<DiscordUserRecord, CacheError> {
        match self.get_user_by_id(user.id, false).await {
            Err(CacheError::NotFound(_)) => {}
            other => return other,
        }
        let id = i64::try_from(user.id.get()).map_err(|_| user_not_found())?;
        let stored = self
            .store
            .upsert_discord_user(&DiscordUser {
                id,
                global_name: user.global_name.clone(),
                display_name: Some(user.display_name().to_string()),
                identity: None,
            })
            .await?;
        debug!(target = "discord.users", id, "recorded new user");
        let identity = populate_identity(self.store.as_ref(), stored.identity).await?;
        let record = DiscordUserRecord {
            user: stored,
            identity,
        };
        self.cache.put(id, record.clone()).await;
        Ok(record)
    }
}
