//! In-memory [`AccountStore`], used by the test-suite and for running the bot
//! without a database (`DATABASE_URL=memory`).

use super::models::{
    ConsolidationPlan, DiscordUser, Identity, IdentityId, LinkedAccounts, Session, TwitchUser,
};
use super::{AccountStore, StoreError};
use crate::constants::SESSION_LENGTH_DAYS;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    identities: BTreeMap<IdentityId, Identity>,
    twitch_users: BTreeMap<i64, TwitchUser>,
    discord_users: BTreeMap<i64, DiscordUser>,
    sessions: HashMap<String, Session>,
    next_identity: IdentityId,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    account_reads: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of single-account reads (Twitch, Discord or session) served so far.
    pub fn account_reads(&self) -> u64 {
        self.account_reads.load(Ordering::SeqCst)
    }

    fn count_read(&self) {
        self.account_reads.fetch_add(1, Ordering::SeqCst);
    }

    /// Inserts an identity with explicit fields, keeping the id counter ahead of it.
    pub async fn insert_identity(&self, identity: Identity) -> Identity {
        let mut t = self.tables.write().await;
        t.next_identity = t.next_identity.max(identity.id);
        t.identities.insert(identity.id, identity.clone());
        identity
    }

    /// Sessions with arbitrary timestamps (e.g. already expired ones).
    pub async fn insert_session(&self, session: Session) {
        self.tables
            .write()
            .await
            .sessions
            .insert(session.id.clone(), session);
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn twitch_user(&self, id: i64) -> Result<Option<TwitchUser>, StoreError> {
        self.count_read();
        Ok(self.tables.read().await.twitch_users.get(&id).cloned())
    }

    async fn twitch_user_by_login(&self, login: &str) -> Result<Option<TwitchUser>, StoreError> {
        self.count_read();
        let t = self.tables.read().await;
        Ok(t.twitch_users.values().find(|u| u.login == login).cloned())
    }

    async fn upsert_twitch_user(&self, user: &TwitchUser) -> Result<TwitchUser, StoreError> {
        let mut t = self.tables.write().await;
        let mut stored = user.clone();
        if stored.identity.is_none() {
            stored.identity = t.twitch_users.get(&user.id).and_then(|u| u.identity);
        }
        t.twitch_users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn discord_user(&self, id: i64) -> Result<Option<DiscordUser>, StoreError> {
        self.count_read();
        Ok(self.tables.read().await.discord_users.get(&id).cloned())
    }

    async fn upsert_discord_user(&self, user: &DiscordUser) -> Result<DiscordUser, StoreError> {
        let mut t = self.tables.write().await;
        let mut stored = user.clone();
        if stored.identity.is_none() {
            stored.identity = t.discord_users.get(&user.id).and_then(|u| u.identity);
        }
        t.discord_users.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        self.count_read();
        Ok(self.tables.read().await.sessions.get(id).cloned())
    }

    async fn create_session(
        &self,
        id: &str,
        identity: Option<IdentityId>,
    ) -> Result<Session, StoreError> {
        let now = Utc::now();
        let session = Session {
            id: id.to_string(),
            identity,
            created_at: now,
            expires_at: now + Duration::days(SESSION_LENGTH_DAYS),
            last_used: now,
        };
        self.insert_session(session.clone()).await;
        Ok(session)
    }

    async fn touch_session(&self, id: &str) -> Result<(), StoreError> {
        if let Some(s) = self.tables.write().await.sessions.get_mut(id) {
            s.last_used = Utc::now();
        }
        Ok(())
    }

    async fn identity(&self, id: IdentityId) -> Result<Option<Identity>, StoreError> {
        Ok(self.tables.read().await.identities.get(&id).cloned())
    }

    async fn create_identity(&self) -> Result<Identity, StoreError> {
        let mut t = self.tables.write().await;
        t.next_identity += 1;
        let identity = Identity::empty(t.next_identity);
        t.identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn linked_accounts(&self, identity: IdentityId) -> Result<LinkedAccounts, StoreError> {
        let t = self.tables.read().await;
        Ok(LinkedAccounts {
            twitch: t
                .twitch_users
                .values()
                .filter(|u| u.identity == Some(identity))
                .map(|u| u.id)
                .collect(),
            discord: t
                .discord_users
                .values()
                .filter(|u| u.identity == Some(identity))
                .map(|u| u.id)
                .collect(),
        })
    }

    async fn apply_consolidation(&self, plan: &ConsolidationPlan) -> Result<Identity, StoreError> {
        // Single write guard for the whole plan: readers never see a half-applied merge.
        let mut t = self.tables.write().await;
        let mut survivor = t
            .identities
            .get(&plan.survivor)
            .cloned()
            .ok_or_else(|| StoreError::not_found("identity", plan.survivor))?;
        let mut absorbed = Vec::new();
        for id in &plan.retired {
            let retired = t
                .identities
                .get(id)
                .ok_or_else(|| StoreError::not_found("identity", id))?;
            if retired.merged_into.is_none() {
                survivor.absorb(retired);
                absorbed.push(*id);
            }
        }
        for id in absorbed {
            if let Some(retired) = t.identities.get_mut(&id) {
                retired.retire_into(survivor.id);
            }
        }
        t.identities.insert(survivor.id, survivor.clone());

        for session in t.sessions.values_mut() {
            if session.identity.is_some_and(|i| plan.retired.contains(&i)) {
                session.identity = Some(survivor.id);
            }
        }
        for id in &plan.twitch_accounts {
            if let Some(u) = t.twitch_users.get_mut(id) {
                u.identity = Some(survivor.id);
            }
        }
        for id in &plan.discord_accounts {
            if let Some(u) = t.discord_users.get_mut(id) {
                u.identity = Some(survivor.id);
            }
        }
        Ok(survivor)
    }

    async fn adjust_points(&self, identity: IdentityId, delta: i64) -> Result<Identity, StoreError> {
        let mut t = self.tables.write().await;
        let current = t
            .identities
            .get_mut(&identity)
            .ok_or_else(|| StoreError::not_found("identity", identity))?;
        let next = current.points.saturating_add(delta);
        if next < 0 {
            return Err(StoreError::InsufficientPoints {
                required: -delta,
                available: current.points,
            });
        }
        current.points = next;
        Ok(current.clone())
    }
}
