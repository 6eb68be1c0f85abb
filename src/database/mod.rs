//! This module acts as a central hub for all database-related logic.
//! It declares the storage seam (`AccountStore`) and its two implementations:
//! PostgreSQL for the running bot and an in-memory store for tests and local runs.

pub mod init;
pub mod memory;
pub mod models;
pub mod postgres;

use crate::cache::CacheError;
use async_trait::async_trait;
use models::{
    ConsolidationPlan, DiscordUser, Identity, IdentityId, LinkedAccounts, Session, TwitchUser,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("Not enough points! Requires {required} points, {available} points present.")]
    InsufficientPoints { required: i64, available: i64 },
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for CacheError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => CacheError::NotFound(e.to_string()),
            other => CacheError::Store(other.to_string()),
        }
    }
}

/// Persistence needed by the user caches, the consolidator and point adjustments.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn twitch_user(&self, id: i64) -> Result<Option<TwitchUser>, StoreError>;

    /// `login` is expected lowercase without a leading `#`.
    async fn twitch_user_by_login(&self, login: &str) -> Result<Option<TwitchUser>, StoreError>;

    /// Inserts or refreshes profile fields. An existing identity link is kept when
    /// `user.identity` is `None`.
    async fn upsert_twitch_user(&self, user: &TwitchUser) -> Result<TwitchUser, StoreError>;

    async fn discord_user(&self, id: i64) -> Result<Option<DiscordUser>, StoreError>;

    /// Same link-preserving semantics as [`AccountStore::upsert_twitch_user`].
    async fn upsert_discord_user(&self, user: &DiscordUser) -> Result<DiscordUser, StoreError>;

    async fn session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    async fn create_session(
        &self,
        id: &str,
        identity: Option<IdentityId>,
    ) -> Result<Session, StoreError>;

    /// Bumps `last_used` to now.
    async fn touch_session(&self, id: &str) -> Result<(), StoreError>;

    async fn identity(&self, id: IdentityId) -> Result<Option<Identity>, StoreError>;

    async fn create_identity(&self) -> Result<Identity, StoreError>;

    async fn linked_accounts(&self, identity: IdentityId) -> Result<LinkedAccounts, StoreError>;

    /// Applies a consolidation as one unit: absorbs every not-yet-retired identity
    /// in `plan.retired` into the survivor, marks them retired, and re-points the
    /// listed accounts plus any sessions of retired identities to the survivor.
    /// Returns the survivor as stored afterwards.
    async fn apply_consolidation(&self, plan: &ConsolidationPlan) -> Result<Identity, StoreError>;

    /// Adds `delta` (may be negative) to an identity's points, refusing to go below zero.
    async fn adjust_points(&self, identity: IdentityId, delta: i64) -> Result<Identity, StoreError>;
}
