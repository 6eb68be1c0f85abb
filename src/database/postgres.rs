//! PostgreSQL implementation of [`AccountStore`].

use super::init::DbPool;
use super::models::{
    ConsolidationPlan, DiscordUser, Identity, IdentityId, LinkedAccounts, Session, TwitchUser,
};
use super::{AccountStore, StoreError};
use crate::constants::SESSION_LENGTH_DAYS;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, instrument};

const IDENTITY_COLUMNS: &str = "id, authenticated, admin, moderator, points, supporter, merged_into";

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl AccountStore for PgStore {
    #[instrument(level = "debug", skip(self))]
    async fn twitch_user(&self, id: i64) -> Result<Option<TwitchUser>, StoreError> {
        let user = sqlx::query_as::<_, TwitchUser>(
            "SELECT id, login, display_name, identity FROM twitch_users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    #[instrument(level = "debug", skip(self))]
    async fn twitch_user_by_login(&self, login: &str) -> Result<Option<TwitchUser>, StoreError> {
        let user = sqlx::query_as::<_, TwitchUser>(
            "SELECT id, login, display_name, identity FROM twitch_users WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    #[instrument(level = "debug", skip(self, user), fields(id = user.id))]
    async fn upsert_twitch_user(&self, user: &TwitchUser) -> Result<TwitchUser, StoreError> {
        let stored = sqlx::query_as::<_, TwitchUser>(
            r#"INSERT INTO twitch_users (id, login, display_name, identity) VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET login = EXCLUDED.login, display_name = EXCLUDED.display_name,
                identity = COALESCE(EXCLUDED.identity, twitch_users.identity), updated_at = NOW()
            RETURNING id, login, display_name, identity"#,
        )
        .bind(user.id)
        .bind(&user.login)
        .bind(&user.display_name)
        .bind(user.identity)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    #[instrument(level = "debug", skip(self))]
    async fn discord_user(&self, id: i64) -> Result<Option<DiscordUser>, StoreError> {
        let user = sqlx::query_as::<_, DiscordUser>(
            "SELECT id, global_name, display_name, identity FROM discord_users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    #[instrument(level = "debug", skip(self, user), fields(id = user.id))]
    async fn upsert_discord_user(&self, user: &DiscordUser) -> Result<DiscordUser, StoreError> {
        let stored = sqlx::query_as::<_, DiscordUser>(
            r#"INSERT INTO discord_users (id, global_name, display_name, identity) VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET global_name = EXCLUDED.global_name, display_name = EXCLUDED.display_name,
                identity = COALESCE(EXCLUDED.identity, discord_users.identity), updated_at = NOW()
            RETURNING id, global_name, display_name, identity"#,
        )
        .bind(user.id)
        .bind(&user.global_name)
        .bind(&user.display_name)
        .bind(user.identity)
        .fetch_one(&self.pool)
        .await?;
        Ok(stored)
    }

    #[instrument(level = "debug", skip(self))]
    async fn session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT id, identity, created_at, expires_at, last_used FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    #[instrument(level = "debug", skip(self))]
    async fn create_session(
        &self,
        id: &str,
        identity: Option<IdentityId>,
    ) -> Result<Session, StoreError> {
        let now = Utc::now();
        let session = sqlx::query_as::<_, Session>(
            r#"INSERT INTO sessions (id, identity, created_at, expires_at, last_used) VALUES ($1, $2, $3, $4, $3)
            RETURNING id, identity, created_at, expires_at, last_used"#,
        )
        .bind(id)
        .bind(identity)
        .bind(now)
        .bind(now + Duration::days(SESSION_LENGTH_DAYS))
        .fetch_one(&self.pool)
        .await?;
        Ok(session)
    }

    #[instrument(level = "debug", skip(self))]
    async fn touch_session(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET last_used = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn identity(&self, id: IdentityId) -> Result<Option<Identity>, StoreError> {
        let identity = sqlx::query_as::<_, Identity>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(identity)
    }

    #[instrument(level = "debug", skip(self))]
    async fn create_identity(&self) -> Result<Identity, StoreError> {
        let identity = sqlx::query_as::<_, Identity>(&format!(
            "INSERT INTO identities DEFAULT VALUES RETURNING {IDENTITY_COLUMNS}"
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(identity)
    }

    #[instrument(level = "debug", skip(self))]
    async fn linked_accounts(&self, identity: IdentityId) -> Result<LinkedAccounts, StoreError> {
        let twitch = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM twitch_users WHERE identity = $1 ORDER BY id",
        )
        .bind(identity)
        .fetch_all(&self.pool)
        .await?;
        let discord = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM discord_users WHERE identity = $1 ORDER BY id",
        )
        .bind(identity)
        .fetch_all(&self.pool)
        .await?;
        Ok(LinkedAccounts { twitch, discord })
    }

    #[instrument(level = "debug", skip(self, plan), fields(survivor = plan.survivor, retired = plan.retired.len()))]
    async fn apply_consolidation(&self, plan: &ConsolidationPlan) -> Result<Identity, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut ids = Vec::with_capacity(plan.retired.len() + 1);
        ids.push(plan.survivor);
        ids.extend(plan.retired.iter().copied());
        // Lock in id order so concurrent consolidations cannot deadlock each other.
        let rows = sqlx::query_as::<_, Identity>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        ))
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        let mut survivor = rows
            .iter()
            .find(|i| i.id == plan.survivor)
            .cloned()
            .ok_or_else(|| StoreError::not_found("identity", plan.survivor))?;
        let mut absorbed = Vec::new();
        for id in &plan.retired {
            let Some(retired) = rows.iter().find(|i| i.id == *id) else {
                return Err(StoreError::not_found("identity", id));
            };
            if retired.merged_into.is_some() {
                debug!(target = "db.identity", id, "already retired; skipping");
                continue;
            }
            survivor.absorb(retired);
            absorbed.push(*id);
        }

        let survivor = sqlx::query_as::<_, Identity>(&format!(
            r#"UPDATE identities SET authenticated = $2, admin = $3, moderator = $4, points = $5, supporter = $6
            WHERE id = $1 RETURNING {IDENTITY_COLUMNS}"#
        ))
        .bind(survivor.id)
        .bind(survivor.authenticated)
        .bind(survivor.admin)
        .bind(survivor.moderator)
        .bind(survivor.points)
        .bind(survivor.supporter)
        .fetch_one(&mut *tx)
        .await?;

        if !absorbed.is_empty() {
            sqlx::query("UPDATE identities SET merged_into = $1, points = 0 WHERE id = ANY($2)")
                .bind(survivor.id)
                .bind(&absorbed)
                .execute(&mut *tx)
                .await?;
        }
        if !plan.retired.is_empty() {
            sqlx::query("UPDATE sessions SET identity = $1 WHERE identity = ANY($2)")
                .bind(survivor.id)
                .bind(&plan.retired)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("UPDATE twitch_users SET identity = $1, updated_at = NOW() WHERE id = ANY($2)")
            .bind(survivor.id)
            .bind(&plan.twitch_accounts)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE discord_users SET identity = $1, updated_at = NOW() WHERE id = ANY($2)")
            .bind(survivor.id)
            .bind(&plan.discord_accounts)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(survivor)
    }

    #[instrument(level = "debug", skip(self))]
    async fn adjust_points(&self, identity: IdentityId, delta: i64) -> Result<Identity, StoreError> {
        // Prevent negative balances.
        let updated = sqlx::query_as::<_, Identity>(&format!(
            "UPDATE identities SET points = points + $2 WHERE id = $1 AND points + $2 >= 0 RETURNING {IDENTITY_COLUMNS}"
        ))
        .bind(identity)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;
        match updated {
            Some(identity) => Ok(identity),
            None => match self.identity(identity).await? {
                Some(current) => Err(StoreError::InsufficientPoints {
                    required: -delta,
                    available: current.points,
                }),
                None => Err(StoreError::not_found("identity", identity)),
            },
        }
    }
}
