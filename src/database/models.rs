//! Contains all the data structures that map to database tables or query results,
//! plus the cached records built from them.

use crate::cache::IdentityScoped;
use sqlx::Type;
use sqlx::types::chrono::{DateTime, Utc};

pub type IdentityId = i64;

// --- Identity ---
#[derive(Debug, Clone, Copy, Type, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i32)]
pub enum SupporterTier {
    TwitchSubscriber = 1,
    PatreonSupporter = 2,
    PatreonEnabler = 3,
    PatreonPremium = 4,
}

/// The merged person behind one or more Twitch/Discord accounts.
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: IdentityId,
    pub authenticated: bool,
    pub admin: bool,
    pub moderator: bool,
    pub points: i64,
    pub supporter: Option<SupporterTier>,
    /// Set once this identity has been folded into another one.
    pub merged_into: Option<IdentityId>,
}

impl Identity {
    pub fn empty(id: IdentityId) -> Self {
        Self {
            id,
            authenticated: false,
            admin: false,
            moderator: false,
            points: 0,
            supporter: None,
            merged_into: None,
        }
    }

    /// Folds `other` into `self`: privilege flags are ORed, points summed, and the
    /// higher supporter tier kept.
    pub fn absorb(&mut self, other: &Identity) {
        self.authenticated |= other.authenticated;
        self.admin |= other.admin;
        self.moderator |= other.moderator;
        self.points = self.points.saturating_add(other.points.max(0));
        self.supporter = self.supporter.max(other.supporter);
    }

    /// Fields written onto an identity once it has been absorbed.
    pub fn retire_into(&mut self, survivor: IdentityId) {
        self.merged_into = Some(survivor);
        self.points = 0;
    }
}

// --- External accounts ---
#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct TwitchUser {
    pub id: i64,
    pub login: String,
    pub display_name: String,
    pub identity: Option<IdentityId>,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct DiscordUser {
    pub id: i64,
    pub global_name: Option<String>,
    pub display_name: Option<String>,
    pub identity: Option<IdentityId>,
}

impl DiscordUser {
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .or_else(|| self.global_name.clone())
            .unwrap_or_else(|| self.id.to_string())
    }
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub identity: Option<IdentityId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Ids of every account currently pointing at one identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedAccounts {
    pub twitch: Vec<i64>,
    pub discord: Vec<i64>,
}

/// Everything a store needs to apply one consolidation atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationPlan {
    pub survivor: IdentityId,
    /// Identities absorbed into the survivor, in encounter order.
    pub retired: Vec<IdentityId>,
    pub twitch_accounts: Vec<i64>,
    pub discord_accounts: Vec<i64>,
}

// --- Cached records (account + populated identity) ---
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitchUserRecord {
    pub user: TwitchUser,
    pub identity: Option<Identity>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscordUserRecord {
    pub user: DiscordUser,
    pub identity: Option<Identity>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub session: Session,
    pub identity: Option<Identity>,
}

impl IdentityScoped for TwitchUserRecord {
    fn identity_id(&self) -> Option<IdentityId> {
        self.user.identity
    }
}

impl IdentityScoped for DiscordUserRecord {
    fn identity_id(&self) -> Option<IdentityId> {
        self.user.identity
    }
}

impl IdentityScoped for SessionRecord {
    fn identity_id(&self) -> Option<IdentityId> {
        self.session.identity
    }
}
