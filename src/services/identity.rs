//! Identity consolidation: folds every identity reachable from a set of Twitch and
//! Discord accounts into one survivor.
//!
//! The walk only reads. Everything it decides is collected into a
//! [`ConsolidationPlan`] that the store applies as one unit, after which the
//! caches drop every record that still embeds a retired (or the updated
//! surviving) identity. Running the same consolidation twice is a no-op the second
//! time: all accounts already point at the survivor, so nothing is retired and no
//! points move.
use super::{Invalidators, invalidate_identities};
use crate::database::models::{ConsolidationPlan, DiscordUser, Identity, IdentityId, TwitchUser};
use crate::database::{AccountStore, StoreError};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// Longest `merged_into` chain followed before giving up on resolving an identity.
const MAX_MERGE_HOPS: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ConsolidateError {
    #[error("no accounts given to consolidate")]
    NoAccounts,
    /// `merged_into` loops back on itself or runs past `MAX_MERGE_HOPS`.
    #[error("merge chain starting at identity {start} does not end in a live identity")]
    BrokenMergeChain { start: IdentityId },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct IdentityConsolidator {
    store: Arc<dyn AccountStore>,
    caches: Invalidators,
    // Serializes consolidations within this process.
    lock: Mutex<()>,
}

#[derive(Default)]
struct Walk {
    survivor: Option<IdentityId>,
    retired: Vec<IdentityId>,
    seen: HashSet<IdentityId>,
    expanded: HashSet<IdentityId>,
    twitch: Vec<i64>,
    discord: Vec<i64>,
}

fn push_unique(list: &mut Vec<i64>, id: i64) {
    if !list.contains(&id) {
        list.push(id);
    }
}

impl IdentityConsolidator {
    pub fn new(store: Arc<dyn AccountStore>, caches: Invalidators) -> Self {
        Self {
            store,
            caches,
            lock: Mutex::new(()),
        }
    }

    /// Makes every given account (and every account already sharing an identity with
    /// one of them) point at a single identity, and returns it.
    ///
    /// The first identity found (Twitch accounts first, in order) survives. Every
    /// other distinct identity is absorbed: `authenticated`, `admin` and `moderator`
    /// are ORed, points summed. With no identity anywhere a fresh one is created.
    #[instrument(level = "debug", skip_all, fields(twitch = twitch_accounts.len(), discord = discord_accounts.len()))]
    pub async fn consolidate(
        &self,
        twitch_accounts: &[TwitchUser],
        discord_accounts: &[DiscordUser],
    ) -> Result<Identity, ConsolidateError> {
        if twitch_accounts.is_empty() && discord_accounts.is_empty() {
            return Err(ConsolidateError::NoAccounts);
        }
        let _guard = self.lock.lock().await;

        let mut walk = Walk::default();
        for account in twitch_accounts {
            push_unique(&mut walk.twitch, account.id);
        }
        for account in discord_accounts {
            push_unique(&mut walk.discord, account.id);
        }

        // Links are re-read: the records handed in may come from a cache.
        let mut links = Vec::with_capacity(walk.twitch.len() + walk.discord.len());
        for id in &walk.twitch {
            let user = self
                .store
                .twitch_user(*id)
                .await?
                .ok_or_else(|| StoreError::not_found("twitch user", id))?;
            links.push(user.identity);
        }
        for id in &walk.discord {
            let user = self
                .store
                .discord_user(*id)
                .await?
                .ok_or_else(|| StoreError::not_found("discord user", id))?;
            links.push(user.identity);
        }

        for identity in links.into_iter().flatten() {
            let chain = self.resolve(identity).await?;
            for hop in &chain {
                self.gather_linked(&mut walk, *hop).await?;
            }
            let Some(&live) = chain.last() else {
                continue;
            };
            if !walk.seen.insert(live) {
                continue;
            }
            match walk.survivor {
                None => walk.survivor = Some(live),
                Some(_) => walk.retired.push(live),
            }
        }

        let survivor = match walk.survivor {
            Some(id) => id,
            None => {
                let created = self.store.create_identity().await?;
                info!(target = "identity.consolidate", identity = created.id, "created identity");
                created.id
            }
        };

        let plan = ConsolidationPlan {
            survivor,
            retired: walk.retired,
            twitch_accounts: walk.twitch,
            discord_accounts: walk.discord,
        };
        let merged = self.store.apply_consolidation(&plan).await?;

        let mut touched = plan.retired.clone();
        touched.push(merged.id);
        let evicted = invalidate_identities(&self.caches, &touched).await;
        info!(
            target = "identity.consolidate",
            survivor = merged.id,
            retired = ?plan.retired,
            twitch = plan.twitch_accounts.len(),
            discord = plan.discord_accounts.len(),
            evicted,
            "identities consolidated"
        );
        Ok(merged)
    }

    /// Follows `merged_into` from `id`; the last element is the live identity.
    async fn resolve(&self, id: IdentityId) -> Result<Vec<IdentityId>, ConsolidateError> {
        let mut chain = vec![id];
        let mut current = id;
        for _ in 0..=MAX_MERGE_HOPS {
            let identity = self
                .store
                .identity(current)
                .await?
                .ok_or_else(|| StoreError::not_found("identity", current))?;
            match identity.merged_into {
                None => return Ok(chain),
                Some(next) if chain.contains(&next) => {
                    warn!(target = "identity.consolidate", start = id, at = next, "merge chain loops");
                    return Err(ConsolidateError::BrokenMergeChain { start: id });
                }
                Some(next) => {
                    chain.push(next);
                    current = next;
                }
            }
        }
        warn!(target = "identity.consolidate", start = id, "merge chain too long");
        Err(ConsolidateError::BrokenMergeChain { start: id })
    }

    /// Adds accounts already pointing at `identity` to the walk.
    async fn gather_linked(&self, walk: &mut Walk, identity: IdentityId) -> Result<(), StoreError> {
        if !walk.expanded.insert(identity) {
            return Ok(());
        }
        let linked = self.store.linked_accounts(identity).await?;
        for id in linked.twitch {
            push_unique(&mut walk.twitch, id);
        }
        for id in linked.discord {
            push_unique(&mut walk.discord, id);
        }
        Ok(())
    }
}
