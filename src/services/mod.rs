//! Service layer: cached account lookups and the identity-mutating operations
//! that must keep those caches honest.

pub mod identity;
pub mod points;
pub mod sessions;
pub mod users;

use crate::cache::IdentityInvalidation;
use crate::database::models::{Identity, IdentityId};
use crate::database::{AccountStore, StoreError};
use std::sync::Arc;
use tracing::debug;

pub use identity::{ConsolidateError, IdentityConsolidator};
pub use points::Points;
pub use sessions::Sessions;
pub use users::{DiscordUsers, TwitchUsers};

/// Caches holding identity-scoped records, type-erased.
pub type Invalidators = Vec<Arc<dyn IdentityInvalidation>>;

/// Evicts every cached record referencing any of `identities` from every cache.
pub(crate) async fn invalidate_identities(
    caches: &[Arc<dyn IdentityInvalidation>],
    identities: &[IdentityId],
) -> usize {
    let mut evicted = 0;
    for cache in caches {
        for id in identities {
            let n = cache.invalidate_identity(*id).await;
            if n > 0 {
                debug!(target = "cache.invalidate", cache = cache.cache_name(), identity = id, evicted = n);
            }
            evicted += n;
        }
    }
    evicted
}

/// Loads the identity an account points at, mirroring a populated reference.
pub(crate) async fn populate_identity(
    store: &dyn AccountStore,
    identity: Option<IdentityId>,
) -> Result<Option<Identity>, StoreError> {
    match identity {
        Some(id) => store.identity(id).await,
        None => Ok(None),
    }
}
