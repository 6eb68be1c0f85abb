//! Point balance adjustments. Every change goes through the store first and then
//! evicts cached records embedding the identity, so the next lookup sees the new
//! balance.
use super::{Invalidators, invalidate_identities};
use crate::database::models::{Identity, IdentityId};
use crate::database::{AccountStore, StoreError};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct Points {
    store: Arc<dyn AccountStore>,
    caches: Invalidators,
}

impl Points {
    pub fn new(store: Arc<dyn AccountStore>, caches: Invalidators) -> Self {
        Self { store, caches }
    }

    /// Adds `amount` points, returning the updated identity.
    #[instrument(level = "debug", skip(self))]
    pub async fn add_points(
        &self,
        identity: IdentityId,
        amount: u32,
    ) -> Result<Identity, StoreError> {
        self.adjust(identity, i64::from(amount)).await
    }

    /// Removes `amount` points; fails with `InsufficientPoints` rather than going
    /// negative.
    #[instrument(level = "debug", skip(self))]
    pub async fn remove_points(
        &self,
        identity: IdentityId,
        amount: u32,
    ) -> Result<Identity, StoreError> {
        self.adjust(identity, -i64::from(amount)).await
    }

    async fn adjust(&self, identity: IdentityId, delta: i64) -> Result<Identity, StoreError> {
        let updated = self.store.adjust_points(identity, delta).await?;
        invalidate_identities(&self.caches, &[identity]).await;
        info!(target = "points", identity, delta, total = updated.points, "points adjusted");
        Ok(updated)
    }
}
