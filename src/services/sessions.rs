//! Web session lookups. Session ids are opaque strings, so no numeric normalization.
use super::populate_identity;
use crate::cache::{CacheError, TtlCache};
use crate::constants::SESSION_NOT_FOUND;
use crate::database::models::{IdentityId, SessionRecord};
use crate::database::{AccountStore, StoreError};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument};

fn session_not_found() -> CacheError {
    CacheError::NotFound(SESSION_NOT_FOUND.to_string())
}

pub struct Sessions {
    store: Arc<dyn AccountStore>,
    cache: Arc<TtlCache<SessionRecord>>,
}

impl Sessions {
    pub fn new(store: Arc<dyn AccountStore>, cache: Arc<TtlCache<SessionRecord>>) -> Self {
        Self { store, cache }
    }

    pub fn cache(&self) -> &Arc<TtlCache<SessionRecord>> {
        &self.cache
    }

    /// Fetches a live session. Expired sessions are reported as not found, also when
    /// they expire while cached.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_session_by_id(
        &self,
        id: &str,
        override_cache: bool,
    ) -> Result<SessionRecord, CacheError> {
        let store = Arc::clone(&self.store);
        let sid = id.to_string();
        let record = self
            .cache
            .get(
                id,
                move || async move {
                    let session = store
                        .session(&sid)
                        .await?
                        .filter(|s| !s.is_expired(Utc::now()))
                        .ok_or_else(session_not_found)?;
                    store.touch_session(&sid).await?;
                    let identity = populate_identity(store.as_ref(), session.identity).await?;
                    Ok(SessionRecord { session, identity })
                },
                override_cache,
                false,
            )
            .await?;
        if record.session.is_expired(Utc::now()) {
            debug!(target = "sessions", id, "cached session expired");
            self.cache.remove(id).await;
            return Err(session_not_found());
        }
        Ok(record)
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn create_session(
        &self,
        id: &str,
        identity: Option<IdentityId>,
    ) -> Result<SessionRecord, StoreError> {
        let session = self.store.create_session(id, identity).await?;
        let identity = populate_identity(self.store.as_ref(), session.identity).await?;
        let record = SessionRecord { session, identity };
        self.cache.put(id, record.clone()).await;
        Ok(record)
    }

    pub async fn forget(&self, id: &str) -> bool {
        self.cache.remove(id).await
    }
}
