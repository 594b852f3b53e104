//! In-memory identity store
//!
//! Keeps each identity behind its own `parking_lot::Mutex` inside a
//! `DashMap`, so counter increments are read-modify-writes under the
//! identity's lock and the daily reset is a single conditional update.
//! Suitable for tests and single-process deployments; a database
//! backend replaces it without touching the engine.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use rotary_health::HealthStatus;

use crate::{
    breaker::PauseReason,
    error::StoreError,
    store::IdentityStore,
    throttle::ThrottleDecay,
    types::{HealthSnapshot, IdentityId, SendingIdentity},
};

/// In-memory [`IdentityStore`] backend.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identities: DashMap<IdentityId, Arc<parking_lot::Mutex<SendingIdentity>>>,
}

impl MemoryIdentityStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            identities: DashMap::new(),
        }
    }

    /// Number of identities in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    /// Whether the store holds no identities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Run a closure under an identity's lock.
    ///
    /// The `Arc` is cloned out of the map entry first so the map shard
    /// lock is released before the identity lock is taken.
    fn with_identity<T>(
        &self,
        id: &IdentityId,
        f: impl FnOnce(&mut SendingIdentity) -> T,
    ) -> Result<T, StoreError> {
        let cell = self
            .identities
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(StoreError::IdentityNotFound(*id))?;

        let mut identity = cell.lock();
        Ok(f(&mut identity))
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn insert(&self, identity: SendingIdentity) -> Result<(), StoreError> {
        self.identities
            .insert(identity.id, Arc::new(parking_lot::Mutex::new(identity)));
        Ok(())
    }

    async fn remove(&self, id: &IdentityId) -> Result<Option<SendingIdentity>, StoreError> {
        Ok(self
            .identities
            .remove(id)
            .map(|(_, cell)| cell.lock().clone()))
    }

    async fn get(&self, id: &IdentityId) -> Result<Option<SendingIdentity>, StoreError> {
        Ok(self
            .identities
            .get(id)
            .map(|entry| entry.value().lock().clone()))
    }

    async fn list_active(&self) -> Result<Vec<SendingIdentity>, StoreError> {
        let mut active: Vec<SendingIdentity> = self
            .identities
            .iter()
            .map(|entry| entry.value().lock().clone())
            .filter(|identity| identity.is_active)
            .collect();

        // Deterministic order for callers and tests
        active.sort_by_key(|identity| identity.id);
        Ok(active)
    }

    async fn reset_daily(
        &self,
        id: &IdentityId,
        today: NaiveDate,
        decay: ThrottleDecay,
    ) -> Result<Option<SendingIdentity>, StoreError> {
        self.with_identity(id, |identity| {
            if identity.last_counter_reset == today {
                return None;
            }

            identity.sent_today = 0;
            identity.bounced_today = 0;
            identity.complained_today = 0;
            identity.clear_automatic_pause();
            identity.throttle_delay_ms = decay.apply(identity.throttle_delay_ms);
            identity.last_counter_reset = today;
            Some(identity.clone())
        })
    }

    async fn increment_sent(&self, id: &IdentityId) -> Result<u32, StoreError> {
        self.with_identity(id, |identity| {
            identity.sent_today += 1;
            identity.sent_today
        })
    }

    async fn increment_bounced(&self, id: &IdentityId) -> Result<u32, StoreError> {
        self.with_identity(id, |identity| {
            identity.bounced_today += 1;
            identity.bounced_today
        })
    }

    async fn increment_complained(&self, id: &IdentityId) -> Result<u32, StoreError> {
        self.with_identity(id, |identity| {
            identity.complained_today += 1;
            identity.complained_today
        })
    }

    async fn set_throttle_delay(&self, id: &IdentityId, delay_ms: u64) -> Result<(), StoreError> {
        self.with_identity(id, |identity| {
            identity.throttle_delay_ms = delay_ms;
        })
    }

    async fn set_pause(
        &self,
        id: &IdentityId,
        reason: Option<PauseReason>,
    ) -> Result<(), StoreError> {
        self.with_identity(id, |identity| match reason {
            Some(reason) => identity.pause(reason),
            None => identity.resume(),
        })
    }

    async fn apply_health(
        &self,
        id: &IdentityId,
        snapshot: HealthSnapshot,
    ) -> Result<(), StoreError> {
        self.with_identity(id, |identity| {
            identity.health = snapshot;
        })
    }

    async fn set_health_status(
        &self,
        id: &IdentityId,
        status: HealthStatus,
    ) -> Result<(), StoreError> {
        self.with_identity(id, |identity| {
            identity.health.status = status;
        })
    }
}
