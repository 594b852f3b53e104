//! Identity state persistence and orchestration
//!
//! Two layers:
//!
//! - [`IdentityStore`] is the persistence seam: a small async trait a
//!   backend implements. Counter increments are required to be atomic
//!   read-modify-writes (`UPDATE ... SET counter = counter + 1` in SQL
//!   terms, a per-identity lock in memory) and the daily reset must be
//!   one conditional update keyed on the stored reset date. Those two
//!   contracts are what make the engine safe under concurrent callers.
//! - [`DomainStateStore`] wraps any backend with the TTL read cache,
//!   lazy daily resets, and the throttle/breaker reactions to recorded
//!   outcomes. Every write invalidates the cache.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rotary_health::{HealthReport, HealthStatus};
use tracing::{info, warn};

use crate::{
    breaker::{BreakerConfig, CircuitBreaker, PauseReason},
    cache::{CacheConfig, EligibleCache},
    error::StoreError,
    throttle::{ThrottleConfig, ThrottleController, ThrottleDecay, ThrottleSignal},
    types::{HealthSnapshot, IdentityId, SendingIdentity},
};

/// Persistence backend for sending-identity state.
///
/// Implementations must make every increment atomic and the daily reset
/// conditional on the stored date; see the module docs.
#[async_trait]
pub trait IdentityStore: Send + Sync + std::fmt::Debug {
    /// Add a new identity.
    async fn insert(&self, identity: SendingIdentity) -> Result<(), StoreError>;

    /// Remove an identity, returning its final state if it existed.
    async fn remove(&self, id: &IdentityId) -> Result<Option<SendingIdentity>, StoreError>;

    /// Fetch one identity.
    async fn get(&self, id: &IdentityId) -> Result<Option<SendingIdentity>, StoreError>;

    /// All admin-enabled identities, paused or not.
    async fn list_active(&self) -> Result<Vec<SendingIdentity>, StoreError>;

    /// Conditionally start a new counting day for an identity.
    ///
    /// When the stored reset date differs from `today`: zero the three
    /// daily counters, clear any automatic pause, apply the throttle
    /// decay, store `today`, and return the updated identity. When the
    /// identity is already current, do nothing and return `None`; the
    /// condition is what makes concurrent first touches reset exactly
    /// once.
    async fn reset_daily(
        &self,
        id: &IdentityId,
        today: NaiveDate,
        decay: ThrottleDecay,
    ) -> Result<Option<SendingIdentity>, StoreError>;

    /// Atomically increment `sent_today`, returning the new value.
    async fn increment_sent(&self, id: &IdentityId) -> Result<u32, StoreError>;

    /// Atomically increment `bounced_today`, returning the new value.
    async fn increment_bounced(&self, id: &IdentityId) -> Result<u32, StoreError>;

    /// Atomically increment `complained_today`, returning the new value.
    async fn increment_complained(&self, id: &IdentityId) -> Result<u32, StoreError>;

    /// Persist a new throttle delay.
    async fn set_throttle_delay(&self, id: &IdentityId, delay_ms: u64) -> Result<(), StoreError>;

    /// Persist a pause (`Some(reason)`) or clear one (`None`).
    async fn set_pause(
        &self,
        id: &IdentityId,
        reason: Option<PauseReason>,
    ) -> Result<(), StoreError>;

    /// Persist a full health snapshot.
    async fn apply_health(
        &self,
        id: &IdentityId,
        snapshot: HealthSnapshot,
    ) -> Result<(), StoreError>;

    /// Overwrite only the health status, keeping the last snapshot.
    async fn set_health_status(
        &self,
        id: &IdentityId,
        status: HealthStatus,
    ) -> Result<(), StoreError>;
}

/// The engine's view of identity state: backend + cache + reactions.
#[derive(Debug, Clone)]
pub struct DomainStateStore {
    backend: Arc<dyn IdentityStore>,
    cache: Arc<EligibleCache>,
    throttle: ThrottleController,
    breaker: CircuitBreaker,
}

impl DomainStateStore {
    /// Wrap a backend with caching and outcome reactions.
    #[must_use]
    pub fn new(
        backend: Arc<dyn IdentityStore>,
        cache: &CacheConfig,
        throttle: ThrottleConfig,
        breaker: BreakerConfig,
    ) -> Self {
        Self {
            backend,
            cache: Arc::new(EligibleCache::new(cache)),
            throttle: ThrottleController::new(throttle),
            breaker: CircuitBreaker::new(breaker),
        }
    }

    /// The throttle controller this store adjusts delays with.
    #[must_use]
    pub const fn throttle(&self) -> &ThrottleController {
        &self.throttle
    }

    /// The breaker this store evaluates pauses with.
    #[must_use]
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Active identities with fresh daily counters.
    ///
    /// Serves from the TTL cache when possible. On a miss, fetches the
    /// active list and lazily resets any identity whose counters belong
    /// to a previous UTC day before caching. With `skip_paused`, paused
    /// identities are filtered from the returned list (they stay in the
    /// cache; pausing is cheap to undo).
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn list_eligible(&self, skip_paused: bool) -> Result<Vec<SendingIdentity>, StoreError> {
        self.list_eligible_on(skip_paused, Utc::now().date_naive())
            .await
    }

    pub(crate) async fn list_eligible_on(
        &self,
        skip_paused: bool,
        today: NaiveDate,
    ) -> Result<Vec<SendingIdentity>, StoreError> {
        let identities = if let Some(cached) = self.cache.get() {
            cached
        } else {
            let mut identities = self.backend.list_active().await?;

            for identity in &mut identities {
                if identity.last_counter_reset == today {
                    continue;
                }
                match self
                    .backend
                    .reset_daily(&identity.id, today, self.throttle.decay())
                    .await?
                {
                    Some(updated) => {
                        info!(
                            identity = %identity.id,
                            domain = %identity.domain,
                            "Started new counting day"
                        );
                        *identity = updated;
                    }
                    // Another caller won the reset; reread its result
                    None => {
                        if let Some(current) = self.backend.get(&identity.id).await? {
                            *identity = current;
                        }
                    }
                }
            }

            let identities = Arc::new(identities);
            self.cache.store(Arc::clone(&identities));
            identities
        };

        Ok(identities
            .iter()
            .filter(|identity| !(skip_paused && identity.is_paused()))
            .cloned()
            .collect())
    }

    /// Record a completed send. Returns the new `sent_today`.
    ///
    /// # Errors
    ///
    /// `IdentityNotFound` for an unknown id; persistence failures are
    /// fatal to the send being recorded.
    pub async fn record_send(&self, id: &IdentityId) -> Result<u32, StoreError> {
        let sent_today = self.backend.increment_sent(id).await?;
        self.cache.invalidate();
        Ok(sent_today)
    }

    /// Record a bounce: count it, tighten the throttle, re-evaluate the
    /// pause policy.
    ///
    /// # Errors
    ///
    /// `IdentityNotFound` for an unknown id; persistence failures are
    /// fatal.
    pub async fn record_bounce(&self, id: &IdentityId) -> Result<(), StoreError> {
        self.backend.increment_bounced(id).await?;
        self.react_to_signal(id, ThrottleSignal::Bounce).await
    }

    /// Record a spam complaint: count it, tighten the throttle harder,
    /// re-evaluate the pause policy.
    ///
    /// # Errors
    ///
    /// `IdentityNotFound` for an unknown id; persistence failures are
    /// fatal.
    pub async fn record_complaint(&self, id: &IdentityId) -> Result<(), StoreError> {
        self.backend.increment_complained(id).await?;
        self.react_to_signal(id, ThrottleSignal::Complaint).await
    }

    async fn react_to_signal(
        &self,
        id: &IdentityId,
        signal: ThrottleSignal,
    ) -> Result<(), StoreError> {
        let identity = self
            .backend
            .get(id)
            .await?
            .ok_or(StoreError::IdentityNotFound(*id))?;

        let current = self.throttle.delay(&identity);
        let adjusted = self.throttle.adjusted(current, signal);
        if adjusted != identity.throttle_delay_ms {
            self.backend.set_throttle_delay(id, adjusted).await?;
        }

        if !identity.is_paused() {
            if let Some(reason) = self.breaker.evaluate(
                identity.sent_today,
                identity.bounced_today,
                identity.complained_today,
                identity.health.status,
            ) {
                warn!(
                    identity = %identity.id,
                    domain = %identity.domain,
                    reason = %reason,
                    sent = identity.sent_today,
                    bounced = identity.bounced_today,
                    complained = identity.complained_today,
                    "Auto-pausing sending identity"
                );
                self.backend.set_pause(id, Some(reason)).await?;
            }
        }

        self.cache.invalidate();
        Ok(())
    }

    /// Persist a fresh probe report.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn apply_health_report(
        &self,
        id: &IdentityId,
        report: &HealthReport,
    ) -> Result<(), StoreError> {
        self.backend
            .apply_health(id, HealthSnapshot::from(report))
            .await?;
        self.cache.invalidate();
        Ok(())
    }

    /// Downgrade an identity's health to unchecked after a failed probe.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn mark_health_unchecked(&self, id: &IdentityId) -> Result<(), StoreError> {
        self.backend
            .set_health_status(id, HealthStatus::Unchecked)
            .await?;
        self.cache.invalidate();
        Ok(())
    }

    /// Pause an identity on an operator's behalf.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn pause(&self, id: &IdentityId, reason: PauseReason) -> Result<(), StoreError> {
        self.backend.set_pause(id, Some(reason)).await?;
        self.cache.invalidate();
        Ok(())
    }

    /// Clear any pause, manual included.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn resume(&self, id: &IdentityId) -> Result<(), StoreError> {
        self.backend.set_pause(id, None).await?;
        self.cache.invalidate();
        Ok(())
    }

    /// Add a newly verified identity.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn insert(&self, identity: SendingIdentity) -> Result<(), StoreError> {
        self.backend.insert(identity).await?;
        self.cache.invalidate();
        Ok(())
    }

    /// Remove an identity entirely.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn remove(&self, id: &IdentityId) -> Result<Option<SendingIdentity>, StoreError> {
        let removed = self.backend.remove(id).await?;
        self.cache.invalidate();
        Ok(removed)
    }

    /// Fetch one identity.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn get(&self, id: &IdentityId) -> Result<Option<SendingIdentity>, StoreError> {
        self.backend.get(id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Days;
    use pretty_assertions::assert_eq;
    use rotary_common::Domain;

    use super::{memory::MemoryIdentityStore, *};

    fn state_store() -> DomainStateStore {
        DomainStateStore::new(
            Arc::new(MemoryIdentityStore::new()),
            &CacheConfig::default(),
            ThrottleConfig::default(),
            BreakerConfig::default(),
        )
    }

    fn identity(domain: &str) -> SendingIdentity {
        SendingIdentity::new(Domain::new(domain), format!("hello@{domain}"), "Test", 100)
    }

    #[tokio::test]
    async fn test_list_resets_stale_counters() {
        let store = state_store();
        let mut stale = identity("stale.example.com");
        stale.sent_today = 42;
        stale.bounced_today = 3;
        stale.complained_today = 1;
        stale.last_counter_reset = stale.last_counter_reset.checked_sub_days(Days::new(1)).unwrap();
        let id = stale.id;
        store.insert(stale).await.unwrap();

        let listed = store.list_eligible(true).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].sent_today, 0);
        assert_eq!(listed[0].bounced_today, 0);
        assert_eq!(listed[0].complained_today, 0);
    }

    #[tokio::test]
    async fn test_daily_reset_clears_automatic_pause_not_manual() {
        let store = state_store();

        let mut auto = identity("auto.example.com");
        auto.pause(PauseReason::HighBounceRate);
        auto.last_counter_reset = auto.last_counter_reset.checked_sub_days(Days::new(1)).unwrap();
        let auto_id = auto.id;

        let mut manual = identity("manual.example.com");
        manual.pause(PauseReason::Manual);
        manual.last_counter_reset = manual
            .last_counter_reset
            .checked_sub_days(Days::new(1))
            .unwrap();
        let manual_id = manual.id;

        store.insert(auto).await.unwrap();
        store.insert(manual).await.unwrap();

        let listed = store.list_eligible(false).await.unwrap();
        let auto = listed.iter().find(|i| i.id == auto_id).unwrap();
        let manual = listed.iter().find(|i| i.id == manual_id).unwrap();

        assert!(!auto.is_paused());
        assert!(manual.is_paused());
        assert_eq!(manual.pause_reason(), Some(PauseReason::Manual));
    }

    #[tokio::test]
    async fn test_daily_reset_decays_throttle() {
        let store = state_store();
        let mut stale = identity("decay.example.com");
        stale.throttle_delay_ms = 120_000;
        stale.last_counter_reset = stale.last_counter_reset.checked_sub_days(Days::new(1)).unwrap();
        let id = stale.id;
        store.insert(stale).await.unwrap();

        let listed = store.list_eligible(true).await.unwrap();
        let refreshed = listed.iter().find(|i| i.id == id).unwrap();
        assert_eq!(refreshed.throttle_delay_ms, 96_000);
    }

    #[tokio::test]
    async fn test_record_bounce_tightens_throttle() {
        let store = state_store();
        let fresh = identity("bounce.example.com");
        let id = fresh.id;
        store.insert(fresh).await.unwrap();

        store.record_bounce(&id).await.unwrap();
        let identity = store.get(&id).await.unwrap().unwrap();
        assert_eq!(identity.bounced_today, 1);
        assert_eq!(identity.throttle_delay_ms, 45_000);
    }

    #[tokio::test]
    async fn test_complaints_trigger_pause() {
        let store = state_store();
        let fresh = identity("complaints.example.com");
        let id = fresh.id;
        store.insert(fresh).await.unwrap();

        store.record_complaint(&id).await.unwrap();
        let identity = store.get(&id).await.unwrap().unwrap();
        assert!(!identity.is_paused());

        store.record_complaint(&id).await.unwrap();
        let identity = store.get(&id).await.unwrap().unwrap();
        assert!(identity.is_paused());
        assert_eq!(
            identity.pause_reason(),
            Some(PauseReason::ComplaintThreshold)
        );
    }

    #[tokio::test]
    async fn test_skip_paused_filters() {
        let store = state_store();
        let mut paused = identity("paused.example.com");
        paused.pause(PauseReason::Manual);
        store.insert(paused).await.unwrap();
        store.insert(identity("live.example.com")).await.unwrap();

        assert_eq!(store.list_eligible(true).await.unwrap().len(), 1);
        assert_eq!(store.list_eligible(false).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_write_invalidates_cached_list() {
        let store = state_store();
        let fresh = identity("cache.example.com");
        let id = fresh.id;
        store.insert(fresh).await.unwrap();

        // Prime the cache, then pause through the store
        assert_eq!(store.list_eligible(true).await.unwrap().len(), 1);
        store.pause(&id, PauseReason::Manual).await.unwrap();

        // The paused identity must not be served from a stale cache
        assert!(store.list_eligible(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_send_returns_new_count() {
        let store = state_store();
        let fresh = identity("count.example.com");
        let id = fresh.id;
        store.insert(fresh).await.unwrap();

        assert_eq!(store.record_send(&id).await.unwrap(), 1);
        assert_eq!(store.record_send(&id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_identity_is_not_found() {
        let store = state_store();
        let unknown = IdentityId::generate();

        let err = store.record_send(&unknown).await.unwrap_err();
        assert!(err.is_not_found());

        let err = store.record_bounce(&unknown).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
