//! Sending-identity selection
//!
//! The engine's front door: pick the identity the next message should
//! go out through, fold delivery outcomes back into state, and expose a
//! read-only summary for dashboards.
//!
//! Selection is read-mostly over the cached identity list. The capacity
//! check and the later `record_outcome` are deliberately not one
//! transaction: two concurrent callers may both see one remaining slot
//! and both take it, overshooting a daily cap by a message or two. That
//! soft limit is the accepted trade against serializing every send
//! through a global lock.

use std::{cmp::Reverse, sync::Arc};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use rotary_common::Domain;
use rotary_health::HealthStatus;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    breaker::{BreakerConfig, PauseReason},
    cache::CacheConfig,
    error::{RotationError, StoreError},
    store::{DomainStateStore, IdentityStore},
    throttle::ThrottleConfig,
    types::{IdentityId, SendOutcome, SendingIdentity},
    warmup::WarmupConfig,
};

/// How to rank eligible identities when no signature or preference
/// decides the pick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Lowest `sent_today` first, spreading volume evenly
    RoundRobin,
    /// Highest remaining capacity first
    #[default]
    CapacityBased,
    /// Highest health score first, never-probed identities last
    HealthBased,
    /// Reserved for callers that always pass a signature; ranks like
    /// `CapacityBased` when no signature is present
    SignatureMatch,
}

/// Which precedence rule produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Signature,
    Preferred,
    Strategy,
    Fallback,
}

impl std::fmt::Display for MatchedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Signature => "signature",
            Self::Preferred => "preferred",
            Self::Strategy => "strategy",
            Self::Fallback => "fallback",
        };
        write!(f, "{label}")
    }
}

/// Options for one selection call.
#[derive(Debug, Clone)]
pub struct SelectOptions {
    /// Prefer an identity whose from-name or from-email contains this,
    /// case-insensitively; takes precedence over everything else
    pub signature_name: Option<String>,
    /// Prefer this identity when it is eligible
    pub preferred_id: Option<IdentityId>,
    /// Ranking strategy; the engine default applies when `None`
    pub strategy: Option<Strategy>,
    /// Exclude paused identities (the default)
    pub skip_paused: bool,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            signature_name: None,
            preferred_id: None,
            strategy: None,
            skip_paused: true,
        }
    }
}

impl SelectOptions {
    /// Options for a plain strategy-ranked selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// The result of a selection: where to send from and how fast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedDomain {
    pub identity_id: IdentityId,
    pub from_email: String,
    pub from_name: String,
    /// How long the caller should wait before the send after this one
    pub recommended_delay_ms: u64,
    /// Which precedence rule fired
    pub matched_by: MatchedBy,
}

/// Per-identity row of the operator summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentitySummary {
    pub domain: Domain,
    pub from_email: String,
    pub sent_today: u32,
    pub effective_cap: u32,
    pub remaining_capacity: u32,
    pub health_score: Option<u8>,
    pub health_status: HealthStatus,
    pub is_paused: bool,
    pub pause_reason: Option<PauseReason>,
    pub throttle_delay_ms: u64,
}

/// Dashboard view over every active identity.
pub type Summary = AHashMap<IdentityId, IdentitySummary>;

/// Case-insensitive signature match against an identity's from fields.
///
/// Kept a pure function over plain strings so selection precedence
/// stays unit-testable without a store behind it.
#[must_use]
pub fn signature_matches(signature: &str, from_name: &str, from_email: &str) -> bool {
    let needle = signature.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    from_name.to_lowercase().contains(&needle) || from_email.to_lowercase().contains(&needle)
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Eligible-list cache
    pub cache: CacheConfig,
    /// Warmup curves and health degradation
    pub warmup: WarmupConfig,
    /// Throttle bounds and multipliers
    pub throttle: ThrottleConfig,
    /// Auto-pause thresholds
    pub breaker: BreakerConfig,
    /// Ranking used when a selection names no strategy
    pub default_strategy: Strategy,
}

/// An eligible identity annotated with today's capacity.
#[derive(Debug)]
struct Candidate {
    identity: SendingIdentity,
    effective_cap: u32,
    remaining: u32,
}

/// The rotation engine facade.
///
/// Collaborators use exactly three operations: [`select`], which hands
/// out an identity and a recommended inter-send delay;
/// [`record_outcome`], which folds the delivery result back in; and
/// [`summary`], the read-only dashboard view.
///
/// [`select`]: RotationEngine::select
/// [`record_outcome`]: RotationEngine::record_outcome
/// [`summary`]: RotationEngine::summary
#[derive(Debug, Clone)]
pub struct RotationEngine {
    store: DomainStateStore,
    warmup: WarmupConfig,
    default_strategy: Strategy,
}

impl RotationEngine {
    /// Build an engine over a persistence backend.
    #[must_use]
    pub fn new(backend: Arc<dyn IdentityStore>, config: EngineConfig) -> Self {
        let EngineConfig {
            cache,
            warmup,
            throttle,
            breaker,
            default_strategy,
        } = config;

        Self {
            store: DomainStateStore::new(backend, &cache, throttle, breaker),
            warmup,
            default_strategy,
        }
    }

    /// The state store backing this engine.
    ///
    /// Handed to the health monitor and to operator tooling; shares the
    /// cache and backend with the engine.
    #[must_use]
    pub fn state_store(&self) -> DomainStateStore {
        self.store.clone()
    }

    /// Pick the identity the next message should go out through.
    ///
    /// # Errors
    ///
    /// `NoEligibleDomain` when every identity is paused, exhausted, or
    /// over a safety threshold: an ordinary "cannot send now", not a
    /// fault. Store failures propagate.
    pub async fn select(&self, options: &SelectOptions) -> Result<SelectedDomain, RotationError> {
        self.select_at(options, Utc::now()).await
    }

    pub(crate) async fn select_at(
        &self,
        options: &SelectOptions,
        now: DateTime<Utc>,
    ) -> Result<SelectedDomain, RotationError> {
        let identities = self
            .store
            .list_eligible_on(options.skip_paused, now.date_naive())
            .await?;

        let eligible: Vec<Candidate> = identities
            .into_iter()
            .filter_map(|identity| {
                let effective_cap = self.warmup.effective_cap(
                    identity.warmup_started,
                    &identity.warmup_curve,
                    identity.max_daily_limit,
                    identity.health.score,
                    now,
                );
                let remaining = effective_cap.saturating_sub(identity.sent_today);
                if remaining == 0 {
                    return None;
                }

                let pause = self.store.breaker().evaluate(
                    identity.sent_today,
                    identity.bounced_today,
                    identity.complained_today,
                    identity.health.status,
                );
                if pause.is_some() {
                    return None;
                }

                Some(Candidate {
                    identity,
                    effective_cap,
                    remaining,
                })
            })
            .collect();

        if eligible.is_empty() {
            debug!("Selection found no eligible sending identity");
            return Err(RotationError::NoEligibleDomain);
        }

        if let Some(signature) = options.signature_name.as_deref() {
            if let Some(candidate) = eligible.iter().find(|candidate| {
                signature_matches(
                    signature,
                    &candidate.identity.from_name,
                    &candidate.identity.from_email,
                )
            }) {
                return Ok(self.selection(candidate, MatchedBy::Signature));
            }
        }

        if let Some(preferred) = options.preferred_id {
            if let Some(candidate) = eligible
                .iter()
                .find(|candidate| candidate.identity.id == preferred)
            {
                return Ok(self.selection(candidate, MatchedBy::Preferred));
            }
            warn!(
                identity = %preferred,
                "Preferred identity unknown or ineligible, ranking by strategy"
            );
        }

        let strategy = options.strategy.unwrap_or(self.default_strategy);
        if let Some(candidate) = rank(&eligible, strategy) {
            return Ok(self.selection(candidate, MatchedBy::Strategy));
        }

        // Unreachable while the eligible set is non-empty; kept so a
        // ranking bug degrades to a working pick instead of an error
        Ok(self.selection(&eligible[0], MatchedBy::Fallback))
    }

    fn selection(&self, candidate: &Candidate, matched_by: MatchedBy) -> SelectedDomain {
        let identity = &candidate.identity;
        debug!(
            identity = %identity.id,
            domain = %identity.domain,
            matched_by = %matched_by,
            remaining = candidate.remaining,
            effective_cap = candidate.effective_cap,
            "Selected sending identity"
        );

        SelectedDomain {
            identity_id: identity.id,
            from_email: identity.from_email.clone(),
            from_name: identity.from_name.clone(),
            recommended_delay_ms: self.store.throttle().delay(identity),
            matched_by,
        }
    }

    /// Fold a delivery outcome back into identity state.
    ///
    /// An unknown identity is logged and ignored; the send already
    /// happened; there is nothing useful to fail.
    ///
    /// # Errors
    ///
    /// Persistence failures propagate; the caller should retry or
    /// abandon, since an unpersisted counter lets capacity drift.
    pub async fn record_outcome(
        &self,
        id: &IdentityId,
        outcome: SendOutcome,
    ) -> Result<(), RotationError> {
        let result = match outcome {
            SendOutcome::Sent => self.store.record_send(id).await.map(|_| ()),
            SendOutcome::Bounced => self.store.record_bounce(id).await,
            SendOutcome::Complained => self.store.record_complaint(id).await,
        };

        match result {
            Err(StoreError::IdentityNotFound(id)) => {
                warn!(identity = %id, "Outcome recorded for unknown identity, ignoring");
                Ok(())
            }
            other => Ok(other?),
        }
    }

    /// Read-only per-identity state for operator dashboards.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn summary(&self) -> Result<Summary, RotationError> {
        self.summary_at(Utc::now()).await
    }

    pub(crate) async fn summary_at(&self, now: DateTime<Utc>) -> Result<Summary, RotationError> {
        let identities = self.store.list_eligible_on(false, now.date_naive()).await?;

        Ok(identities
            .into_iter()
            .map(|identity| {
                let effective_cap = self.warmup.effective_cap(
                    identity.warmup_started,
                    &identity.warmup_curve,
                    identity.max_daily_limit,
                    identity.health.score,
                    now,
                );

                let summary = IdentitySummary {
                    domain: identity.domain.clone(),
                    from_email: identity.from_email.clone(),
                    sent_today: identity.sent_today,
                    effective_cap,
                    remaining_capacity: effective_cap.saturating_sub(identity.sent_today),
                    health_score: identity.health.score,
                    health_status: identity.health.status,
                    is_paused: identity.is_paused(),
                    pause_reason: identity.pause_reason(),
                    throttle_delay_ms: self.store.throttle().delay(&identity),
                };
                (identity.id, summary)
            })
            .collect())
    }

    /// Register a newly verified identity.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn register(&self, identity: SendingIdentity) -> Result<(), RotationError> {
        Ok(self.store.insert(identity).await?)
    }

    /// Remove an identity entirely.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn deregister(
        &self,
        id: &IdentityId,
    ) -> Result<Option<SendingIdentity>, RotationError> {
        Ok(self.store.remove(id).await?)
    }

    /// Pause an identity on an operator's behalf.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn pause(&self, id: &IdentityId, reason: PauseReason) -> Result<(), RotationError> {
        Ok(self.store.pause(id, reason).await?)
    }

    /// Clear any pause on an identity, manual included.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn resume(&self, id: &IdentityId) -> Result<(), RotationError> {
        Ok(self.store.resume(id).await?)
    }
}

/// Rank eligible candidates by strategy; ties break on identity id so
/// repeated calls over identical state pick identically.
fn rank(eligible: &[Candidate], strategy: Strategy) -> Option<&Candidate> {
    match strategy {
        Strategy::RoundRobin => eligible
            .iter()
            .min_by_key(|candidate| (candidate.identity.sent_today, candidate.identity.id)),
        Strategy::HealthBased => eligible.iter().min_by_key(|candidate| {
            (
                Reverse(candidate.identity.health.score.map_or(-1, i32::from)),
                candidate.identity.id,
            )
        }),
        Strategy::CapacityBased | Strategy::SignatureMatch => eligible
            .iter()
            .min_by_key(|candidate| (Reverse(candidate.remaining), candidate.identity.id)),
    }
}
