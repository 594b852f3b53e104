//! Core state types for sending identities

use chrono::{DateTime, NaiveDate, Utc};
use rotary_common::Domain;
use rotary_health::{AuthResults, HealthReport, HealthStatus};
use serde::{Deserialize, Serialize};

use crate::breaker::PauseReason;

/// Identifier for a sending identity
///
/// A globally unique ULID. Lexicographically sortable by creation time,
/// which doubles as the deterministic tie-breaker during selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityId {
    id: ulid::Ulid,
}

impl IdentityId {
    /// Create an identity ID from an existing ULID
    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self { id }
    }

    /// Generate a new unique identity ID
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    /// Parse an identity ID from its string form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        ulid::Ulid::from_string(s).ok().map(|id| Self { id })
    }

    /// Get the underlying ULID
    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl serde::Serialize for IdentityId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for IdentityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self { id })
    }
}

/// Outcome of an attempted send, reported back by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Sent,
    Bounced,
    Complained,
}

/// Last-known health snapshot folded into a sending identity
///
/// Selection never waits on a probe; it reads whatever snapshot the
/// monitor last wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Derived score, 0-100; `None` until the first successful probe
    pub score: Option<u8>,
    /// Status band; `Unchecked` until the first successful probe, and
    /// again whenever a probe fails
    pub status: HealthStatus,
    /// When the last successful probe ran
    pub checked_at: Option<DateTime<Utc>>,
    /// Per-mechanism authentication results from the last probe
    pub auth: AuthResults,
    /// Blacklist zones the domain resolved in
    pub blacklist_hits: Vec<String>,
    /// Remediation hints from the last probe
    pub recommendations: Vec<String>,
}

impl From<&HealthReport> for HealthSnapshot {
    fn from(report: &HealthReport) -> Self {
        Self {
            score: Some(report.score),
            status: report.status,
            checked_at: Some(report.checked_at),
            auth: report.auth,
            blacklist_hits: report.blacklist_hits.clone(),
            recommendations: report.recommendations.clone(),
        }
    }
}

/// One verified sending identity and all of its rotation state
///
/// Created when an operator verifies a domain; mutated continuously by
/// the engine (counters, throttle, pause, health); removed when the
/// operator deactivates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendingIdentity {
    pub id: IdentityId,
    /// The verified sending domain
    pub domain: Domain,
    pub from_email: String,
    pub from_name: String,

    /// Admin-enabled; inactive identities are invisible to the engine
    pub is_active: bool,
    is_paused: bool,
    pause_reason: Option<PauseReason>,

    /// When warmup began for this identity
    pub warmup_started: DateTime<Utc>,
    /// Name of the warmup curve to ramp along
    pub warmup_curve: String,
    /// Operator-configured daily ceiling, never exceeded by any curve
    pub max_daily_limit: u32,

    pub sent_today: u32,
    pub bounced_today: u32,
    pub complained_today: u32,
    /// UTC date the daily counters were last zeroed
    pub last_counter_reset: NaiveDate,

    /// Current inter-send delay for this identity, in milliseconds
    pub throttle_delay_ms: u64,

    /// Last-known health snapshot
    pub health: HealthSnapshot,
}

impl SendingIdentity {
    /// Create a fresh identity starting warmup now.
    ///
    /// Starts active, unpaused, with zeroed counters and the minimum
    /// throttle delay; callers adjust fields afterwards where needed.
    #[must_use]
    pub fn new(
        domain: Domain,
        from_email: impl Into<String>,
        from_name: impl Into<String>,
        max_daily_limit: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: IdentityId::generate(),
            domain,
            from_email: from_email.into(),
            from_name: from_name.into(),
            is_active: true,
            is_paused: false,
            pause_reason: None,
            warmup_started: now,
            warmup_curve: "standard".to_string(),
            max_daily_limit,
            sent_today: 0,
            bounced_today: 0,
            complained_today: 0,
            last_counter_reset: now.date_naive(),
            throttle_delay_ms: crate::throttle::default_min_delay_ms(),
            health: HealthSnapshot::default(),
        }
    }

    /// Whether this identity is currently paused
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.is_paused
    }

    /// Why this identity is paused, if it is
    #[must_use]
    pub const fn pause_reason(&self) -> Option<PauseReason> {
        self.pause_reason
    }

    /// Pause this identity.
    ///
    /// Pause state and reason always change together; there is no way to
    /// set one without the other.
    pub const fn pause(&mut self, reason: PauseReason) {
        self.is_paused = true;
        self.pause_reason = Some(reason);
    }

    /// Clear any pause, manual or automatic.
    pub const fn resume(&mut self) {
        self.is_paused = false;
        self.pause_reason = None;
    }

    /// Clear an automatic pause; a manual pause survives.
    pub fn clear_automatic_pause(&mut self) {
        if self.pause_reason.is_some_and(PauseReason::is_automatic) {
            self.resume();
        }
    }

    /// Fold a fresh probe report into this identity.
    pub fn apply_health(&mut self, report: &HealthReport) {
        self.health = HealthSnapshot::from(report);
    }

    /// Record that the last probe attempt failed.
    ///
    /// Score and sub-results from the previous successful probe are kept
    /// for display; only the status downgrades.
    pub const fn mark_health_unchecked(&mut self) {
        self.health.status = HealthStatus::Unchecked;
    }
}
