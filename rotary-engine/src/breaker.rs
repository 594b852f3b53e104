//! Automatic pause policy for damaged sending identities
//!
//! Evaluates a single day's counters against safety thresholds and
//! decides whether an identity should stop sending. The decision is pure
//! arithmetic over the counters and the last-known health status; the
//! state store persists whatever this returns.
//!
//! # Rule order (first match wins)
//!
//! 1. Bounce ratio at or above the threshold, gated on a minimum daily
//!    sample so one bounce on a tiny volume doesn't read as catastrophic
//! 2. Complaint count at or above the flat limit
//! 3. Health status critical
//!
//! Automatic pauses are cleared at the next UTC day boundary together
//! with the counter reset, giving a damaged domain exactly one cool-down
//! cycle before re-evaluation. A manual pause is operator-owned and is
//! never set or cleared here.

use rotary_health::HealthStatus;
use serde::{Deserialize, Serialize};

/// Why a sending identity is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    /// Daily bounce ratio crossed the safety threshold
    HighBounceRate,
    /// Daily complaint count crossed the flat limit
    ComplaintThreshold,
    /// The last probe scored the domain critical
    HealthCritical,
    /// Operator action; never auto-cleared
    Manual,
}

impl PauseReason {
    /// Whether this reason was set by the engine (as opposed to an
    /// operator) and is therefore cleared at the daily reset.
    #[must_use]
    pub const fn is_automatic(self) -> bool {
        !matches!(self, Self::Manual)
    }
}

impl std::fmt::Display for PauseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::HighBounceRate => "high_bounce_rate",
            Self::ComplaintThreshold => "complaint_threshold",
            Self::HealthCritical => "health_critical",
            Self::Manual => "manual",
        };
        write!(f, "{label}")
    }
}

/// Configuration for the pause policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Minimum sends today before the bounce-ratio rule applies
    #[serde(default = "default_min_sample")]
    pub min_sample: u32,

    /// Bounce ratio (bounces / sends) that triggers a pause
    #[serde(default = "default_max_bounce_rate")]
    pub max_bounce_rate: f64,

    /// Complaint count that triggers a pause
    #[serde(default = "default_complaint_limit")]
    pub complaint_limit: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            min_sample: default_min_sample(),
            max_bounce_rate: default_max_bounce_rate(),
            complaint_limit: default_complaint_limit(),
        }
    }
}

const fn default_min_sample() -> u32 {
    20
}

const fn default_max_bounce_rate() -> f64 {
    0.05
}

const fn default_complaint_limit() -> u32 {
    2
}

/// Pure pause decision over one identity's daily counters.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreaker {
    config: BreakerConfig,
}

impl CircuitBreaker {
    /// Create a breaker with the given thresholds.
    #[must_use]
    pub const fn new(config: BreakerConfig) -> Self {
        Self { config }
    }

    /// Decide whether an identity should be paused right now.
    ///
    /// Returns `None` when the identity is within every threshold.
    #[must_use]
    pub fn evaluate(
        &self,
        sent_today: u32,
        bounced_today: u32,
        complained_today: u32,
        health_status: HealthStatus,
    ) -> Option<PauseReason> {
        if sent_today >= self.config.min_sample
            && f64::from(bounced_today) / f64::from(sent_today) >= self.config.max_bounce_rate
        {
            return Some(PauseReason::HighBounceRate);
        }

        if complained_today >= self.config.complaint_limit {
            return Some(PauseReason::ComplaintThreshold);
        }

        if health_status == HealthStatus::Critical {
            return Some(PauseReason::HealthCritical);
        }

        None
    }
}
