//! Adaptive inter-send throttle
//!
//! Each identity carries a current inter-send delay. Negative signals
//! multiply it up (complaints harder than bounces), and one decay per
//! clean day multiplies it back down. Every adjustment applies to the
//! *current* value, so repeated signals compound geometrically in both
//! directions; clamping to the configured bounds keeps the series
//! finite. The delay never self-increases and never decays below the
//! minimum.

use serde::{Deserialize, Serialize};

use crate::types::SendingIdentity;

/// Configuration for throttle arithmetic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Lower bound on the inter-send delay (default: 30s)
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound on the inter-send delay (default: 120s)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier applied on a bounce
    #[serde(default = "default_bounce_multiplier")]
    pub bounce_multiplier: f64,

    /// Multiplier applied on a spam complaint
    #[serde(default = "default_complaint_multiplier")]
    pub complaint_multiplier: f64,

    /// Multiplier applied once per clean day
    #[serde(default = "default_daily_decay")]
    pub daily_decay: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            bounce_multiplier: default_bounce_multiplier(),
            complaint_multiplier: default_complaint_multiplier(),
            daily_decay: default_daily_decay(),
        }
    }
}

pub(crate) const fn default_min_delay_ms() -> u64 {
    30_000
}

const fn default_max_delay_ms() -> u64 {
    120_000
}

const fn default_bounce_multiplier() -> f64 {
    1.5
}

const fn default_complaint_multiplier() -> f64 {
    2.0
}

const fn default_daily_decay() -> f64 {
    0.8
}

/// A negative deliverability signal that tightens the throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleSignal {
    Bounce,
    Complaint,
}

/// The once-per-day relaxation step, as a plain value.
///
/// Handed to the state store so a backend can fold the decay into the
/// same conditional update that performs the daily counter reset; a SQL
/// backend expresses it as
/// `delay = GREATEST(min, LEAST(max, delay * factor))`.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleDecay {
    pub factor: f64,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl ThrottleDecay {
    /// Apply the decay to a current delay.
    #[must_use]
    pub fn apply(&self, current_ms: u64) -> u64 {
        scale_clamped(current_ms, self.factor, self.min_delay_ms, self.max_delay_ms)
    }
}

/// `clamp(current * factor, min, max)` in integer milliseconds.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn scale_clamped(current_ms: u64, factor: f64, min_ms: u64, max_ms: u64) -> u64 {
    let scaled = ((current_ms as f64) * factor).round().max(0.0) as u64;
    scaled.clamp(min_ms, max_ms)
}

/// Throttle arithmetic over an identity's persisted delay.
#[derive(Debug, Clone, Default)]
pub struct ThrottleController {
    config: ThrottleConfig,
}

impl ThrottleController {
    /// Create a controller with the given bounds and multipliers.
    #[must_use]
    pub const fn new(config: ThrottleConfig) -> Self {
        Self { config }
    }

    /// The delay a caller should wait before the next send through this
    /// identity, clamped into the configured bounds.
    #[must_use]
    pub const fn delay(&self, identity: &SendingIdentity) -> u64 {
        let delay = identity.throttle_delay_ms;
        if delay < self.config.min_delay_ms {
            self.config.min_delay_ms
        } else if delay > self.config.max_delay_ms {
            self.config.max_delay_ms
        } else {
            delay
        }
    }

    /// The new delay after a negative signal.
    #[must_use]
    pub fn adjusted(&self, current_ms: u64, signal: ThrottleSignal) -> u64 {
        let factor = match signal {
            ThrottleSignal::Bounce => self.config.bounce_multiplier,
            ThrottleSignal::Complaint => self.config.complaint_multiplier,
        };
        scale_clamped(
            current_ms,
            factor,
            self.config.min_delay_ms,
            self.config.max_delay_ms,
        )
    }

    /// The daily relaxation step for this controller's bounds.
    #[must_use]
    pub const fn decay(&self) -> ThrottleDecay {
        ThrottleDecay {
            factor: self.config.daily_decay,
            min_delay_ms: self.config.min_delay_ms,
            max_delay_ms: self.config.max_delay_ms,
        }
    }
}
