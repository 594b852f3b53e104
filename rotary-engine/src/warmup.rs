//! Warmup ramp curves
//!
//! A new sending domain cannot jump straight to full volume; receiving
//! servers treat sudden volume from an unknown domain as a spam signal.
//! Each identity ramps along a named step curve: a non-decreasing table
//! of (day index, daily cap) breakpoints, plateauing at the operator's
//! configured maximum once the curve completes.
//!
//! The effective cap is a pure function of the warmup start date, curve
//! name, configured maximum, health score, and the current time. No
//! clocks are read here; callers pass `now`.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One breakpoint of a warmup curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveStep {
    /// Day index (0-based, days since warmup start) this cap applies from
    pub day: u32,
    /// Daily send cap from this day onward, until the next step
    pub cap: u32,
}

/// A named warmup ramp: stepped caps, then the configured maximum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurveShape {
    /// Breakpoints sorted by day, non-decreasing caps
    pub steps: Vec<CurveStep>,
    /// Day index from which the configured maximum applies
    pub full_from_day: u32,
}

impl CurveShape {
    /// The raw cap for a day index, or `None` once the curve has
    /// completed and the configured maximum applies.
    ///
    /// Days before the first breakpoint use the first step's cap, so a
    /// curve that (mis)starts at day 3 still ramps instead of opening
    /// at full volume.
    #[must_use]
    pub fn cap_at(&self, day: u32) -> Option<u32> {
        if day >= self.full_from_day {
            return None;
        }

        self.steps
            .iter()
            .take_while(|step| step.day <= day)
            .last()
            .or(self.steps.first())
            .map(|step| step.cap)
    }
}

/// Configuration for warmup ramping and health degradation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupConfig {
    /// Named curves; identities reference these by name
    #[serde(default = "default_curves")]
    pub curves: AHashMap<String, CurveShape>,

    /// Health score below which the cap is halved
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: u8,

    /// Health score below which the safety cap applies
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: u8,

    /// Daily cap while reputation recovers from a critical score
    #[serde(default = "default_critical_cap")]
    pub critical_cap: u32,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            curves: default_curves(),
            degraded_threshold: default_degraded_threshold(),
            critical_threshold: default_critical_threshold(),
            critical_cap: default_critical_cap(),
        }
    }
}

const fn default_degraded_threshold() -> u8 {
    70
}

const fn default_critical_threshold() -> u8 {
    50
}

const fn default_critical_cap() -> u32 {
    5
}

fn default_curves() -> AHashMap<String, CurveShape> {
    let step = |day, cap| CurveStep { day, cap };

    let mut curves = AHashMap::default();
    curves.insert(
        "standard".to_string(),
        CurveShape {
            steps: vec![step(0, 10), step(3, 25), step(7, 50), step(14, 100)],
            full_from_day: 21,
        },
    );
    curves.insert(
        "conservative".to_string(),
        CurveShape {
            steps: vec![step(0, 5), step(5, 15), step(10, 30), step(21, 60)],
            full_from_day: 30,
        },
    );
    curves.insert(
        "aggressive".to_string(),
        CurveShape {
            steps: vec![step(0, 20), step(2, 50), step(5, 100), step(10, 250)],
            full_from_day: 14,
        },
    );
    curves
}

impl WarmupConfig {
    /// Today's allowed send cap for an identity.
    ///
    /// `day_index = floor((now - started) / 1 day)`, clamped at zero for
    /// a warmup that has not started yet. The raw curve value never
    /// exceeds `configured_max`. A degraded health score halves the cap
    /// (minimum 1); a critical score floors it at the safety cap.
    #[must_use]
    pub fn effective_cap(
        &self,
        started: DateTime<Utc>,
        curve_name: &str,
        configured_max: u32,
        health_score: Option<u8>,
        now: DateTime<Utc>,
    ) -> u32 {
        let day = u32::try_from((now - started).num_days().max(0)).unwrap_or(u32::MAX);

        let shape = self.curves.get(curve_name).or_else(|| {
            warn!(curve = curve_name, "Unknown warmup curve, using standard");
            self.curves.get("standard")
        });

        // No matching curve at all degrades to the configured maximum
        // rather than refusing to compute a cap
        let raw = shape
            .and_then(|shape| shape.cap_at(day))
            .unwrap_or(configured_max)
            .min(configured_max);

        match health_score {
            Some(score) if score < self.critical_threshold => {
                self.critical_cap.min(configured_max)
            }
            Some(score) if score < self.degraded_threshold => (raw / 2).max(1),
            _ => raw,
        }
    }
}
