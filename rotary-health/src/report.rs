//! Health report derivation
//!
//! A [`HealthReport`] is the scored outcome of one probe run: which
//! authentication mechanisms validated, which blacklists the domain sits
//! on, and a 0-100 score with a coarse status band. The penalties and
//! band thresholds are configuration, not constants; deployments tune
//! them per their own risk appetite.

use chrono::{DateTime, Utc};
use rotary_common::Domain;
use serde::{Deserialize, Serialize};

/// Coarse health band derived from the numeric score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No successful probe yet, or the last probe failed.
    #[default]
    Unchecked,
    Excellent,
    Good,
    Warning,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Unchecked => "unchecked",
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Warning => "warning",
            Self::Critical => "critical",
        };
        write!(f, "{label}")
    }
}

/// Per-mechanism authentication results for a domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResults {
    /// A TXT record starting `v=spf1` exists on the domain.
    pub spf: bool,
    /// At least one known DKIM selector published a key.
    pub dkim: bool,
    /// A TXT record starting `v=DMARC1` exists at `_dmarc.<domain>`.
    pub dmarc: bool,
    /// The domain has at least one MX record.
    pub mx: bool,
}

/// Score penalties and status band thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    /// Penalty when no SPF record is found
    #[serde(default = "default_spf_penalty")]
    pub spf_penalty: u8,

    /// Penalty when no DKIM selector resolves
    #[serde(default = "default_dkim_penalty")]
    pub dkim_penalty: u8,

    /// Penalty when no DMARC policy is published
    #[serde(default = "default_dmarc_penalty")]
    pub dmarc_penalty: u8,

    /// Penalty when the domain has no MX records
    #[serde(default = "default_mx_penalty")]
    pub mx_penalty: u8,

    /// Penalty per blacklist the domain is listed on
    #[serde(default = "default_blacklist_penalty")]
    pub blacklist_penalty: u8,

    /// Minimum score for `excellent`
    #[serde(default = "default_excellent_floor")]
    pub excellent_floor: u8,

    /// Minimum score for `good`
    #[serde(default = "default_good_floor")]
    pub good_floor: u8,

    /// Minimum score for `warning`; anything below is `critical`
    #[serde(default = "default_warning_floor")]
    pub warning_floor: u8,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            spf_penalty: default_spf_penalty(),
            dkim_penalty: default_dkim_penalty(),
            dmarc_penalty: default_dmarc_penalty(),
            mx_penalty: default_mx_penalty(),
            blacklist_penalty: default_blacklist_penalty(),
            excellent_floor: default_excellent_floor(),
            good_floor: default_good_floor(),
            warning_floor: default_warning_floor(),
        }
    }
}

const fn default_spf_penalty() -> u8 {
    15
}

const fn default_dkim_penalty() -> u8 {
    20
}

const fn default_dmarc_penalty() -> u8 {
    15
}

const fn default_mx_penalty() -> u8 {
    10
}

const fn default_blacklist_penalty() -> u8 {
    25
}

const fn default_excellent_floor() -> u8 {
    90
}

const fn default_good_floor() -> u8 {
    70
}

const fn default_warning_floor() -> u8 {
    50
}

impl ScoreWeights {
    /// Map a numeric score onto its status band.
    #[must_use]
    pub const fn status_for(&self, score: u8) -> HealthStatus {
        if score >= self.excellent_floor {
            HealthStatus::Excellent
        } else if score >= self.good_floor {
            HealthStatus::Good
        } else if score >= self.warning_floor {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        }
    }
}

/// The scored outcome of one probe run against a domain.
///
/// Ephemeral by design: the engine persists only the latest report folded
/// into the sending identity's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// The probed domain
    pub domain: Domain,
    /// Per-mechanism authentication results
    pub auth: AuthResults,
    /// Blacklist zones the domain resolved in
    pub blacklist_hits: Vec<String>,
    /// Derived score, 0-100
    pub score: u8,
    /// Status band for the score
    pub status: HealthStatus,
    /// Human-readable remediation hints, one per failed mechanism
    pub recommendations: Vec<String>,
    /// When the probe ran
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Derive a report from raw probe results.
    ///
    /// Starts at 100 and subtracts the configured penalty for each failed
    /// mechanism and each blacklist hit, saturating at zero.
    #[must_use]
    pub fn derive(
        domain: Domain,
        auth: AuthResults,
        blacklist_hits: Vec<String>,
        weights: &ScoreWeights,
        checked_at: DateTime<Utc>,
    ) -> Self {
        let mut score: u8 = 100;
        let mut recommendations = Vec::new();

        if !auth.spf {
            score = score.saturating_sub(weights.spf_penalty);
            recommendations
                .push(format!("Publish an SPF record (v=spf1) for {domain}"));
        }
        if !auth.dkim {
            score = score.saturating_sub(weights.dkim_penalty);
            recommendations
                .push(format!("Publish a DKIM key under a selector for {domain}"));
        }
        if !auth.dmarc {
            score = score.saturating_sub(weights.dmarc_penalty);
            recommendations
                .push(format!("Publish a DMARC policy at _dmarc.{domain}"));
        }
        if !auth.mx {
            score = score.saturating_sub(weights.mx_penalty);
            recommendations.push(format!(
                "Add MX records for {domain}; domains without inbound mail look disposable"
            ));
        }
        for zone in &blacklist_hits {
            score = score.saturating_sub(weights.blacklist_penalty);
            recommendations.push(format!("Request delisting of {domain} from {zone}"));
        }

        let status = weights.status_for(score);

        Self {
            domain,
            auth,
            blacklist_hits,
            score,
            status,
            recommendations,
            checked_at,
        }
    }
}
