//! Deliverability health probing for sending domains
//!
//! This crate answers one question: how healthy is a sending domain's DNS
//! footprint right now? It checks the authentication records receiving
//! servers look at (SPF, DKIM, DMARC, MX) and domain-based blacklist
//! membership, and folds the results into a scored [`HealthReport`].
//!
//! Probing is a pure read with per-lookup timeouts. It never mutates
//! engine state; the caller decides what to do with a report.

mod error;
mod probe;
mod report;

pub use error::ProbeError;
pub use probe::{HealthProbe, ProbeConfig};
pub use report::{AuthResults, HealthReport, HealthStatus, ScoreWeights};
