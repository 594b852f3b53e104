//! Background health monitoring
//!
//! Probing is the only network-facing work in the engine, so it runs in
//! its own loop, decoupled from selection: each cycle probes every
//! active identity and writes the report back through the state store.
//! Selection meanwhile keeps reading the last snapshot, so a slow or dead
//! resolver can never delay a send decision.
//!
//! Probes within a cycle are spaced out with a small jittered delay so
//! a fleet of identities does not hammer the resolver and the DNSBL
//! zones in one burst.

use std::time::Duration;

use rand::Rng;
use rotary_common::Signal;
use rotary_health::HealthProbe;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::store::DomainStateStore;

/// Configuration for the monitor loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between probe cycles (default: 15 minutes)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Base delay between two probes within a cycle
    #[serde(default = "default_probe_spacing_ms")]
    pub probe_spacing_ms: u64,

    /// Jitter applied to the spacing, as a fraction (0.2 = ±20%)
    #[serde(default = "default_spacing_jitter")]
    pub spacing_jitter: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            probe_spacing_ms: default_probe_spacing_ms(),
            spacing_jitter: default_spacing_jitter(),
        }
    }
}

const fn default_interval_secs() -> u64 {
    900
}

const fn default_probe_spacing_ms() -> u64 {
    1_000
}

const fn default_spacing_jitter() -> f64 {
    0.2
}

/// Periodically probes every active identity and persists the results.
#[derive(Debug)]
pub struct HealthMonitor {
    probe: HealthProbe,
    store: DomainStateStore,
    config: MonitorConfig,
}

impl HealthMonitor {
    /// Create a monitor over the engine's state store.
    #[must_use]
    pub const fn new(probe: HealthProbe, store: DomainStateStore, config: MonitorConfig) -> Self {
        Self {
            probe,
            store,
            config,
        }
    }

    /// Run probe cycles until a shutdown signal arrives.
    ///
    /// A failed probe downgrades that identity to unchecked and the
    /// cycle moves on; nothing here is fatal to the loop.
    pub async fn serve(&self, mut shutdown: tokio::sync::broadcast::Receiver<Signal>) {
        info!(
            interval_secs = self.config.interval_secs,
            "Health monitor starting"
        );

        let mut timer = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        // Skip the first tick to avoid immediate execution
        timer.tick().await;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.sweep().await;
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown | Signal::Finalised) => {
                            info!("Health monitor received shutdown signal");
                        }
                        Err(e) => {
                            error!("Health monitor shutdown channel error: {e}");
                        }
                    }
                    break;
                }
            }
        }
    }

    /// Probe every active identity once.
    pub async fn sweep(&self) {
        let identities = match self.store.list_eligible(false).await {
            Ok(identities) => identities,
            Err(err) => {
                error!("Health sweep could not list identities: {err}");
                return;
            }
        };

        debug!(count = identities.len(), "Starting health sweep");

        for identity in identities {
            match self.probe.check(&identity.domain).await {
                Ok(report) => {
                    debug!(
                        domain = %identity.domain,
                        score = report.score,
                        status = %report.status,
                        "Probe succeeded"
                    );
                    if let Err(err) = self.store.apply_health_report(&identity.id, &report).await {
                        error!(
                            identity = %identity.id,
                            "Failed to persist health report: {err}"
                        );
                    }
                }
                Err(err) => {
                    warn!(
                        domain = %identity.domain,
                        "Probe failed, marking unchecked: {err}"
                    );
                    if let Err(err) = self.store.mark_health_unchecked(&identity.id).await {
                        error!(
                            identity = %identity.id,
                            "Failed to downgrade health status: {err}"
                        );
                    }
                }
            }

            self.pause_between_probes().await;
        }
    }

    /// Jittered inter-probe delay to spread resolver load.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    async fn pause_between_probes(&self) {
        let base = self.config.probe_spacing_ms;
        if base == 0 {
            return;
        }

        let jitter_range = (base as f64) * self.config.spacing_jitter;
        let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
        let spacing = ((base as f64) + jitter).max(0.0) as u64;

        tokio::time::sleep(Duration::from_millis(spacing)).await;
    }
}
