//! DNS authentication and blacklist probing
//!
//! Checks a sending domain the way a receiving server would: SPF and
//! DMARC TXT records, DKIM keys under a list of common selectors, MX
//! presence, and membership in domain-based DNSBL zones.
//!
//! Lookups carry the resolver's per-query timeout and the whole probe
//! runs under one overall deadline, so a wedged resolver can never stall
//! the caller indefinitely. Blacklist zones are consulted best-effort: a
//! zone that cannot be reached counts as "not listed" rather than
//! failing the probe.

use std::time::Duration;

use chrono::Utc;
use hickory_resolver::{
    TokioResolver,
    config::ResolverOpts,
    name_server::TokioConnectionProvider,
};
use rotary_common::Domain;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::ProbeError,
    report::{AuthResults, HealthReport, ScoreWeights},
};

/// Configuration for the health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Per-query DNS timeout in seconds (default: 5)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Deadline for one full probe across all mechanisms (default: 20)
    #[serde(default = "default_overall_timeout_secs")]
    pub overall_timeout_secs: u64,

    /// DKIM selectors to try, in order
    #[serde(default = "default_dkim_selectors")]
    pub dkim_selectors: Vec<String>,

    /// Domain-based DNSBL zones to consult
    #[serde(default = "default_blacklist_zones")]
    pub blacklist_zones: Vec<String>,

    /// Score penalties and status thresholds
    #[serde(default)]
    pub weights: ScoreWeights,
}

const fn default_timeout_secs() -> u64 {
    5
}

const fn default_overall_timeout_secs() -> u64 {
    20
}

fn default_dkim_selectors() -> Vec<String> {
    ["default", "google", "k1", "s1", "s2"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_blacklist_zones() -> Vec<String> {
    ["dbl.spamhaus.org", "multi.surbl.org", "multi.uribl.com"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            overall_timeout_secs: default_overall_timeout_secs(),
            dkim_selectors: default_dkim_selectors(),
            blacklist_zones: default_blacklist_zones(),
            weights: ScoreWeights::default(),
        }
    }
}

/// Returns `true` if any TXT record is an SPF policy.
fn contains_spf(records: &[String]) -> bool {
    records.iter().any(|record| record.starts_with("v=spf1"))
}

/// Returns `true` if any TXT record is a DMARC policy.
fn contains_dmarc(records: &[String]) -> bool {
    records.iter().any(|record| record.starts_with("v=DMARC1"))
}

/// Returns `true` if a TXT record at a selector looks like a DKIM key.
///
/// Some providers omit the `v=DKIM1` tag, so the presence of a public key
/// tag is accepted as well.
fn looks_like_dkim(record: &str) -> bool {
    record.contains("v=DKIM1") || record.contains("p=")
}

/// Probes the DNS footprint of sending domains.
#[derive(Debug)]
pub struct HealthProbe {
    resolver: TokioResolver,
    config: ProbeConfig,
}

impl HealthProbe {
    /// Creates a probe with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the system DNS configuration cannot be loaded.
    pub fn new() -> Result<Self, ProbeError> {
        Self::with_config(ProbeConfig::default())
    }

    /// Creates a probe with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolver cannot be initialised.
    pub fn with_config(config: ProbeConfig) -> Result<Self, ProbeError> {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(config.timeout_secs);

        let resolver = TokioResolver::builder(TokioConnectionProvider::default())
            .map_err(ProbeError::Resolver)?
            .with_options(opts)
            .build();

        Ok(Self { resolver, config })
    }

    /// Runs a full probe against a domain.
    ///
    /// # Errors
    ///
    /// Returns `ProbeError::Timeout` if the overall deadline elapses, or
    /// `ProbeError::Lookup` if an authentication lookup fails outright.
    /// A record that simply does not exist is a finding, not an error.
    pub async fn check(&self, domain: &Domain) -> Result<HealthReport, ProbeError> {
        let deadline = Duration::from_secs(self.config.overall_timeout_secs);

        match tokio::time::timeout(deadline, self.check_inner(domain)).await {
            Ok(report) => report,
            Err(_) => Err(ProbeError::Timeout(domain.to_string())),
        }
    }

    async fn check_inner(&self, domain: &Domain) -> Result<HealthReport, ProbeError> {
        let auth = AuthResults {
            spf: self.check_spf(domain).await?,
            dkim: self.check_dkim(domain).await,
            dmarc: self.check_dmarc(domain).await?,
            mx: self.check_mx(domain).await?,
        };
        let blacklist_hits = self.check_blacklists(domain).await;

        debug!(
            domain = %domain,
            spf = auth.spf,
            dkim = auth.dkim,
            dmarc = auth.dmarc,
            mx = auth.mx,
            blacklists = blacklist_hits.len(),
            "Probe complete"
        );

        Ok(HealthReport::derive(
            domain.clone(),
            auth,
            blacklist_hits,
            &self.config.weights,
            Utc::now(),
        ))
    }

    /// TXT lookup that treats "no records" as an empty result.
    async fn txt_records(&self, name: &str, domain: &Domain) -> Result<Vec<String>, ProbeError> {
        match self.resolver.txt_lookup(name).await {
            Ok(lookup) => Ok(lookup.iter().map(ToString::to_string).collect()),
            Err(err) if err.is_no_records_found() || err.is_nx_domain() => Ok(Vec::new()),
            Err(err) => Err(ProbeError::Lookup {
                domain: domain.to_string(),
                source: err,
            }),
        }
    }

    async fn check_spf(&self, domain: &Domain) -> Result<bool, ProbeError> {
        let records = self.txt_records(domain.as_str(), domain).await?;
        Ok(contains_spf(&records))
    }

    async fn check_dmarc(&self, domain: &Domain) -> Result<bool, ProbeError> {
        let records = self
            .txt_records(&format!("_dmarc.{domain}"), domain)
            .await?;
        Ok(contains_dmarc(&records))
    }

    /// Tries each configured selector until one publishes a key.
    ///
    /// Selector misses (including transient failures on a single
    /// selector) are not probe failures; providers publish under one
    /// selector and the rest are expected to be absent.
    async fn check_dkim(&self, domain: &Domain) -> bool {
        for selector in &self.config.dkim_selectors {
            let name = format!("{selector}._domainkey.{domain}");
            match self.resolver.txt_lookup(name.as_str()).await {
                Ok(lookup) => {
                    if lookup.iter().any(|txt| looks_like_dkim(&txt.to_string())) {
                        debug!(domain = %domain, selector, "Found DKIM key");
                        return true;
                    }
                }
                Err(err) => {
                    debug!(domain = %domain, selector, error = %err, "DKIM selector miss");
                }
            }
        }
        false
    }

    async fn check_mx(&self, domain: &Domain) -> Result<bool, ProbeError> {
        match self.resolver.mx_lookup(domain.as_str()).await {
            Ok(lookup) => Ok(lookup.iter().next().is_some()),
            Err(err) if err.is_no_records_found() || err.is_nx_domain() => Ok(false),
            Err(err) => Err(ProbeError::Lookup {
                domain: domain.to_string(),
                source: err,
            }),
        }
    }

    /// Consults each DNSBL zone; a resolving A record means "listed".
    ///
    /// Zones are rate-limited third parties, so lookup errors degrade to
    /// "not listed" instead of failing the probe.
    async fn check_blacklists(&self, domain: &Domain) -> Vec<String> {
        let mut hits = Vec::new();

        for zone in &self.config.blacklist_zones {
            let query = format!("{domain}.{zone}");
            match self.resolver.lookup_ip(query.as_str()).await {
                Ok(lookup) if lookup.iter().next().is_some() => {
                    debug!(domain = %domain, zone, "Domain is listed");
                    hits.push(zone.clone());
                }
                Ok(_) => {}
                Err(err) if err.is_no_records_found() || err.is_nx_domain() => {}
                Err(err) => {
                    debug!(domain = %domain, zone, error = %err, "Blacklist zone unreachable");
                }
            }
        }

        hits
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_config_defaults() {
        let config = ProbeConfig::default();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.overall_timeout_secs, 20);
        assert!(config.dkim_selectors.contains(&"default".to_string()));
        assert!(
            config
                .blacklist_zones
                .contains(&"dbl.spamhaus.org".to_string())
        );
    }

    #[test]
    fn test_contains_spf() {
        let records = vec![
            "google-site-verification=abc123".to_string(),
            "v=spf1 include:_spf.example.com ~all".to_string(),
        ];
        assert!(contains_spf(&records));
        assert!(!contains_spf(&records[..1]));
        assert!(!contains_spf(&[]));
    }

    #[test]
    fn test_contains_dmarc() {
        let records = vec!["v=DMARC1; p=quarantine; rua=mailto:dmarc@example.com".to_string()];
        assert!(contains_dmarc(&records));
        // SPF at the DMARC name does not count
        assert!(!contains_dmarc(&["v=spf1 -all".to_string()]));
    }

    #[test]
    fn test_looks_like_dkim() {
        assert!(looks_like_dkim("v=DKIM1; k=rsa; p=MIGfMA0GCSq"));
        assert!(looks_like_dkim("k=rsa; p=MIGfMA0GCSq"));
        assert!(!looks_like_dkim("v=spf1 -all"));
    }

    #[tokio::test]
    #[ignore = "Requires network access"]
    async fn test_check_established_domain() {
        let probe = HealthProbe::new().unwrap();
        let report = probe.check(&Domain::new("gmail.com")).await.unwrap();

        assert!(report.auth.mx);
        assert!(report.auth.spf);
        assert!(report.score > 0);
    }

    #[tokio::test]
    #[ignore = "Requires network access"]
    async fn test_check_nonexistent_domain() {
        let probe = HealthProbe::new().unwrap();
        let report = probe
            .check(&Domain::new(
                "this-domain-definitely-does-not-exist-12345.com",
            ))
            .await
            .unwrap();

        // Nonexistent records are findings, not probe failures
        assert!(!report.auth.mx);
        assert!(!report.auth.spf);
        assert!(report.score < 100);
    }
}
