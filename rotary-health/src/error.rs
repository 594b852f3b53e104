//! Errors that can occur while probing a domain.

use thiserror::Error;

/// Errors raised by [`crate::HealthProbe`].
///
/// A probe failure means "no fresh report", never "the domain is bad";
/// callers are expected to record the domain's health as unchecked and
/// carry on with the last known snapshot.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The system resolver could not be initialised.
    #[error("failed to initialise DNS resolver: {0}")]
    Resolver(#[source] hickory_resolver::ResolveError),

    /// A DNS query failed for a reason other than the record not existing.
    #[error("DNS lookup failed for {domain}: {source}")]
    Lookup {
        domain: String,
        #[source]
        source: hickory_resolver::ResolveError,
    },

    /// The probe as a whole exceeded its deadline.
    #[error("health probe timed out for domain: {0}")]
    Timeout(String),
}

impl ProbeError {
    /// The domain the failed probe was inspecting, when known.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        match self {
            Self::Resolver(_) => None,
            Self::Lookup { domain, .. } | Self::Timeout(domain) => Some(domain),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_domain() {
        let err = ProbeError::Timeout("example.com".to_string());
        assert_eq!(err.domain(), Some("example.com"));
        assert_eq!(
            err.to_string(),
            "health probe timed out for domain: example.com"
        );
    }
}
