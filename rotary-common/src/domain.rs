//! Domain newtype for type safety
//!
//! Wraps sending-domain strings to prevent accidentally passing email
//! addresses or display names where domain names are expected. Domain
//! names are case-insensitive (RFC 1035), so every construction path
//! normalizes to ASCII lowercase; two `Domain`s compare equal whenever
//! DNS would treat them as the same name.

use std::{
    fmt::{self, Display},
    ops::Deref,
    sync::Arc,
};

/// A normalized sending-domain name
///
/// Stored as a shared `Arc<str>` so clones are cheap across the state
/// store, caches, and health reports. Construction lowercases the input,
/// which makes `Domain` safe to use as a map key and as the label in a
/// DNSBL query without further normalization at the call site.
///
/// # Examples
///
/// ```
/// use rotary_common::Domain;
///
/// let domain = Domain::new("Mail.Example.COM");
/// assert_eq!(domain.as_str(), "mail.example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Domain(Arc<str>);

impl Domain {
    /// Create a new `Domain`, normalizing to ASCII lowercase
    #[must_use]
    pub fn new(s: impl AsRef<str>) -> Self {
        let s = s.as_ref();
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            Self(Arc::from(s.to_ascii_lowercase()))
        } else {
            Self(Arc::from(s))
        }
    }

    /// Get the domain as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the domain into the inner `Arc<str>`
    #[must_use]
    pub fn into_inner(self) -> Arc<str> {
        self.0
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for Domain {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for Domain {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Domain {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl serde::Serialize for Domain {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

// Manual Deserialize rather than #[serde(transparent)] so data read back
// from configuration or a persisted snapshot is normalized too.
impl<'de> serde::Deserialize<'de> for Domain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}
