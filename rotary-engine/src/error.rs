//! Typed error handling for rotation operations.
//!
//! Two layers: `StoreError` for the persistence seam, and
//! `RotationError` for the engine facade. The taxonomy is deliberately
//! small; most conditions a caller meets ("cannot send right now",
//! "unknown identity") are ordinary results of operating the engine,
//! and only persistence failures are fatal to the calling operation.

use thiserror::Error;

use crate::types::IdentityId;

/// Errors from the identity state store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The identity does not exist in the store.
    ///
    /// For outcome recording this is a no-op condition, not a failure;
    /// the engine logs and continues. For explicit reads it surfaces.
    #[error("sending identity not found: {0}")]
    IdentityNotFound(IdentityId),

    /// The backend failed to persist a write.
    ///
    /// The only fatal class: an unpersisted counter increment would let
    /// the soft capacity invariant drift further, so the caller should
    /// retry or abandon the send.
    #[error("state persistence failed: {0}")]
    Persistence(String),
}

impl StoreError {
    /// Returns `true` for the unknown-identity case.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::IdentityNotFound(_))
    }
}

/// Errors from the rotation engine facade.
#[derive(Debug, Error)]
pub enum RotationError {
    /// Every identity is paused, exhausted, or unhealthy.
    ///
    /// Returned, never panicked: the caller must treat this as "cannot
    /// send now" and come back later.
    #[error("no eligible sending identity available")]
    NoEligibleDomain,

    /// A store operation failed underneath the engine.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RotationError {
    /// Returns `true` when selection found zero candidates.
    #[must_use]
    pub const fn is_no_eligible(&self) -> bool {
        matches!(self, Self::NoEligibleDomain)
    }
}
