//! Sending-identity rotation, warmup, and adaptive throttle engine
//!
//! Decides, for every outbound message, which verified sending identity
//! to use, how fast that identity may currently send, and when to
//! automatically suspend an identity showing signs of damaged
//! deliverability.
//!
//! Collaborators interact through three operations on
//! [`RotationEngine`]:
//! - [`RotationEngine::select`]: pick an identity with remaining
//!   capacity and a recommended inter-send delay
//! - [`RotationEngine::record_outcome`]: report a send, bounce, or
//!   complaint back
//! - [`RotationEngine::summary`]: read-only state for dashboards
//!
//! The engine owns identity state, health, and rate control only: it
//! does not generate content, speak SMTP, queue messages, or retry
//! failed sends.

mod breaker;
mod cache;
mod error;
mod monitor;
mod rotation;
mod store;
mod throttle;
mod types;
mod warmup;

// Re-export health types alongside the engine's own
pub use rotary_health::{
    AuthResults, HealthProbe, HealthReport, HealthStatus, ProbeConfig, ProbeError, ScoreWeights,
};

pub use breaker::{BreakerConfig, CircuitBreaker, PauseReason};
pub use cache::{CacheConfig, EligibleCache};
pub use error::{RotationError, StoreError};
pub use monitor::{HealthMonitor, MonitorConfig};
pub use rotation::{
    EngineConfig, IdentitySummary, MatchedBy, RotationEngine, SelectOptions, SelectedDomain,
    Strategy, Summary, signature_matches,
};
pub use store::{DomainStateStore, IdentityStore, memory::MemoryIdentityStore};
pub use throttle::{ThrottleConfig, ThrottleController, ThrottleDecay, ThrottleSignal};
pub use types::{HealthSnapshot, IdentityId, SendOutcome, SendingIdentity};
pub use warmup::{CurveShape, CurveStep, WarmupConfig};
