//! Shared leaf types for the rotary sending engine.

pub mod domain;
pub mod logging;

pub use domain::Domain;
pub use tracing;

/// Shutdown coordination signal for background tasks.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
    Finalised,
}
