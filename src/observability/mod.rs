//! Engine observability: a minimal observer trait plus a `tracing` backend.

mod log;
mod traits;

pub use log::LogObserver;
pub use traits::{Observer, ObserverEvent, ObserverMetric};

/// An observer that discards everything. Used as the default when no
/// observer is configured.
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn record_event(&self, _event: &ObserverEvent) {}
    fn name(&self) -> &str {
        "noop"
    }
}
