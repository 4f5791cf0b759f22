//! Destination of the measured log line counts.
//!
//! [`MetricSink`] is the only view the collection cycle has on the metrics
//! registry: it can upsert a value per label, nothing else. Labels are never
//! removed, so the series of a container that stopped running keeps its last
//! value.

mod error;
mod memory;
mod registry;

pub use error::{Error, Result};
pub use memory::MemorySink;
pub use registry::PrometheusSink;

/// Upsert-only, thread-safe store of per-container gauge values.
pub trait MetricSink: Send + Sync {
    /// Sets the value of the series labelled `label`, replacing any previous value.
    fn set_value(&self, label: &str, value: f64);

    /// Records that measuring the container labelled `label` failed.
    fn record_failure(&self, _label: &str) {}
}
