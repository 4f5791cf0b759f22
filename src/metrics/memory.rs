use std::collections::BTreeMap;

use dashmap::DashMap;

use super::MetricSink;

/// In-process [`MetricSink`] keeping the latest value per label.
///
/// Safe to read while a collection cycle is writing to it.
///
/// # Examples
///
/// ```
/// # use dockerx::metrics::{MemorySink, MetricSink};
/// let sink = MemorySink::default();
/// sink.set_value("web-1", 3.0);
/// sink.set_value("web-1", 5.0);
/// assert_eq!(sink.get("web-1"), Some(5.0));
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    values: DashMap<String, f64>,
    failures: DashMap<String, u64>,
}

impl MemorySink {
    pub fn get(&self, label: &str) -> Option<f64> {
        self.values.get(label).map(|value| *value)
    }

    /// Number of failures recorded for `label`.
    pub fn failures(&self, label: &str) -> u64 {
        self.failures.get(label).map_or(0, |count| *count)
    }

    /// Copy of all current values, ordered by label.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.values
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl MetricSink for MemorySink {
    fn set_value(&self, label: &str, value: f64) {
        self.values.insert(label.to_owned(), value);
    }

    fn record_failure(&self, label: &str) {
        *self.failures.entry(label.to_owned()).or_default() += 1;
    }
}
