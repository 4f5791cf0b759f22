use std::time::Duration;

use prometheus::{GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

use super::{Error, MetricSink, Result};

const CONTAINER_LABEL: &str = "container";
const LOG_LINES: &str = "container_log_lines";
const FETCH_FAILURES: &str = "container_log_fetch_failures_total";

/// [`MetricSink`] backed by a Prometheus registry.
///
/// Exposes one gauge, `<namespace>_container_log_lines{container}`, plus a
/// counter of failed measurements per container.
#[derive(Debug, Clone)]
pub struct PrometheusSink {
    registry: Registry,
    log_lines: GaugeVec,
    fetch_failures: IntCounterVec,
}

impl PrometheusSink {
    /// Creates the metrics in a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns an error if `namespace` is not a valid metric name prefix.
    pub fn new(namespace: &str, window: Duration) -> Result<Self> {
        let registry = Registry::new();
        let log_lines = GaugeVec::new(
            Opts::new(
                LOG_LINES,
                format!(
                    "Number of log lines of the container in the last {}",
                    describe_window(window)
                ),
            )
            .namespace(namespace),
            &[CONTAINER_LABEL],
        )
        .map_err(|source| Error::Create {
            name: LOG_LINES.to_owned(),
            source,
        })?;
        let fetch_failures = IntCounterVec::new(
            Opts::new(
                FETCH_FAILURES,
                "Number of failed attempts to fetch or read the logs of the container",
            )
            .namespace(namespace),
            &[CONTAINER_LABEL],
        )
        .map_err(|source| Error::Create {
            name: FETCH_FAILURES.to_owned(),
            source,
        })?;

        registry
            .register(Box::new(log_lines.clone()))
            .map_err(|source| Error::Register {
                name: LOG_LINES.to_owned(),
                source,
            })?;
        registry
            .register(Box::new(fetch_failures.clone()))
            .map_err(|source| Error::Register {
                name: FETCH_FAILURES.to_owned(),
                source,
            })?;

        Ok(Self {
            registry,
            log_lines,
            fetch_failures,
        })
    }

    /// Renders all metrics in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String> {
        let mut out = String::new();
        TextEncoder::new()
            .encode_utf8(&self.registry.gather(), &mut out)
            .map_err(Error::Encode)?;
        Ok(out)
    }
}

impl MetricSink for PrometheusSink {
    fn set_value(&self, label: &str, value: f64) {
        self.log_lines.with_label_values(&[label]).set(value);
    }

    fn record_failure(&self, label: &str) {
        self.fetch_failures.with_label_values(&[label]).inc();
    }
}

/// Human readable form of the trailing window for the metric help text.
fn describe_window(window: Duration) -> String {
    let secs = window.as_secs();
    match secs {
        0 => format!("{} milliseconds", window.as_millis()),
        s if s % 3600 == 0 => format!("{} hours", s / 3600),
        s if s % 60 == 0 => format!("{} minutes", s / 60),
        s => format!("{s} seconds"),
    }
}
