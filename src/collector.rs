//! One collection pass over the running containers.
//!
//! A [`CollectionCycle`] lists the running containers, counts the lines of each
//! container's recent logs and upserts the counts into a [`MetricSink`].
//!
//! A failed listing aborts the cycle before any metric is touched. Failures of
//! a single container (fetch error, read error, deadline exceeded) are logged
//! and skip only that container; its previous value stays in the sink.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::container::{ContainerID, ContainerIdentity};
use crate::logcount;
use crate::metrics::MetricSink;
use crate::runtime::{self, ContainerLogSource};

/// Why a single container could not be measured.
#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    #[error(transparent)]
    Fetch(#[from] runtime::Error),
    #[error("failed to read logs of container `{id}`: {source}")]
    Read {
        id: ContainerID,
        #[source]
        source: std::io::Error,
    },
    #[error("fetching logs of container `{id}` exceeded the deadline of {timeout:?}")]
    Timeout { id: ContainerID, timeout: Duration },
}

/// Outcome of a cycle that got past the listing step.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Containers returned by the listing.
    pub listed: usize,
    /// Containers whose count was written to the sink.
    pub measured: usize,
    /// Containers skipped because of an error.
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct CycleOptions {
    /// Trailing window of logs to count.
    pub window: Duration,
    /// Deadline for fetching and counting the logs of one container.
    pub fetch_timeout: Duration,
    /// Upper bound of containers measured at the same time.
    pub max_concurrent_fetches: usize,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(12 * 60 * 60),
            fetch_timeout: Duration::from_secs(30),
            max_concurrent_fetches: 4,
        }
    }
}

#[derive(Debug)]
pub struct CollectionCycle<S, M> {
    source: Arc<S>,
    sink: Arc<M>,
    options: CycleOptions,
    permits: Arc<Semaphore>,
}

impl<S, M> CollectionCycle<S, M>
where
    S: ContainerLogSource + Send + Sync + 'static,
    M: MetricSink + 'static,
{
    pub fn new(source: Arc<S>, sink: Arc<M>, options: CycleOptions) -> Self {
        let permits = Arc::new(Semaphore::new(options.max_concurrent_fetches.max(1)));
        Self {
            source,
            sink,
            options,
            permits,
        }
    }

    pub fn options(&self) -> &CycleOptions {
        &self.options
    }

    /// Runs one cycle to completion.
    ///
    /// # Errors
    ///
    /// Returns [`runtime::Error::RuntimeUnavailable`] if the containers could
    /// not be listed. The sink is left untouched in that case.
    pub async fn run(&self) -> runtime::Result<CycleReport> {
        let before = Instant::now();
        let containers = match self.source.list_active_containers().await {
            Ok(containers) => containers,
            Err(err) => {
                log::error!(
                    target: "collection cycle",
                    "aborting cycle, failed to list containers: {}",
                    err
                );
                return Err(err);
            }
        };

        let mut report = CycleReport {
            listed: containers.len(),
            ..CycleReport::default()
        };

        let mut tasks = JoinSet::new();
        for identity in containers {
            let source = Arc::clone(&self.source);
            let sink = Arc::clone(&self.sink);
            let permits = Arc::clone(&self.permits);
            let options = self.options.clone();
            tasks.spawn(async move {
                // the semaphore is never closed
                let _permit = permits.acquire_owned().await.ok();
                measure_and_record(source.as_ref(), sink.as_ref(), &identity, &options).await
            });
        }

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(true) => report.measured += 1,
                Ok(false) => report.failed += 1,
                Err(err) => {
                    log::error!(
                        target: "collection cycle",
                        "measurement task did not complete: {}",
                        err
                    );
                    report.failed += 1;
                }
            }
        }

        log::debug!(
            target: "collection cycle",
            "cycle finished: listed={}, measured={}, failed={}, took={:?}",
            report.listed,
            report.measured,
            report.failed,
            before.elapsed()
        );

        Ok(report)
    }
}

/// Measures one container and upserts the result, returns whether it succeeded.
async fn measure_and_record<S, M>(
    source: &S,
    sink: &M,
    identity: &ContainerIdentity,
    options: &CycleOptions,
) -> bool
where
    S: ContainerLogSource,
    M: MetricSink + ?Sized,
{
    match measure(source, identity.id(), options).await {
        Ok(count) => {
            log::trace!(
                target: "collection cycle",
                "measured container: name={}, id={}, lines={}",
                identity.display_name(),
                identity.id(),
                count
            );
            sink.set_value(identity.display_name(), count as f64);
            true
        }
        Err(err) => {
            log::warn!(
                target: "collection cycle",
                "skipping container: container={}, error={}",
                identity,
                err
            );
            sink.record_failure(identity.display_name());
            false
        }
    }
}

/// Counts the lines `id` logged within the window, bounded by the fetch deadline.
pub async fn measure<S>(
    source: &S,
    id: &ContainerID,
    options: &CycleOptions,
) -> Result<u64, MeasureError>
where
    S: ContainerLogSource,
{
    let fetch_and_count = async {
        let logs = source.fetch_recent_logs(id, options.window).await?;
        logcount::count_lines(logs)
            .await
            .map_err(|source| MeasureError::Read {
                id: id.clone(),
                source,
            })
    };

    tokio::time::timeout(options.fetch_timeout, fetch_and_count)
        .await
        .map_err(|_| MeasureError::Timeout {
            id: id.clone(),
            timeout: options.fetch_timeout,
        })?
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::metrics::MemorySink;
    use crate::testutil::FakeSource;

    fn cycle(
        source: &Arc<FakeSource>,
        sink: &Arc<MemorySink>,
    ) -> CollectionCycle<FakeSource, MemorySink> {
        CollectionCycle::new(
            Arc::clone(source),
            Arc::clone(sink),
            CycleOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_end_to_end_cycle() {
        let source = Arc::new(FakeSource::default());
        source.add_container("web-1", b"line1\nline2\nline3\n");
        source.add_container("worker-1", b"");
        let sink = Arc::new(MemorySink::default());

        let report = cycle(&source, &sink).run().await.unwrap();

        assert_eq!(
            report,
            CycleReport {
                listed: 2,
                measured: 2,
                failed: 0
            }
        );
        assert_eq!(sink.get("web-1"), Some(3.0));
        assert_eq!(sink.get("worker-1"), Some(0.0));
        assert_eq!(sink.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_listing_leaves_sink_unchanged() {
        let source = Arc::new(FakeSource::default());
        source.add_container("web-1", b"a\n");
        let sink = Arc::new(MemorySink::default());
        let cycle = cycle(&source, &sink);
        cycle.run().await.unwrap();

        source.add_container("web-1", b"a\nb\n");
        source.set_unavailable(true);
        let err = cycle.run().await.unwrap_err();

        assert!(matches!(err, runtime::Error::RuntimeUnavailable(_)));
        assert_eq!(sink.snapshot(), BTreeMap::from([("web-1".to_owned(), 1.0)]));
        assert_eq!(sink.failures("web-1"), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_isolated() {
        let source = Arc::new(FakeSource::default());
        source.add_container("a", b"1\n");
        source.add_container("b", b"1\n2\n");
        let sink = Arc::new(MemorySink::default());
        let cycle = cycle(&source, &sink);
        cycle.run().await.unwrap();

        source.add_container("a", b"1\n2\n3\n");
        source.fail_fetch("b");
        let report = cycle.run().await.unwrap();

        assert_eq!(report.measured, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(sink.get("a"), Some(3.0));
        assert_eq!(sink.get("b"), Some(2.0));
        assert_eq!(sink.failures("b"), 1);
    }

    #[tokio::test]
    async fn test_read_failure_is_isolated() {
        let source = Arc::new(FakeSource::default());
        source.add_container("a", b"1\n");
        source.add_container("b", b"1\n2\n");
        source.fail_read("b");
        let sink = Arc::new(MemorySink::default());

        let report = cycle(&source, &sink).run().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(sink.get("a"), Some(1.0));
        assert_eq!(sink.get("b"), None);
    }

    #[tokio::test]
    async fn test_vanished_container_keeps_last_value() {
        let source = Arc::new(FakeSource::default());
        source.add_container("short-lived", b"x\ny\n");
        source.add_container("web-1", b"x\n");
        let sink = Arc::new(MemorySink::default());
        let cycle = cycle(&source, &sink);
        cycle.run().await.unwrap();

        source.remove_container("short-lived");
        let report = cycle.run().await.unwrap();

        assert_eq!(report.listed, 1);
        assert_eq!(sink.get("short-lived"), Some(2.0));
        assert_eq!(sink.get("web-1"), Some(1.0));
    }

    #[tokio::test]
    async fn test_empty_fleet() {
        let source = Arc::new(FakeSource::default());
        let sink = Arc::new(MemorySink::default());

        let report = cycle(&source, &sink).run().await.unwrap();

        assert_eq!(report, CycleReport::default());
        assert!(sink.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_container_exceeds_deadline() {
        let source = Arc::new(FakeSource::default());
        source.add_container("fast", b"1\n");
        source.add_container("stuck", b"1\n");
        source.stall_fetch("stuck");
        let sink = Arc::new(MemorySink::default());
        let cycle = CollectionCycle::new(
            Arc::clone(&source),
            Arc::clone(&sink),
            CycleOptions {
                fetch_timeout: Duration::from_secs(5),
                ..CycleOptions::default()
            },
        );

        let report = cycle.run().await.unwrap();

        assert_eq!(report.measured, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(sink.get("fast"), Some(1.0));
        assert_eq!(sink.get("stuck"), None);
    }

    #[tokio::test]
    async fn test_measure_timeout_error() {
        let source = FakeSource::default();
        let id = source.add_container("stuck", b"");
        source.stall_fetch("stuck");
        let options = CycleOptions {
            fetch_timeout: Duration::from_millis(10),
            ..CycleOptions::default()
        };

        let err = measure(&source, &id, &options).await.unwrap_err();
        assert!(matches!(err, MeasureError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_window_is_passed_to_source() {
        let source = FakeSource::default();
        let id = source.add_container("web-1", b"a\n");
        let options = CycleOptions {
            window: Duration::from_secs(600),
            ..CycleOptions::default()
        };

        measure(&source, &id, &options).await.unwrap();
        assert_eq!(source.last_window(), Some(Duration::from_secs(600)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_cycle_matches_sequential() {
        let source = Arc::new(FakeSource::default());
        for n in 0..50 {
            let logs = "line\n".repeat(n);
            source.add_container(&format!("container-{n}"), logs.as_bytes());
        }
        source.fail_fetch("container-7");

        let sequential = Arc::new(MemorySink::default());
        CollectionCycle::new(
            Arc::clone(&source),
            Arc::clone(&sequential),
            CycleOptions {
                max_concurrent_fetches: 1,
                ..CycleOptions::default()
            },
        )
        .run()
        .await
        .unwrap();

        let parallel = Arc::new(MemorySink::default());
        CollectionCycle::new(
            Arc::clone(&source),
            Arc::clone(&parallel),
            CycleOptions {
                max_concurrent_fetches: 16,
                ..CycleOptions::default()
            },
        )
        .run()
        .await
        .unwrap();

        assert_eq!(sequential.len(), 49);
        assert_eq!(sequential.snapshot(), parallel.snapshot());
    }
}
