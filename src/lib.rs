//! dockerx: counts the log lines every running container emitted within a
//! trailing time window and exposes the counts as Prometheus gauges.
//!
//! A [`scheduler::Scheduler`] repeatedly runs a [`collector::CollectionCycle`]
//! which lists the running containers through a [`runtime::ContainerLogSource`],
//! counts their recent log lines with [`logcount`] and upserts the counts into a
//! [`metrics::MetricSink`]. The [`api`] serves the sink independently of the
//! collection.

use std::sync::Arc;

use error::ResultOkLogExt;

pub mod api;
pub mod collector;
pub mod config;
pub mod container;
pub mod error;
pub mod logcount;
pub mod metrics;
pub mod runtime;
pub mod scheduler;

#[cfg(test)]
mod testutil;

/// Runs the dockerx exporter.
///
/// Starts the collection loop on its own task and serves the metrics endpoint
/// on the current one. Collection failures never end the process; the endpoint
/// keeps serving the last successfully measured values.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid configuration values in the environment.
/// - An invalid metrics namespace.
/// - Failure to bind or serve the metrics listener.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::Config::from_env()?;
    log::debug!("Configuration: {:?}", config);

    let docker = Arc::new(runtime::docker::DockerClient::new(
        config.docker_socket.clone(),
    ));
    if docker
        .ping()
        .await
        .ok_log(&format!(
            "Docker daemon at `{}` is not reachable yet",
            docker.socket_path().display()
        ))
        .is_some()
    {
        log::info!(
            "Connected to Docker daemon at `{}`",
            docker.socket_path().display()
        );
    }

    let sink = Arc::new(metrics::PrometheusSink::new(
        &config.metrics_namespace,
        config.log_window,
    )?);

    let cycle =
        collector::CollectionCycle::new(docker, Arc::clone(&sink), config.cycle_options());
    let collection =
        tokio::spawn(scheduler::Scheduler::new(cycle, config.cycle_delay).run_forever());

    let served = api::APIServer::new(sink).listen(config.listen_addr).await;
    collection.abort();
    served?;

    Ok(())
}
