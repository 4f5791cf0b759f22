/// Entry point of the dockerx exporter.
///
/// Counts the log lines every running Docker container emitted within a
/// trailing window and serves the counts as Prometheus gauges.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., invalid configuration or
/// the metrics listener cannot be bound).
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info DOCKERX_LISTEN_ADDR=127.0.0.1:2112 cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    dockerx::run().await
}
