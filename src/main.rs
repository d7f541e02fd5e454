/// Entry point for the log file metric exporter.
///
/// Watches the pod log directory and serves the cumulative bytes written per
/// container on `/metrics`. Logging is controlled with `RUST_LOG`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the log directory cannot
/// be watched, the event queue overflows or the metrics server fails.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info LOG_DIR=/var/log/pods METRICS_ADDR=:2112 cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    log_file_metric_exporter::run().await?;
    Ok(())
}
